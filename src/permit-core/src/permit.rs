//! Permit document model and assembly.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, TimeZone};
use tracing::debug;

use crate::error::PermitError;
use crate::key_exchange::UserKeys;
use crate::types::Holding;

/// Expiry date format inside permits.
pub const EXPIRY_FORMAT: &str = "%Y-%m-%d";
/// Issue date format: date plus UTC offset, e.g. `2025-06-01+01:00`.
pub const ISSUE_DATE_FORMAT: &str = "%Y-%m-%d%:z";

/// A permit for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permit {
    /// Header.
    pub header: PermitHeader,
    /// Products in first-started order.
    pub products: Vec<Product>,
}

/// Permit header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermitHeader {
    /// Issue date, `yyyy-MM-dd` plus offset.
    pub issue_date: String,
    /// Data server name.
    pub data_server_name: String,
    /// Data server identifier.
    pub data_server_identifier: String,
    /// Schema version the permit conforms to.
    pub version: String,
    /// The user's raw UPN.
    pub user_permit: String,
}

/// Permits for one product family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    /// Product id, `S-` plus the first three characters of the cell code.
    pub id: String,
    /// One entry per cell.
    pub dataset_permits: Vec<DatasetPermit>,
}

/// Permit for one cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetPermit {
    /// Cell code.
    pub filename: String,
    /// Edition number.
    pub edition_number: String,
    /// Entitlement expiry.
    pub expiry: NaiveDate,
    /// Product key encrypted under the user's hardware id.
    pub encrypted_key: String,
}

impl Permit {
    /// Total dataset permits across products.
    #[must_use]
    pub fn dataset_count(&self) -> usize {
        self.products.iter().map(|p| p.dataset_permits.len()).sum()
    }
}

/// Product id for a cell: `S-` plus its first three characters.
#[must_use]
pub fn product_id(cell_code: &str) -> String {
    let prefix: String = cell_code.chars().take(3).collect();
    format!("S-{prefix}")
}

/// Format an issue date as `yyyy-MM-dd` plus UTC offset.
pub fn format_issue_date<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format(ISSUE_DATE_FORMAT).to_string()
}

/// Builds permits from deduplicated holdings and re-encrypted keys.
#[derive(Debug, Clone)]
pub struct PermitAssembler {
    issue_date: String,
    data_server_name: String,
    data_server_identifier: String,
    version: String,
}

impl PermitAssembler {
    /// Create an assembler stamping every permit with the same header fields.
    pub fn new(
        issue_date: impl Into<String>,
        data_server_name: impl Into<String>,
        data_server_identifier: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            issue_date: issue_date.into(),
            data_server_name: data_server_name.into(),
            data_server_identifier: data_server_identifier.into(),
            version: version.into(),
        }
    }

    /// Assemble the permit for one user.
    ///
    /// Cells are visited in ascending cell-code order. A cell whose filename
    /// already appears under its product id is skipped.
    ///
    /// # Errors
    ///
    /// Returns [`PermitError::ProductKeyMissing`] if `keys` has no entry for
    /// a held cell.
    pub fn assemble(&self, holdings: &[Holding], keys: &UserKeys) -> Result<Permit, PermitError> {
        let mut cells: Vec<_> = holdings
            .iter()
            .flat_map(|h| h.cells.iter().map(move |c| (c, h.expiry_date)))
            .collect();
        cells.sort_by(|a, b| a.0.cell_code.cmp(&b.0.cell_code));

        let mut products: Vec<Product> = Vec::new();
        let mut seen: HashSet<(String, String)> = HashSet::new();

        for (cell, expiry) in cells {
            let id = product_id(&cell.cell_code);
            if !seen.insert((id.clone(), cell.cell_code.clone())) {
                debug!(cell = %cell.cell_code, "Skipping duplicate dataset permit");
                continue;
            }

            let encrypted_key = keys
                .key_for(&cell.cell_code, &cell.latest_edition_number)
                .ok_or_else(|| PermitError::ProductKeyMissing {
                    product_name: cell.cell_code.clone(),
                    edition: cell.latest_edition_number.clone(),
                })?;

            let dataset = DatasetPermit {
                filename: cell.cell_code.clone(),
                edition_number: cell.latest_edition_number.clone(),
                expiry: expiry.date_naive(),
                encrypted_key: encrypted_key.to_string(),
            };

            match products.iter_mut().find(|p| p.id == id) {
                Some(product) => product.dataset_permits.push(dataset),
                None => products.push(Product {
                    id,
                    dataset_permits: vec![dataset],
                }),
            }
        }

        Ok(Permit {
            header: PermitHeader {
                issue_date: self.issue_date.clone(),
                data_server_name: self.data_server_name.clone(),
                data_server_identifier: self.data_server_identifier.clone(),
                version: self.version.clone(),
                user_permit: keys.upn.clone(),
            },
            products,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use chrono::{FixedOffset, Utc};

    use crate::types::Cell;

    const UPN: &str = "EF1C61C926BD9F18F44897CA1A5214BE06F92FF8J0K1L2";

    fn holding(cells: &[&str]) -> Holding {
        Holding {
            product_code: "P1".into(),
            product_title: "Product".into(),
            expiry_date: Utc.with_ymd_and_hms(2026, 1, 31, 23, 59, 0).unwrap(),
            cells: cells
                .iter()
                .map(|code| Cell {
                    cell_code: (*code).into(),
                    cell_title: String::new(),
                    latest_edition_number: "1".into(),
                    latest_update_number: "0".into(),
                })
                .collect(),
        }
    }

    fn keys_for(cells: &[&str]) -> UserKeys {
        UserKeys {
            title: "Vessel".into(),
            upn: UPN.into(),
            keys: cells
                .iter()
                .map(|c| (((*c).to_string(), "1".to_string()), format!("KEY-{c}")))
                .collect::<HashMap<_, _>>(),
        }
    }

    fn assembler() -> PermitAssembler {
        PermitAssembler::new("2025-06-01+00:00", "Permit Service", "GB00", "5.1.0")
    }

    #[test]
    fn test_product_id() {
        assert_eq!(product_id("101GB004"), "S-101");
        assert_eq!(product_id("1"), "S-1");
    }

    #[test]
    fn test_single_cell() {
        let permit = assembler()
            .assemble(&[holding(&["101GB004"])], &keys_for(&["101GB004"]))
            .unwrap();

        assert_eq!(permit.header.user_permit, UPN);
        assert_eq!(permit.header.version, "5.1.0");
        assert_eq!(permit.products.len(), 1);
        assert_eq!(permit.products[0].id, "S-101");
        let dataset = &permit.products[0].dataset_permits[0];
        assert_eq!(dataset.filename, "101GB004");
        assert_eq!(dataset.edition_number, "1");
        assert_eq!(dataset.expiry.to_string(), "2026-01-31");
        assert_eq!(dataset.encrypted_key, "KEY-101GB004");
    }

    #[test]
    fn test_groups_by_prefix_in_cell_order() {
        let cells = ["102CA001", "101GB005", "101GB004", "102CA000"];
        let permit = assembler()
            .assemble(&[holding(&cells)], &keys_for(&cells))
            .unwrap();

        let layout: Vec<(String, Vec<String>)> = permit
            .products
            .iter()
            .map(|p| {
                (
                    p.id.clone(),
                    p.dataset_permits.iter().map(|d| d.filename.clone()).collect(),
                )
            })
            .collect();
        assert_eq!(
            layout,
            vec![
                ("S-101".to_string(), vec!["101GB004".to_string(), "101GB005".to_string()]),
                ("S-102".to_string(), vec!["102CA000".to_string(), "102CA001".to_string()]),
            ]
        );
        assert_eq!(permit.dataset_count(), 4);
    }

    #[test]
    fn test_duplicate_filename_skipped() {
        let permit = assembler()
            .assemble(
                &[holding(&["101GB004"]), holding(&["101GB004"])],
                &keys_for(&["101GB004"]),
            )
            .unwrap();
        assert_eq!(permit.dataset_count(), 1);
    }

    #[test]
    fn test_missing_key_is_error() {
        let err = assembler()
            .assemble(&[holding(&["101GB004"])], &keys_for(&[]))
            .unwrap_err();
        assert!(matches!(err, PermitError::ProductKeyMissing { .. }));
    }

    #[test]
    fn test_issue_date_format() {
        let offset = FixedOffset::east_opt(3600).unwrap();
        let at = offset.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        assert_eq!(format_issue_date(&at), "2025-06-01+01:00");

        let utc = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        assert_eq!(format_issue_date(&utc), "2025-06-01+00:00");
    }
}
