//! Property-based tests for the permit pipeline.
//!
//! These tests verify UPN checksum behaviour, holdings deduplication and
//! permit grouping over generated inputs.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{Duration, TimeZone, Utc};
use permit_core::holdings::dedupe;
use permit_core::permit::product_id;
use permit_core::upn::Upn;
use permit_core::{compute_checksum, is_valid_checksum, Cell, Holding, PermitAssembler, UserKeys};
use proptest::prelude::*;

/// Strategy for a 32-character uppercase hex hardware id.
fn hardware_id() -> impl Strategy<Value = String> {
    prop::collection::vec(any::<u8>(), 16)
        .prop_map(|bytes| bytes.iter().map(|b| format!("{b:02X}")).collect())
}

/// Strategy for a 6-character alphanumeric manufacturer id.
fn manufacturer_id() -> impl Strategy<Value = String> {
    "[A-Z0-9]{6}"
}

/// Strategy for cell codes: a 3-digit product prefix plus 5 characters.
fn cell_code() -> impl Strategy<Value = String> {
    ("10[1-4]", "[A-Z]{2}[0-9]{3}").prop_map(|(prefix, rest)| format!("{prefix}{rest}"))
}

fn cell(code: &str) -> Cell {
    Cell {
        cell_code: code.to_string(),
        cell_title: String::new(),
        latest_edition_number: "1".to_string(),
        latest_update_number: "0".to_string(),
    }
}

fn holding(code: &str, cells: Vec<Cell>, expiry_days: i64) -> Holding {
    let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    Holding {
        product_code: code.to_string(),
        product_title: format!("Product {code}"),
        expiry_date: base + Duration::days(expiry_days),
        cells,
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        max_shrink_iters: 500,
        ..ProptestConfig::default()
    })]

    // ========================================================================
    // Checksum Properties
    // ========================================================================

    /// A composed UPN always carries a valid checksum.
    #[test]
    fn composed_upn_checksum_valid(hwid in hardware_id(), mfr in manufacturer_id()) {
        let upn = Upn::compose(&hwid, &mfr).unwrap();
        prop_assert_eq!(upn.as_str().len(), 46);
        prop_assert!(is_valid_checksum(upn.as_str()));
        prop_assert_eq!(upn.checksum(), compute_checksum(&hwid));
    }

    /// Changing any checksum character invalidates the UPN.
    #[test]
    fn altered_checksum_invalid(hwid in hardware_id(), mfr in manufacturer_id(), pos in 32usize..40) {
        let upn = Upn::compose(&hwid, &mfr).unwrap().to_string();
        let mut chars: Vec<char> = upn.chars().collect();
        chars[pos] = if chars[pos] == '0' { '1' } else { '0' };
        let altered: String = chars.into_iter().collect();
        prop_assert!(!is_valid_checksum(&altered));
    }

    /// Strings too short to carry a checksum never validate.
    #[test]
    fn too_short_never_valid(s in "[A-F0-9]{0,39}") {
        prop_assert!(!is_valid_checksum(&s));
    }

    // ========================================================================
    // Deduplication Properties
    // ========================================================================

    /// A cell held twice survives once, with the later expiry.
    #[test]
    fn duplicate_cell_keeps_latest(code in cell_code(), a in 0i64..365, b in 0i64..365) {
        prop_assume!(a != b);
        let holdings = vec![
            holding("P1", vec![cell(&code)], a),
            holding("P2", vec![cell(&code)], b),
        ];

        let deduped = dedupe(holdings);
        let cells: Vec<_> = deduped.iter().flat_map(|h| &h.cells).collect();
        prop_assert_eq!(cells.len(), 1);

        let survivor = deduped.iter().find(|h| !h.cells.is_empty()).unwrap();
        let later = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + Duration::days(a.max(b));
        prop_assert_eq!(survivor.expiry_date, later);
        prop_assert_eq!(&survivor.product_code, if b > a { "P2" } else { "P1" });
    }

    /// Deduplication leaves exactly the distinct cell codes.
    #[test]
    fn dedupe_keeps_each_cell_once(codes in prop::collection::vec(cell_code(), 1..20)) {
        let holdings: Vec<Holding> = codes
            .iter()
            .enumerate()
            .map(|(i, code)| holding(&format!("P{}", i % 3), vec![cell(code)], i as i64))
            .collect();

        let deduped = dedupe(holdings);
        let kept: Vec<&str> = deduped
            .iter()
            .flat_map(|h| h.cells.iter().map(|c| c.cell_code.as_str()))
            .collect();
        let distinct: HashSet<&str> = codes.iter().map(String::as_str).collect();

        prop_assert_eq!(kept.len(), distinct.len());
        prop_assert_eq!(kept.iter().copied().collect::<HashSet<_>>(), distinct);
        prop_assert!(deduped.iter().all(|h| !h.cells.is_empty()));
    }

    // ========================================================================
    // Assembly Properties
    // ========================================================================

    /// Permits group cells by 3-character prefix with no duplicate filenames.
    #[test]
    fn assembly_groups_by_prefix(codes in prop::collection::btree_set(cell_code(), 1..25)) {
        let cells: Vec<Cell> = codes.iter().map(|c| cell(c)).collect();
        let holdings = dedupe(vec![holding("P1", cells, 30)]);
        let keys = UserKeys {
            title: "Vessel".to_string(),
            upn: "EF1C61C926BD9F18F44897CA1A5214BE06F92FF8J0K1L2".to_string(),
            keys: codes
                .iter()
                .map(|c| ((c.clone(), "1".to_string()), format!("KEY{c}")))
                .collect::<HashMap<_, _>>(),
        };

        let permit = PermitAssembler::new("2026-01-01+00:00", "Server", "GB00", "5.1.0")
            .assemble(&holdings, &keys)
            .unwrap();

        let prefixes: BTreeSet<String> = codes.iter().map(|c| product_id(c)).collect();
        prop_assert_eq!(permit.products.len(), prefixes.len());
        prop_assert_eq!(permit.dataset_count(), codes.len());

        for product in &permit.products {
            let filenames: HashSet<&str> =
                product.dataset_permits.iter().map(|d| d.filename.as_str()).collect();
            prop_assert_eq!(filenames.len(), product.dataset_permits.len());
            prop_assert!(product
                .dataset_permits
                .iter()
                .all(|d| product_id(&d.filename) == product.id));
            prop_assert!(product
                .dataset_permits
                .windows(2)
                .all(|w| w[0].filename < w[1].filename));
        }
    }
}
