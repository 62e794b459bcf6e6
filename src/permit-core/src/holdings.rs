//! Holdings deduplication.
//!
//! A licence can hold the same cell through several holdings with different
//! expiries. Only the latest expiry is authoritative, so before any keys are
//! requested the holdings are flattened to (product, cell) pairs, reduced to
//! one pair per cell code (the latest expiry, first seen on ties) and
//! regrouped by product.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::types::{Cell, Holding, ProductKeyRequest};

/// Collapse duplicate cells, keeping each cell's latest-expiry holding.
///
/// Output holdings keep the first-seen order of (product code, title) and
/// each holding's expiry is the latest among its surviving cells. Holdings
/// left without cells are dropped.
#[must_use]
pub fn dedupe(holdings: Vec<Holding>) -> Vec<Holding> {
    struct Survivor {
        order: usize,
        product_code: String,
        product_title: String,
        expiry: DateTime<Utc>,
        cell: Cell,
    }

    let mut by_cell: HashMap<String, Survivor> = HashMap::new();
    let mut order = 0;
    for holding in holdings {
        for cell in holding.cells {
            order += 1;
            let candidate = Survivor {
                order,
                product_code: holding.product_code.clone(),
                product_title: holding.product_title.clone(),
                expiry: holding.expiry_date,
                cell,
            };
            match by_cell.get_mut(&candidate.cell.cell_code) {
                Some(current) if candidate.expiry > current.expiry => *current = candidate,
                Some(_) => {},
                None => {
                    by_cell.insert(candidate.cell.cell_code.clone(), candidate);
                },
            }
        }
    }

    let mut survivors: Vec<Survivor> = by_cell.into_values().collect();
    survivors.sort_by_key(|s| s.order);

    let mut output: Vec<Holding> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();
    for survivor in survivors {
        let key = (survivor.product_code, survivor.product_title);
        match index.get(&key) {
            Some(&i) => {
                let holding = &mut output[i];
                holding.expiry_date = holding.expiry_date.max(survivor.expiry);
                holding.cells.push(survivor.cell);
            },
            None => {
                index.insert(key.clone(), output.len());
                output.push(Holding {
                    product_code: key.0,
                    product_title: key.1,
                    expiry_date: survivor.expiry,
                    cells: vec![survivor.cell],
                });
            },
        }
    }
    output
}

/// One key request per held cell, at the cell's latest edition.
#[must_use]
pub fn product_key_requests(holdings: &[Holding]) -> Vec<ProductKeyRequest> {
    holdings
        .iter()
        .flat_map(|h| &h.cells)
        .map(|cell| ProductKeyRequest {
            product_name: cell.cell_code.clone(),
            edition: cell.latest_edition_number.clone(),
        })
        .collect()
}
