//! One-pass index of marker rows by canonical key.

use std::collections::HashMap;

use crate::normalize::{CanonicalKey, ClientRegion};
use crate::origin::MarkerRow;

/// Borrowed view of fetched rows, bucketed by [`CanonicalKey`].
#[derive(Debug, Default)]
pub struct GroupedRows<'a> {
    groups: HashMap<CanonicalKey, Vec<&'a MarkerRow>>,
}

impl<'a> GroupedRows<'a> {
    pub fn group(rows: &'a [MarkerRow]) -> Self {
        let mut groups: HashMap<CanonicalKey, Vec<&'a MarkerRow>> = HashMap::new();
        for row in rows {
            groups.entry(row.key()).or_default().push(row);
        }
        Self { groups }
    }

    /// Drops every key outside `pair`. Returns how many rows were pruned.
    pub fn retain_pair(&mut self, pair: &ClientRegion) -> usize {
        let mut pruned = 0;
        self.groups.retain(|key, rows| {
            let keep = key.matches_pair(pair);
            if !keep {
                pruned += rows.len();
            }
            keep
        });
        pruned
    }

    pub fn get(&self, key: &CanonicalKey) -> &[&'a MarkerRow] {
        self.groups.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
