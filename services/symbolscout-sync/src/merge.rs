//! Two-source watch-list merge with multiplier reconciliation

use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

use crate::settings::MergeStrategy;
use crate::symbol::NormalizedToken;

/// Merge two optional symbol lists.
///
/// - both absent: `None`, nothing to reconcile this cycle
/// - one present: returned as-is, without normalization
/// - both present: merged by base symbol, highest multiplier wins
pub fn merge_symbol_lists(
    first: Option<BTreeSet<String>>,
    second: Option<BTreeSet<String>>,
    strategy: MergeStrategy,
) -> Option<BTreeSet<String>> {
    let (first, second) = match (first, second) {
        (None, None) => return None,
        (Some(only), None) | (None, Some(only)) => return Some(only),
        (Some(a), Some(b)) => (a, b),
    };

    let first = multipliers_by_base(&first);
    let second = multipliers_by_base(&second);

    let bases: BTreeSet<&String> = match strategy {
        MergeStrategy::Intersection => first
            .keys()
            .filter(|base| second.contains_key(*base))
            .collect(),
        MergeStrategy::Union => first.keys().chain(second.keys()).collect(),
    };

    let merged: BTreeSet<String> = bases
        .into_iter()
        .map(|base| {
            let multiplier = first
                .get(base)
                .copied()
                .unwrap_or(1)
                .max(second.get(base).copied().unwrap_or(1));
            NormalizedToken::new(multiplier, base.as_str()).render()
        })
        .collect();

    info!("Merged symbol lists ({} symbols)", merged.len());
    Some(merged)
}

/// base -> multiplier for one list; colliding bases keep the largest multiplier
fn multipliers_by_base(symbols: &BTreeSet<String>) -> BTreeMap<String, u64> {
    let mut map = BTreeMap::new();
    for raw in symbols {
        let token = NormalizedToken::parse(raw);
        map.entry(token.base)
            .and_modify(|m: &mut u64| *m = (*m).max(token.multiplier))
            .or_insert(token.multiplier);
    }
    map
}
