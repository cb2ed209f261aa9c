//! Symbol extraction from a single event

use std::collections::BTreeSet;

use crate::events::{Event, SymbolsField};

/// Base symbols referenced by `event`, minus quote currencies.
///
/// Quote currencies are removed by exact match only.
pub fn extract_symbols(event: &Event, quote_currencies: &[String]) -> BTreeSet<String> {
    let mut symbols: BTreeSet<String> = match &event.symbols {
        SymbolsField::Joined(joined) => joined
            .trim()
            .split(',')
            .map(|s| s.trim().to_string())
            .collect(),
        SymbolsField::List(list) => list.iter().cloned().collect(),
    };

    for pair in &event.trading_pairs {
        symbols.extend(pair.split(|c: char| c == '/' || c == '-').map(str::to_string));
    }

    symbols.retain(|s| !s.is_empty() && !quote_currencies.contains(s));
    symbols
}
