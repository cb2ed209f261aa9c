//! Config reconciliation - apply an exclusion set to a bot config document

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::ReconcileError;
use crate::settings::ExclusionStrategy;

/// Suffixes tried, in order, when inferring the quote currency
pub const KNOWN_QUOTE_CURRENCIES: [&str; 6] = ["USDT", "BUSD", "USD", "USDC", "BTC", "ETH"];

/// Used when no known suffix matches
pub const DEFAULT_QUOTE_CURRENCY: &str = "USDT";

/// Result of reconciling one document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    pub changed: bool,
    pub quote_currency: String,
    pub removed: Vec<String>,
    pub added: Vec<String>,
}

/// Result of reconciling one file on disk
#[derive(Debug, Clone)]
pub struct FileReconciliation {
    pub path: PathBuf,
    pub outcome: Reconciliation,
}

/// Apply `exclusions` to the `live` section of a bot config document in place.
///
/// `changed` compares the serialized document before and after, so a run
/// that leaves the content identical is never reported as a change.
pub fn reconcile(
    document: &mut Value,
    exclusions: &BTreeSet<String>,
    strategy: ExclusionStrategy,
    quote_currency: Option<&str>,
) -> Result<Reconciliation, ReconcileError> {
    let before = serde_json::to_string(&*document)?;

    let live = live_section(document)?;
    let quote_currency = match quote_currency {
        Some(quote) => quote.to_string(),
        None => determine_quote_currency(approved_coins(live)?),
    };

    let mut removed = Vec::new();
    let mut added = Vec::new();

    if strategy.remove_from_approved_coins {
        let approved = string_list_mut(live, "approved_coins")?;
        approved.retain(|coin| {
            let Some(coin_str) = coin.as_str() else {
                return true;
            };
            let base = strip_quote(coin_str, &quote_currency);
            if exclusions.contains(base) {
                info!("Removing {} from approved_coins (matches {})", coin_str, base);
                removed.push(coin_str.to_string());
                false
            } else {
                true
            }
        });
    }

    if strategy.add_to_ignored_coins {
        let ignored = live
            .entry("ignored_coins")
            .or_insert_with(|| Value::Array(Vec::new()));
        let ignored = ignored.as_array_mut().ok_or_else(|| {
            ReconcileError::Shape("live.ignored_coins is not a list".to_string())
        })?;

        for symbol in exclusions {
            let coin = format!("{}{}", symbol, quote_currency);
            if !ignored.iter().any(|c| c.as_str() == Some(coin.as_str())) {
                info!("Adding {} to ignored_coins (matches {})", coin, symbol);
                ignored.push(Value::String(coin.clone()));
                added.push(coin);
            }
        }
    }

    let after = serde_json::to_string(&*document)?;

    Ok(Reconciliation {
        changed: before != after,
        quote_currency,
        removed,
        added,
    })
}

/// First known quote suffix of the first approved coin, else the default
pub fn determine_quote_currency(approved: &[Value]) -> String {
    if let Some(first) = approved.first().and_then(Value::as_str) {
        if let Some(quote) = KNOWN_QUOTE_CURRENCIES
            .iter()
            .find(|quote| first.ends_with(*quote))
        {
            return quote.to_string();
        }
    }

    warn!(
        "Couldn't determine quote currency from approved_coins. Using {} as default.",
        DEFAULT_QUOTE_CURRENCY
    );
    DEFAULT_QUOTE_CURRENCY.to_string()
}

/// Right-trim every character that occurs in `quote`.
///
/// A character-class trim, not a suffix check: `"SUSDT"` with quote `"USDT"`
/// strips to `""`.
pub fn strip_quote<'a>(coin: &'a str, quote: &str) -> &'a str {
    coin.trim_end_matches(|c: char| quote.contains(c))
}

/// Reconcile one bot config file and write it back when it changed
pub async fn reconcile_file(
    path: &Path,
    exclusions: &BTreeSet<String>,
    strategy: ExclusionStrategy,
    quote_currency: Option<&str>,
) -> Result<FileReconciliation, ReconcileError> {
    info!("Attempting to update config file: {}", path.display());

    let raw = match fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ReconcileError::Missing(path.to_path_buf()));
        }
        Err(source) => {
            return Err(ReconcileError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let mut document: Value =
        serde_json::from_str(&raw).map_err(|source| ReconcileError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;

    let outcome = reconcile(&mut document, exclusions, strategy, quote_currency)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    if outcome.removed.is_empty() {
        info!("No coins removed from approved_coins in {}", name);
    } else {
        info!("Removed from approved_coins in {}: {}", name, outcome.removed.join(", "));
    }
    if outcome.added.is_empty() {
        info!("No coins added to ignored_coins in {}", name);
    } else {
        info!("Added to ignored_coins in {}: {}", name, outcome.added.join(", "));
    }

    if outcome.changed {
        write_document(path, &document).await?;
        info!("Updated bot config file: {}", path.display());
    } else {
        debug!("{} unchanged, not rewritten", path.display());
    }

    Ok(FileReconciliation {
        path: path.to_path_buf(),
        outcome,
    })
}

/// Replace the whole file via a sibling temp file and rename
async fn write_document(path: &Path, document: &Value) -> Result<(), ReconcileError> {
    let content = to_pretty_json(document)?;

    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let write_err = |source| ReconcileError::Write {
        path: path.to_path_buf(),
        source,
    };
    fs::write(&tmp_path, content).await.map_err(write_err)?;
    fs::rename(&tmp_path, path).await.map_err(write_err)?;
    Ok(())
}

/// Four-space indented JSON, matching the bot's own formatting
pub fn to_pretty_json(document: &Value) -> Result<String, serde_json::Error> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    document.serialize(&mut ser)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn live_section(document: &mut Value) -> Result<&mut Map<String, Value>, ReconcileError> {
    document
        .get_mut("live")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| ReconcileError::Shape("missing `live` object".to_string()))
}

fn approved_coins(live: &Map<String, Value>) -> Result<&[Value], ReconcileError> {
    live.get("approved_coins")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .ok_or_else(|| ReconcileError::Shape("live.approved_coins is not a list".to_string()))
}

fn string_list_mut<'a>(
    live: &'a mut Map<String, Value>,
    key: &str,
) -> Result<&'a mut Vec<Value>, ReconcileError> {
    live.get_mut(key)
        .and_then(Value::as_array_mut)
        .ok_or_else(|| ReconcileError::Shape(format!("live.{} is not a list", key)))
}
