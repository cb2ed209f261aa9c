//! Market event model and news filtering

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::settings::NewsMonitoring;

/// Feed timestamp layout, e.g. `2024-10-08 04:10:23.613Z`
const FEED_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.fZ";

/// Feed response (`{ news: [...] }`)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NewsBatch {
    #[serde(default, deserialize_with = "skip_unreadable_events")]
    pub news: Vec<Event>,
}

/// A market-moving event from the feed
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Event {
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub category: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub source: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub symbols: SymbolsField,
    #[serde(default, deserialize_with = "null_as_default")]
    pub trading_pairs: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created: String,
    #[serde(default)]
    pub link: Option<String>,
}

/// `symbols` arrives either comma-joined or as a list
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum SymbolsField {
    Joined(String),
    List(Vec<String>),
}

impl Default for SymbolsField {
    fn default() -> Self {
        SymbolsField::List(Vec::new())
    }
}

impl SymbolsField {
    /// Flat text used for substring matching
    pub fn as_text(&self) -> String {
        match self {
            SymbolsField::Joined(s) => s.clone(),
            SymbolsField::List(items) => items.join(" "),
        }
    }
}

/// `null` reads as the field's default
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Decode events one by one; a malformed event is dropped, not the batch
fn skip_unreadable_events<'de, D>(deserializer: D) -> Result<Vec<Event>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<Event>(value) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!("Skipping unreadable news event: {}", e);
                None
            }
        })
        .collect())
}

impl Event {
    /// Parsed `created` timestamp, `None` when it cannot be read
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.created)
    }
}

/// Parse a feed timestamp; RFC 3339 is accepted as well
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, FEED_TIME_FORMAT)
        .map(|naive| naive.and_utc())
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        })
}

/// Keep events matching every configured criterion, preserving order
pub fn filter_events(events: Vec<Event>, monitoring: &NewsMonitoring) -> Vec<Event> {
    events
        .into_iter()
        .filter(|event| matches_monitoring(event, monitoring))
        .collect()
}

pub fn matches_monitoring(event: &Event, monitoring: &NewsMonitoring) -> bool {
    if !monitoring.categories.is_empty() && !monitoring.categories.contains(&event.category) {
        return false;
    }

    if !monitoring.sources.is_empty() && !monitoring.sources.contains(&event.source) {
        return false;
    }

    if !monitoring.title_keywords.is_empty() {
        let title = event.title.to_lowercase();
        if !monitoring
            .title_keywords
            .iter()
            .any(|kw| title.contains(&kw.to_lowercase()))
        {
            return false;
        }
    }

    if !monitoring.quote_currencies.is_empty() {
        let symbols_text = event.symbols.as_text();
        let mentions_quote = monitoring.quote_currencies.iter().any(|currency| {
            symbols_text.contains(currency.as_str())
                || event.trading_pairs.iter().any(|pair| {
                    let quote_side = pair.rsplit('/').next().unwrap_or(pair);
                    quote_side.contains(currency.as_str())
                })
        });
        if !mentions_quote {
            return false;
        }
    }

    true
}
