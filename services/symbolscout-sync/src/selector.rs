//! Incremental selection - skip events at or before the watermark

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::events::Event;

/// Events strictly newer than `watermark`, in feed order.
///
/// Events with unreadable timestamps are never selected.
pub fn select_new(events: &[Event], watermark: DateTime<Utc>) -> Vec<Event> {
    events
        .iter()
        .filter(|event| match event.created_at() {
            Some(created) => created > watermark,
            None => {
                warn!(
                    "Skipping event with unreadable timestamp {:?}: {}",
                    event.created, event.title
                );
                false
            }
        })
        .cloned()
        .collect()
}

/// Maximum `created` across the whole batch, `None` for an empty batch.
///
/// Callers pass the full fetch, not the selected subset.
pub fn advance(events: &[Event]) -> Option<DateTime<Utc>> {
    events.iter().filter_map(Event::created_at).max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::parse_timestamp;

    fn at(created: &str) -> Event {
        Event {
            created: created.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_boundary_is_strict() {
        let watermark = parse_timestamp("2024-10-08 04:00:00.000Z").unwrap();
        let events = vec![
            at("2024-10-08 03:59:59.999Z"),
            at("2024-10-08 04:00:00.000Z"),
            at("2024-10-08 04:00:00.001Z"),
            at("2024-10-08 04:10:23.613Z"),
        ];

        let fresh = select_new(&events, watermark);
        assert_eq!(fresh.len(), 2);
        assert_eq!(fresh[0].created, "2024-10-08 04:00:00.001Z");
        assert_eq!(fresh[1].created, "2024-10-08 04:10:23.613Z");
    }

    #[test]
    fn test_order_is_preserved() {
        let events = vec![
            at("2024-10-08 05:00:00.000Z"),
            at("2024-10-08 04:00:00.000Z"),
            at("2024-10-08 06:00:00.000Z"),
        ];
        let fresh = select_new(&events, DateTime::<Utc>::MIN_UTC);
        let created: Vec<_> = fresh.iter().map(|e| e.created.as_str()).collect();
        assert_eq!(
            created,
            vec![
                "2024-10-08 05:00:00.000Z",
                "2024-10-08 04:00:00.000Z",
                "2024-10-08 06:00:00.000Z"
            ]
        );
    }

    #[test]
    fn test_advance_uses_whole_batch() {
        let events = vec![
            at("2024-10-08 03:59:59.999Z"),
            at("2024-10-08 04:10:23.613Z"),
            at("2024-10-08 04:00:00.000Z"),
        ];
        assert_eq!(advance(&events), parse_timestamp("2024-10-08 04:10:23.613Z"));
    }

    #[test]
    fn test_advance_empty_batch() {
        assert_eq!(advance(&[]), None);
    }

    #[test]
    fn test_unreadable_timestamps_are_ignored() {
        let events = vec![at("garbage"), at("2024-10-08 04:00:00.000Z")];
        assert_eq!(select_new(&events, DateTime::<Utc>::MIN_UTC).len(), 1);
        assert_eq!(advance(&events), parse_timestamp("2024-10-08 04:00:00.000Z"));
        assert_eq!(advance(&[at("garbage")]), None);
    }
}
