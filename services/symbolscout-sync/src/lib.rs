//! SymbolScout Sync Library
//!
//! Keeps a trading bot's coin lists clear of symbols flagged by the
//! SymbolScout feed or by external watch-lists.

pub mod client;
pub mod error;
pub mod events;
pub mod extractor;
pub mod merge;
pub mod notify;
pub mod reconciler;
pub mod restart;
pub mod retry;
pub mod runner;
pub mod selector;
pub mod settings;
pub mod symbol;
pub mod watermark;


// Re-export main types for convenience
pub use client::{
    HttpNewsFeed, NewsFeed, RemotePairList, SymbolScoutClient, SymbolScoutWatchlist,
    WatchlistSource,
};
pub use error::{CommandFailure, FetchError, ReconcileError, SettingsError};
pub use events::{Event, NewsBatch, SymbolsField};
pub use notify::{LogNotifier, Notification, NotificationHub, Notifier, WebhookNotifier};
pub use reconciler::{reconcile, reconcile_file, FileReconciliation, Reconciliation};
pub use restart::{ProcessControl, RestartOrchestrator, RestartOutcome, ShellProcessControl};
pub use runner::{CycleReport, SymbolSource, SyncRunner};
pub use settings::{ExclusionStrategy, MergeStrategy, Settings};
pub use symbol::{normalize, render, NormalizedToken};
pub use watermark::WatermarkStore;
