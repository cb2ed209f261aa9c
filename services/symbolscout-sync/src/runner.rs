//! Sync Runner - the per-cycle pipeline and the interval loop around it

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::client::{
    HttpNewsFeed, NewsFeed, RemotePairList, SymbolScoutClient, SymbolScoutWatchlist,
    WatchlistSource,
};
use crate::error::SettingsError;
use crate::events::filter_events;
use crate::extractor::extract_symbols;
use crate::merge::merge_symbol_lists;
use crate::notify::{Notification, NotificationHub};
use crate::reconciler::{reconcile_file, FileReconciliation};
use crate::restart::{ProcessControl, RestartOrchestrator, RestartOutcome, ShellProcessControl};
use crate::selector::{advance, select_new};
use crate::settings::{
    expand_path, ExclusionStrategy, ListSource, MergeStrategy, NewsMonitoring, Settings,
};
use crate::watermark::WatermarkStore;

/// Where the exclusion set comes from; exactly one mode per configuration
pub enum SymbolSource {
    /// Market events, filtered and read past the watermark
    News(Arc<dyn NewsFeed>),
    /// Two external watch-lists merged into one set
    Lists {
        watchlist: Option<Arc<dyn WatchlistSource>>,
        pairlist: Option<Arc<dyn WatchlistSource>>,
        merge_strategy: MergeStrategy,
    },
}

/// What one cycle did
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    /// Events returned by the feed
    pub fetched: usize,
    /// Events past the watermark that also passed the news filter
    pub selected: usize,
    pub exclusions: BTreeSet<String>,
    pub files: Vec<FileReconciliation>,
    pub failed_files: Vec<PathBuf>,
    pub restart: RestartOutcome,
    /// Watermark written at the end of the cycle
    pub watermark: Option<DateTime<Utc>>,
}

impl CycleReport {
    fn new(cycle_id: Uuid) -> Self {
        Self {
            cycle_id,
            fetched: 0,
            selected: 0,
            exclusions: BTreeSet::new(),
            files: Vec::new(),
            failed_files: Vec::new(),
            restart: RestartOutcome::Skipped,
            watermark: None,
        }
    }

    /// Whether any target file was rewritten
    pub fn changed(&self) -> bool {
        self.files.iter().any(|f| f.outcome.changed)
    }
}

/// Runs the exclusion pipeline once per interval
pub struct SyncRunner<P> {
    source: SymbolSource,
    monitoring: NewsMonitoring,
    strategy: ExclusionStrategy,
    quote_currency: Option<String>,
    targets: Vec<PathBuf>,
    check_interval: Duration,
    watermark: WatermarkStore,
    restarter: RestartOrchestrator<P>,
    hub: NotificationHub,
}

impl SyncRunner<ShellProcessControl> {
    /// Wire up HTTP sources, shell process control and notifications from settings
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let client = Arc::new(SymbolScoutClient::new(&settings.http)?);

        let source = match settings.list_sync() {
            Some(sync) => {
                info!(
                    "Symbol list sync enabled ({:?} merge)",
                    sync.merge_strategy
                );
                SymbolSource::Lists {
                    watchlist: ListSource::active_endpoint(&sync.symbolscout_watchlist).map(
                        |endpoint| {
                            Arc::new(SymbolScoutWatchlist::new(client.clone(), endpoint))
                                as Arc<dyn WatchlistSource>
                        },
                    ),
                    pairlist: ListSource::active_endpoint(&sync.remotepairlist).map(|endpoint| {
                        Arc::new(RemotePairList::new(client.clone(), endpoint))
                            as Arc<dyn WatchlistSource>
                    }),
                    merge_strategy: sync.merge_strategy,
                }
            }
            None => SymbolSource::News(Arc::new(HttpNewsFeed::new(
                client.clone(),
                settings.symbolscout_endpoint.as_str(),
            ))),
        };

        let (stop_command, start_command) = settings.restart_commands();
        let control = ShellProcessControl::new(stop_command, start_command)
            .in_dir(settings.passivbot_folder());

        let hub = NotificationHub::from_settings(settings.notify_on(), settings.webhook_urls())?;

        Ok(Self::new(settings, source, control, hub)?)
    }
}

impl<P: ProcessControl> SyncRunner<P> {
    pub fn new(
        settings: &Settings,
        source: SymbolSource,
        control: P,
        hub: NotificationHub,
    ) -> Result<Self, SettingsError> {
        let strategy = settings.exclusion_strategy().ok_or_else(|| {
            SettingsError::Invalid("symbol_exclusion_strategy is required".to_string())
        })?;

        Ok(Self {
            source,
            monitoring: settings.news_monitoring.clone(),
            strategy,
            quote_currency: settings.passivbot.trading_quote_currency.clone(),
            targets: settings.target_config_files(),
            check_interval: Duration::from_secs(settings.check_interval.max(1)),
            watermark: WatermarkStore::new(expand_path(&settings.state_file)),
            restarter: RestartOrchestrator::new(control),
            hub,
        })
    }

    pub fn watermark_store(&self) -> &WatermarkStore {
        &self.watermark
    }

    pub fn process_control(&self) -> &P {
        self.restarter.control()
    }

    /// Run forever: one cycle now, then one per `check_interval`
    pub async fn run(self) -> anyhow::Result<()> {
        info!(
            "Started SymbolScout integration, checking every {:?}",
            self.check_interval
        );
        self.hub.notify(Notification::Startup).await;

        let mut ticker = interval(self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.run_cycle().await {
                Ok(report) => debug!(
                    "Cycle {} finished: {} files changed, restart {:?}",
                    report.cycle_id,
                    report.files.iter().filter(|f| f.outcome.changed).count(),
                    report.restart
                ),
                Err(e) => {
                    error!("Cycle failed: {:#}", e);
                    self.notify_error("cycle", &e).await;
                }
            }
        }
    }

    /// One pass of the pipeline
    pub async fn run_cycle(&self) -> anyhow::Result<CycleReport> {
        let cycle_id = Uuid::new_v4();
        let span = info_span!("cycle", id = %cycle_id);

        async {
            let mut report = CycleReport::new(cycle_id);
            match &self.source {
                SymbolSource::News(feed) => self.news_cycle(feed.as_ref(), &mut report).await?,
                SymbolSource::Lists {
                    watchlist,
                    pairlist,
                    merge_strategy,
                } => {
                    self.list_cycle(
                        watchlist.as_deref(),
                        pairlist.as_deref(),
                        *merge_strategy,
                        &mut report,
                    )
                    .await
                }
            }
            Ok::<_, anyhow::Error>(report)
        }
        .instrument(span)
        .await
    }

    async fn news_cycle(
        &self,
        feed: &dyn NewsFeed,
        report: &mut CycleReport,
    ) -> anyhow::Result<()> {
        let watermark = self.watermark.load().await;

        let batch = match feed.fetch_news().await {
            Ok(batch) => batch,
            Err(e) => {
                error!("Failed to fetch news: {}", e);
                self.notify_error("news feed", &e).await;
                return Ok(());
            }
        };
        report.fetched = batch.news.len();
        info!("Fetched {} news articles", report.fetched);

        let fresh = select_new(&batch.news, watermark);
        let fresh_count = fresh.len();
        let relevant = filter_events(fresh, &self.monitoring);
        report.selected = relevant.len();
        info!(
            "Filtered {} relevant news articles out of {} new",
            report.selected, fresh_count
        );

        for event in &relevant {
            let symbols = extract_symbols(event, &self.monitoring.quote_currencies);
            info!(
                category = %event.category,
                symbols = ?symbols,
                "New article: {}", event.title
            );
            self.hub
                .notify(Notification::NewArticle {
                    title: event.title.clone(),
                    link: event.link.clone(),
                })
                .await;
            report.exclusions.extend(symbols);
        }

        if report.exclusions.is_empty() {
            info!("No new symbols to exclude");
        } else {
            self.apply_exclusions(report).await;
        }

        // Advance only after every target file has been handled
        if let Some(newest) = advance(&batch.news) {
            if newest > watermark {
                self.watermark.save(newest).await?;
                report.watermark = Some(newest);
                debug!("Watermark advanced to {}", newest);
            }
        }

        Ok(())
    }

    async fn list_cycle(
        &self,
        watchlist: Option<&dyn WatchlistSource>,
        pairlist: Option<&dyn WatchlistSource>,
        merge_strategy: MergeStrategy,
        report: &mut CycleReport,
    ) {
        let first = self.fetch_list(watchlist).await;
        let second = self.fetch_list(pairlist).await;

        let Some(mut merged) = merge_symbol_lists(first, second, merge_strategy) else {
            warn!("No symbol lists available, skipping reconciliation");
            return;
        };
        // Quote currencies are never exclusions
        merged.retain(|symbol| !self.monitoring.quote_currencies.contains(symbol));

        report.fetched = merged.len();
        report.exclusions = merged;

        if report.exclusions.is_empty() {
            info!("Merged symbol list is empty");
        } else {
            self.apply_exclusions(report).await;
        }
    }

    async fn fetch_list(&self, source: Option<&dyn WatchlistSource>) -> Option<BTreeSet<String>> {
        let source = source?;
        match source.fetch_symbols().await {
            Ok(symbols) => Some(symbols),
            Err(e) => {
                error!("Error fetching {}: {}", source.name(), e);
                self.notify_error(source.name(), &e).await;
                None
            }
        }
    }

    /// Reconcile every target file in order, then restart if anything changed
    async fn apply_exclusions(&self, report: &mut CycleReport) {
        info!(
            "Total symbols to exclude: {}",
            report
                .exclusions
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        );

        for path in &self.targets {
            match reconcile_file(
                path,
                &report.exclusions,
                self.strategy,
                self.quote_currency.as_deref(),
            )
            .await
            {
                Ok(file) => {
                    if file.outcome.changed {
                        self.hub
                            .notify(Notification::ConfigUpdated {
                                file: file.path.clone(),
                                removed: file.outcome.removed.clone(),
                                added: file.outcome.added.clone(),
                            })
                            .await;
                    }
                    report.files.push(file);
                }
                Err(e) => {
                    error!("Skipping {}: {}", path.display(), e);
                    self.notify_error(&path.display().to_string(), &e).await;
                    report.failed_files.push(path.clone());
                }
            }
        }

        report.restart = self.restarter.maybe_restart(report.changed()).await;
        match &report.restart {
            RestartOutcome::StopFailed(failure) => {
                self.hub
                    .notify(Notification::RestartFailed {
                        stage: "stop".to_string(),
                        message: failure.to_string(),
                    })
                    .await;
            }
            RestartOutcome::StartFailed(failure) => {
                self.hub
                    .notify(Notification::RestartFailed {
                        stage: "start".to_string(),
                        message: failure.to_string(),
                    })
                    .await;
            }
            RestartOutcome::Skipped | RestartOutcome::Restarted => {}
        }
    }

    async fn notify_error(&self, context: &str, error: impl std::fmt::Display) {
        self.hub
            .notify(Notification::Error {
                context: context.to_string(),
                message: error.to_string(),
            })
            .await;
    }
}
