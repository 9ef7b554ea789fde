use crate::delivery::{deliver_batch, DeliveryReport};
use crate::pipeline::{run_pipeline, SourceFailure};
use crate::shutdown::ShutdownSignal;
use chrono::{DateTime, Local, NaiveTime, TimeZone, Utc};
use memerelay_core::config::{Config, Trigger};
use memerelay_core::{CoreError, Deliverer, ErrorExt, PostSource};
use monitoring::{MonitoringManager, NotifyLevel};
use seen_store::SeenStore;
use std::time::Duration;
use tokio::time::{interval_at, sleep_until, Instant, Interval, MissedTickBehavior};
use tracing::{error, info, warn};

pub const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(5 * 60);
const MAX_SUMMARY_ERROR_CHARS: usize = 100;

/// What a single run did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub scraped: u64,
    pub selected: usize,
    pub delivery: DeliveryReport,
    pub failed_sources: Vec<SourceFailure>,
    pub all_sources_failed: bool,
}

/// Webhook summary for a finished run, if it is worth one.
pub fn summary_message(outcome: &RunOutcome) -> Option<(String, NotifyLevel)> {
    let delivery = &outcome.delivery;
    if outcome.all_sources_failed {
        let first_error: String = outcome
            .failed_sources
            .first()
            .map(|failure| failure.error.chars().take(MAX_SUMMARY_ERROR_CHARS).collect())
            .unwrap_or_default();
        return Some((
            format!("❌ Fetching failed for every subreddit: {}...", first_error),
            NotifyLevel::Error,
        ));
    }
    if delivery.failed > 0 {
        return Some((
            format!(
                "⚠️ Sent {}/{} posts. {} failed.",
                delivery.sent, delivery.attempted, delivery.failed
            ),
            NotifyLevel::Warning,
        ));
    }
    if delivery.sent > 0 {
        return Some((
            format!("✅ Successfully sent {} posts", delivery.sent),
            NotifyLevel::Info,
        ));
    }
    None
}

/// First configured time of day strictly after `now`, today or tomorrow.
pub fn next_run_after<Tz: TimeZone>(times: &[NaiveTime], now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
    let mut sorted = times.to_vec();
    sorted.sort();

    let timezone = now.timezone();
    let today = now.date_naive();
    // Two days ahead covers a slot swallowed by a DST gap.
    for date in today.iter_days().take(3) {
        for time in &sorted {
            let Some(candidate) = timezone
                .from_local_datetime(&date.and_time(*time))
                .earliest()
            else {
                continue;
            };
            if candidate > *now {
                return Some(candidate);
            }
        }
    }
    None
}

enum RunTimer {
    Every(Interval),
    Daily { times: Vec<NaiveTime>, next: Instant },
}

impl RunTimer {
    fn new(trigger: &Trigger) -> Self {
        match trigger {
            Trigger::Interval(period) => {
                let mut ticker = interval_at(Instant::now() + *period, *period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                RunTimer::Every(ticker)
            }
            Trigger::TimesOfDay(times) => {
                let mut timer = RunTimer::Daily {
                    times: times.clone(),
                    next: Instant::now(),
                };
                timer.rearm();
                timer
            }
        }
    }

    async fn tick(&mut self) {
        match self {
            RunTimer::Every(ticker) => {
                ticker.tick().await;
            }
            RunTimer::Daily { next, .. } => sleep_until(*next).await,
        }
    }

    /// Schedule the next trigger relative to the end of the run that just
    /// finished. Ticks that came due while it was running are dropped.
    fn rearm(&mut self) {
        let (times, next) = match self {
            RunTimer::Every(ticker) => {
                ticker.reset();
                return;
            }
            RunTimer::Daily { times, next } => (times, next),
        };
        let now = Local::now();
        match next_run_after(times, &now) {
            Some(at) => {
                let wait = (at - now).to_std().unwrap_or_default();
                *next = Instant::now() + wait;
                info!("Next run scheduled for {}", at.format("%Y-%m-%d %H:%M"));
            }
            None => {
                // Unreachable with a validated config; fall back to a day.
                *next = Instant::now() + Duration::from_secs(24 * 60 * 60);
            }
        }
    }
}

enum Wakeup {
    Run,
    Housekeeping,
    Shutdown,
}

/// Drives runs of fetch -> filter -> deliver -> persist, one at a time.
pub struct Scheduler<S, D> {
    config: Config,
    source: S,
    deliverer: D,
    seen: SeenStore,
    monitor: MonitoringManager,
    shutdown: ShutdownSignal,
    housekeeping_interval: Duration,
}

impl<S: PostSource, D: Deliverer> Scheduler<S, D> {
    pub fn new(
        config: Config,
        source: S,
        deliverer: D,
        seen: SeenStore,
        monitor: MonitoringManager,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            config,
            source,
            deliverer,
            seen,
            monitor,
            shutdown,
            housekeeping_interval: HOUSEKEEPING_INTERVAL,
        }
    }

    pub fn with_housekeeping_interval(mut self, interval: Duration) -> Self {
        self.housekeeping_interval = interval;
        self
    }

    pub fn seen(&self) -> &SeenStore {
        &self.seen
    }

    pub fn monitor(&self) -> &MonitoringManager {
        &self.monitor
    }

    pub fn monitor_mut(&mut self) -> &mut MonitoringManager {
        &mut self.monitor
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn deliverer(&self) -> &D {
        &self.deliverer
    }

    /// One complete run, followed by the after-run reporting.
    pub async fn run_once(&mut self) -> RunOutcome {
        info!("Starting meme run");
        let pipeline = run_pipeline(&self.config, &self.seen, &self.source, &self.shutdown).await;

        let stats = self.monitor.stats_mut();
        for (source, count) in &pipeline.scraped_by_source {
            stats.record_scraped(source, *count);
        }
        for failure in &pipeline.failed_sources {
            stats.record_error(format!("r/{}: {}", failure.source, failure.error));
        }
        if pipeline.all_sources_failed {
            error!("Every configured subreddit failed to fetch");
        }

        let delivery = if pipeline.posts.is_empty() {
            info!("No new memes found");
            DeliveryReport::default()
        } else {
            info!("Found {} new memes", pipeline.posts.len());
            deliver_batch(
                &pipeline.posts,
                &self.deliverer,
                &mut self.seen,
                self.monitor.stats_mut(),
                self.config.delivery.send_delay,
                &self.shutdown,
            )
            .await
        };

        info!(
            "Run finished: {} scraped, {} sent, {} failed",
            pipeline.scraped, delivery.sent, delivery.failed
        );

        let outcome = RunOutcome {
            scraped: pipeline.scraped,
            selected: pipeline.posts.len(),
            delivery,
            failed_sources: pipeline.failed_sources,
            all_sources_failed: pipeline.all_sources_failed,
        };

        self.monitor.stats_mut().complete_run(Utc::now());
        self.monitor.refresh_display();
        self.monitor.write_snapshot();
        if let Some((message, level)) = summary_message(&outcome) {
            self.monitor.notify(&message, level).await;
        }

        outcome
    }

    /// Loop until shutdown, then flush state.
    pub async fn run(&mut self) {
        let mut shutdown = self.shutdown.clone();

        if self.config.schedule.run_on_startup && !shutdown.is_triggered() {
            self.run_once().await;
        }

        match &self.config.schedule.trigger {
            Trigger::Interval(period) => info!("Scheduler set up to run every {:?}", period),
            Trigger::TimesOfDay(times) => {
                let listed: Vec<String> = times.iter().map(|t| t.format("%H:%M").to_string()).collect();
                info!("Scheduler set up to run daily at {}", listed.join(", "));
            }
        }

        let mut timer = RunTimer::new(&self.config.schedule.trigger);
        let mut housekeeping = interval_at(
            Instant::now() + self.housekeeping_interval,
            self.housekeeping_interval,
        );
        housekeeping.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let wakeup = tokio::select! {
                _ = shutdown.wait() => Wakeup::Shutdown,
                _ = timer.tick() => Wakeup::Run,
                _ = housekeeping.tick() => Wakeup::Housekeeping,
            };

            match wakeup {
                Wakeup::Run => {
                    self.run_once().await;
                    timer.rearm();
                }
                Wakeup::Housekeeping => self.monitor.housekeeping(Local::now()).await,
                Wakeup::Shutdown => {
                    info!("Shutdown requested, stopping scheduler");
                    break;
                }
            }
        }

        self.finish().await;
    }

    /// Flush the seen-set and statistics and announce the stop.
    pub async fn finish(&mut self) {
        if self.seen.is_dirty() {
            if let Err(e) = self.seen.save() {
                let e = CoreError::from(e);
                e.log_error();
                warn!("Seen-set could not be flushed on shutdown");
            }
        }
        self.monitor.shutdown().await;
    }
}
