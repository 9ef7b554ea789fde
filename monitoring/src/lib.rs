//! Run statistics plus the best-effort side channels that report them: a
//! webhook notifier and an optional e-ink status display. Nothing in here is
//! allowed to fail a run; errors are logged and dropped.

pub mod display;
pub mod notifier;


pub use display::{Bitmap, DisplayDriver, EInkDisplay, PbmFileDriver};
pub use notifier::{build_payload, NotifyLevel, WebhookNotifier};

use chrono::{DateTime, Local, NaiveDate, Timelike, Utc};
use memerelay_core::config::{DisplaySettings, MonitoringSettings};
use memerelay_core::{
    format_uptime, CoreError, ErrorExt, NotifierError, PersistenceError, RunStats,
};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

const MAX_REPORTED_ERROR_CHARS: usize = 100;

fn notifier_or_warn(built: Result<WebhookNotifier, NotifierError>) -> Option<WebhookNotifier> {
    match built {
        Ok(notifier) => Some(notifier),
        Err(e) => {
            CoreError::from(e).log_warn();
            warn!("Webhook notifications disabled for this session");
            None
        }
    }
}

#[derive(Debug)]
pub struct MonitoringManager {
    stats: RunStats,
    notifier: Option<WebhookNotifier>,
    display: Option<EInkDisplay>,
    stats_path: Option<PathBuf>,
    daily_report_hour: Option<u32>,
    last_report_date: Option<NaiveDate>,
}

impl MonitoringManager {
    /// Build from configuration. The display is probed here and silently
    /// absent when the hardware is not there; a webhook client that cannot be
    /// built leaves the notifier off.
    pub fn new(settings: &MonitoringSettings, display: Option<&DisplaySettings>) -> Self {
        let notifier = settings
            .webhook
            .clone()
            .and_then(|webhook| notifier_or_warn(WebhookNotifier::new(webhook)));
        let display = display.and_then(EInkDisplay::probe);

        Self {
            stats: RunStats::new(),
            notifier,
            display,
            stats_path: settings.stats_path.clone(),
            daily_report_hour: settings.daily_report_hour,
            last_report_date: None,
        }
    }

    /// Manager with no side channels.
    pub fn detached() -> Self {
        Self {
            stats: RunStats::new(),
            notifier: None,
            display: None,
            stats_path: None,
            daily_report_hour: None,
            last_report_date: None,
        }
    }

    pub fn with_display(mut self, display: EInkDisplay) -> Self {
        self.display = Some(display);
        self
    }

    pub fn with_stats_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.stats_path = Some(path.into());
        self
    }

    pub fn with_daily_report_hour(mut self, hour: Option<u32>) -> Self {
        self.daily_report_hour = hour;
        self
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut RunStats {
        &mut self.stats
    }

    pub fn has_notifier(&self) -> bool {
        self.notifier.is_some()
    }

    pub fn has_display(&self) -> bool {
        self.display.is_some()
    }

    /// Post to the webhook if one is configured. Failures are only logged.
    pub async fn notify(&self, message: &str, level: NotifyLevel) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        if let Err(e) = notifier.notify(message, level).await {
            CoreError::from(e).log_warn();
        }
    }

    pub fn show_startup(&mut self) {
        if let Some(display) = self.display.as_mut() {
            if let Err(e) = display.show_startup() {
                CoreError::from(e).log_warn();
            }
        }
    }

    pub fn refresh_display(&mut self) {
        let Some(display) = self.display.as_mut() else {
            return;
        };
        if let Err(e) = display.show_status(&self.stats, Local::now()) {
            CoreError::from(e).log_warn();
        }
    }

    /// Write the statistics snapshot if a path is configured.
    pub fn write_snapshot(&self) {
        if let Err(e) = self.try_write_snapshot() {
            CoreError::from(e).log_warn();
        }
    }

    fn try_write_snapshot(&self) -> Result<(), PersistenceError> {
        let Some(path) = &self.stats_path else {
            return Ok(());
        };
        let write_failed = |reason: String| PersistenceError::WriteFailed {
            path: path.display().to_string(),
            reason,
        };

        let json = serde_json::to_string_pretty(&self.stats).map_err(|e| write_failed(e.to_string()))?;
        fs::write(path, json).map_err(|e| write_failed(e.to_string()))?;
        debug!("Wrote statistics snapshot to {}", path.display());
        Ok(())
    }

    /// Multi-line report of the counters since startup.
    pub fn daily_report(&self, now: DateTime<Utc>) -> String {
        let stats = &self.stats;
        let mut report = String::from("📊 Daily Report\n");
        report.push_str(&format!("Uptime: {}\n", format_uptime(stats.uptime(now))));
        report.push_str(&format!("Scraped: {} memes\n", stats.scraped));
        report.push_str(&format!("Sent: {} memes\n", stats.sent));
        report.push_str(&format!("Failed: {} memes\n", stats.failed));

        if let Some((source, count)) = stats.top_source() {
            report.push_str(&format!("Top subreddit: r/{} ({} memes)\n", source, count));
        }
        if let Some(error) = &stats.last_error {
            let short: String = error.chars().take(MAX_REPORTED_ERROR_CHARS).collect();
            report.push_str(&format!("Last error: {}...\n", short));
        }
        report
    }

    /// True when the report is due: the configured hour has come and no
    /// report went out yet on this local date.
    pub fn daily_report_due(&self, now: DateTime<Local>) -> bool {
        match self.daily_report_hour {
            Some(hour) => {
                now.hour() == hour && self.last_report_date != Some(now.date_naive())
            }
            None => false,
        }
    }

    /// Send the daily report when due. Returns whether one was sent.
    pub async fn maybe_send_daily_report(&mut self, now: DateTime<Local>) -> bool {
        if !self.daily_report_due(now) {
            return false;
        }
        self.last_report_date = Some(now.date_naive());

        let report = self.daily_report(now.with_timezone(&Utc));
        info!("Sending daily report");
        self.notify(&report, NotifyLevel::Info).await;
        true
    }

    /// Periodic idle work: refresh the display and send the daily report.
    pub async fn housekeeping(&mut self, now: DateTime<Local>) {
        self.refresh_display();
        self.maybe_send_daily_report(now).await;
    }

    /// Final flush on shutdown.
    pub async fn shutdown(&mut self) {
        self.write_snapshot();
        self.refresh_display();
        if self.notifier.is_none() {
            return;
        }
        let message = format!(
            "🛑 Meme scraper stopped. Sent {} memes this session.",
            self.stats.sent
        );
        self.notify(&message, NotifyLevel::Warning).await;
        info!("Shutdown notification sent");
    }
}
