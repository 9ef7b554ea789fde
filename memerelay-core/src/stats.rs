use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;

const MAX_RECENT_ERRORS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    #[default]
    Ok,
    Error,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Ok => f.write_str("OK"),
            RunStatus::Error => f.write_str("ERROR"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub error: String,
}

/// Counters for the lifetime of the process. Nothing here is reloaded on restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStats {
    pub scraped: u64,
    pub sent: u64,
    pub failed: u64,
    pub runs: u64,
    pub started_at: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub last_error: Option<String>,
    pub recent_errors: VecDeque<ErrorRecord>,
    pub scraped_by_source: BTreeMap<String, u64>,
    #[serde(skip)]
    run_had_error: bool,
}

impl RunStats {
    pub fn new() -> Self {
        Self::started_at(Utc::now())
    }

    pub fn started_at(started_at: DateTime<Utc>) -> Self {
        Self {
            scraped: 0,
            sent: 0,
            failed: 0,
            runs: 0,
            started_at,
            last_run: None,
            status: RunStatus::Ok,
            last_error: None,
            recent_errors: VecDeque::with_capacity(MAX_RECENT_ERRORS),
            scraped_by_source: BTreeMap::new(),
            run_had_error: false,
        }
    }

    pub fn record_scraped(&mut self, source: &str, count: u64) {
        self.scraped += count;
        *self.scraped_by_source.entry(source.to_string()).or_insert(0) += count;
    }

    pub fn record_sent(&mut self, count: u64) {
        self.sent += count;
    }

    pub fn record_failed(&mut self, error: impl fmt::Display) {
        self.failed += 1;
        self.record_error(error);
    }

    /// Note an error that did not cost a post (fetch failures, persistence).
    pub fn record_error(&mut self, error: impl fmt::Display) {
        self.record_error_at(error, Utc::now());
    }

    pub fn record_error_at(&mut self, error: impl fmt::Display, timestamp: DateTime<Utc>) {
        let message = error.to_string();
        if self.recent_errors.len() == MAX_RECENT_ERRORS {
            self.recent_errors.pop_front();
        }
        self.recent_errors.push_back(ErrorRecord {
            timestamp,
            error: message.clone(),
        });
        self.last_error = Some(message);
        self.run_had_error = true;
    }

    /// Close out a run; the status reflects whether that run hit any error.
    pub fn complete_run(&mut self, finished_at: DateTime<Utc>) {
        self.runs += 1;
        self.last_run = Some(finished_at);
        self.status = if self.run_had_error {
            RunStatus::Error
        } else {
            RunStatus::Ok
        };
        self.run_had_error = false;
    }

    pub fn uptime(&self, now: DateTime<Utc>) -> Duration {
        now - self.started_at
    }

    pub fn top_source(&self) -> Option<(&str, u64)> {
        self.scraped_by_source
            .iter()
            .max_by_key(|(_, count)| **count)
            .map(|(source, count)| (source.as_str(), *count))
    }
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}

/// `"3d 4h"` style rendering used by reports and the display.
pub fn format_uptime(uptime: Duration) -> String {
    let hours = uptime.num_hours().max(0);
    format!("{}d {}h", hours / 24, hours % 24)
}
