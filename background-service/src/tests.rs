use crate::{
    deliver_batch, filter_candidates, next_run_after, run_pipeline, summary_message, DeliveryReport,
    RunOutcome, Scheduler, ShutdownController, ShutdownSignal, SourceFailure,
};
use chrono::{NaiveTime, TimeZone, Utc};
use memerelay_core::config::Config;
use memerelay_core::{
    CandidatePost, CoreError, DeliveryMethod, Deliverer, FetchRequest, PostSource,
    RedditApiError, RunStats, RunStatus, TelegramError,
};
use monitoring::{MonitoringManager, NotifyLevel};
use seen_store::SeenStore;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

fn post(id: &str, score: i64) -> CandidatePost {
    CandidatePost {
        id: id.to_string(),
        title: format!("Post {}", id),
        source: "memes".to_string(),
        score,
        author: "someone".to_string(),
        url: format!("https://i.redd.it/{}.jpg", id),
        media_url: Some(format!("https://i.redd.it/{}.jpg", id)),
        permalink: format!("https://reddit.com/r/memes/comments/{}/", id),
        nsfw: false,
        created_utc: 1_700_000_000,
    }
}

fn config(json: &str) -> Config {
    let mut config = Config::from_json_str(json).unwrap();
    config.delivery.send_delay = Duration::ZERO;
    config
}

/// Post source answering from a fixed table; missing sources fail.
#[derive(Default)]
struct FakeSource {
    listings: HashMap<String, Vec<CandidatePost>>,
    requests: Mutex<Vec<String>>,
    latency: Option<Duration>,
}

impl FakeSource {
    fn slow(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn with(mut self, source: &str, posts: Vec<CandidatePost>) -> Self {
        self.listings.insert(source.to_string(), posts);
        self
    }

    fn requested(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl PostSource for FakeSource {
    async fn fetch(&self, request: FetchRequest<'_>) -> Result<Vec<CandidatePost>, CoreError> {
        self.requests.lock().unwrap().push(request.source.to_string());
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        match self.listings.get(request.source) {
            Some(posts) => Ok(posts.iter().take(request.limit as usize).cloned().collect()),
            None => Err(CoreError::RedditApi(RedditApiError::ServerError {
                status_code: 503,
            })),
        }
    }
}

/// Deliverer that fails for chosen ids and can pull the shutdown lever.
#[derive(Default)]
struct FakeDeliverer {
    failing: HashSet<String>,
    delivered: Mutex<Vec<String>>,
    stop_after: Option<(usize, Arc<ShutdownController>)>,
}

impl FakeDeliverer {
    fn failing(ids: &[&str]) -> Self {
        Self {
            failing: ids.iter().map(|id| id.to_string()).collect(),
            ..Self::default()
        }
    }

    fn attempted(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }
}

impl Deliverer for FakeDeliverer {
    async fn deliver(&self, post: &CandidatePost) -> Result<DeliveryMethod, CoreError> {
        let count = {
            let mut delivered = self.delivered.lock().unwrap();
            delivered.push(post.id.clone());
            delivered.len()
        };
        if let Some((limit, controller)) = &self.stop_after {
            if count >= *limit {
                controller.trigger();
            }
        }
        if self.failing.contains(&post.id) {
            return Err(CoreError::Telegram(TelegramError::Rejected {
                error_code: 400,
                description: "Bad Request: can't parse entities".to_string(),
            }));
        }
        Ok(DeliveryMethod::Photo)
    }
}

fn seen_with(dir: &TempDir, ids: &[&str]) -> SeenStore {
    let mut seen = SeenStore::new(dir.path().join("sent_posts.json"));
    for id in ids {
        seen.insert(*id);
    }
    seen
}

fn ids(posts: &[CandidatePost]) -> Vec<&str> {
    posts.iter().map(|p| p.id.as_str()).collect()
}

#[tokio::test]
async fn test_seen_posts_filtered_and_batch_capped() {
    let dir = TempDir::new().unwrap();
    let posts: Vec<CandidatePost> = (0..10).map(|i| post(&format!("p{}", i), 500)).collect();
    let source = FakeSource::default().with("memes", posts);
    let seen = seen_with(&dir, &["p1", "p4", "p7"]);
    let config = config(r#"{"telegram": {"max_posts_per_run": 5}}"#);

    let output = run_pipeline(&config, &seen, &source, &ShutdownSignal::never()).await;

    assert_eq!(output.scraped, 10);
    assert_eq!(ids(&output.posts), vec!["p0", "p2", "p3", "p5", "p6"]);
    assert!(output.posts.iter().all(|p| !seen.contains(&p.id)));
}

#[tokio::test]
async fn test_min_score_is_inclusive() {
    let dir = TempDir::new().unwrap();
    let source = FakeSource::default().with(
        "memes",
        vec![post("a", 50), post("b", 150), post("c", 100), post("d", 99)],
    );
    let config = config(r#"{"reddit": {"min_score": 100}}"#);

    let output =
        run_pipeline(&config, &seen_with(&dir, &[]), &source, &ShutdownSignal::never()).await;

    assert_eq!(ids(&output.posts), vec!["b", "c"]);
}

#[tokio::test]
async fn test_failing_source_does_not_abort_run() {
    let dir = TempDir::new().unwrap();
    let source = FakeSource::default().with("dankmemes", vec![post("x", 500), post("y", 500)]);
    let config = config(r#"{"reddit": {"subreddits": ["memes", "dankmemes"]}}"#);

    let output =
        run_pipeline(&config, &seen_with(&dir, &[]), &source, &ShutdownSignal::never()).await;

    assert_eq!(ids(&output.posts), vec!["x", "y"]);
    assert_eq!(output.scraped, 2);
    assert_eq!(output.scraped_by_source, vec![("dankmemes".to_string(), 2)]);
    assert_eq!(output.failed_sources.len(), 1);
    assert_eq!(output.failed_sources[0].source, "memes");
    assert!(!output.all_sources_failed);
    assert_eq!(source.requested(), vec!["memes", "dankmemes"]);
}

#[tokio::test]
async fn test_all_sources_failing_yields_empty_batch() {
    let dir = TempDir::new().unwrap();
    let config = config(r#"{"reddit": {"subreddits": ["memes", "dankmemes"]}}"#);

    let output = run_pipeline(
        &config,
        &seen_with(&dir, &[]),
        &FakeSource::default(),
        &ShutdownSignal::never(),
    )
    .await;

    assert!(output.posts.is_empty());
    assert_eq!(output.scraped, 0);
    assert!(output.all_sources_failed);
}

#[tokio::test]
async fn test_earlier_sources_fill_the_cap_first() {
    let dir = TempDir::new().unwrap();
    let source = FakeSource::default()
        .with("first", vec![post("a", 500), post("b", 500), post("c", 500)])
        .with("second", vec![post("d", 500), post("e", 500)]);
    let config = config(
        r#"{"reddit": {"subreddits": ["first", "second"]}, "telegram": {"max_posts_per_run": 3}}"#,
    );

    let output =
        run_pipeline(&config, &seen_with(&dir, &[]), &source, &ShutdownSignal::never()).await;

    assert_eq!(ids(&output.posts), vec!["a", "b", "c"]);
    // The starved source was still fetched and counted.
    assert_eq!(output.scraped, 5);
}

#[tokio::test]
async fn test_duplicate_ids_within_a_run_are_dropped() {
    let dir = TempDir::new().unwrap();
    let source = FakeSource::default().with("memes", vec![post("a", 500), post("b", 500)]);
    let config = config(r#"{"reddit": {"subreddits": ["memes", "memes"]}}"#);

    let output =
        run_pipeline(&config, &seen_with(&dir, &[]), &source, &ShutdownSignal::never()).await;

    assert_eq!(ids(&output.posts), vec!["a", "b"]);
    assert_eq!(output.scraped, 4);
}

#[tokio::test]
async fn test_shutdown_stops_fetching() {
    let dir = TempDir::new().unwrap();
    let controller = ShutdownController::new();
    controller.trigger();
    let source = FakeSource::default().with("memes", vec![post("a", 500)]);
    let config = config("{}");

    let output = run_pipeline(&config, &seen_with(&dir, &[]), &source, &controller.signal()).await;

    assert!(output.interrupted);
    assert!(output.posts.is_empty());
    assert!(!output.all_sources_failed);
    assert!(source.requested().is_empty());
}

#[test]
fn test_filters_apply_in_order() {
    let dir = TempDir::new().unwrap();
    let seen = seen_with(&dir, &["seen"]);
    let config = config(r#"{"filters": {"max_title_length": 4}, "reddit": {"min_score": 10}}"#);

    let mut nsfw = post("nsfw", 500);
    nsfw.nsfw = true;
    let mut text_only = post("text", 500);
    text_only.media_url = None;
    let mut long_title = post("long", 500);
    long_title.title = "A very long title".to_string();

    let mut accepted = HashSet::new();
    let survivors = filter_candidates(
        vec![post("seen", 500), nsfw, text_only, long_title, post("low", 5)],
        &seen,
        &mut accepted,
        &config.filters,
        config.reddit.min_score,
    );

    assert_eq!(ids(&survivors), vec!["long"]);
    assert_eq!(survivors[0].title, "A ve");
    assert!(accepted.contains("long"));
}

#[test]
fn test_disabled_filters_keep_nsfw_and_text_posts() {
    let dir = TempDir::new().unwrap();
    let config = config(r#"{"filters": {"image_only": false, "exclude_nsfw": false}}"#);

    let mut nsfw = post("nsfw", 500);
    nsfw.nsfw = true;
    let mut text_only = post("text", 500);
    text_only.media_url = None;

    let survivors = filter_candidates(
        vec![nsfw, text_only],
        &seen_with(&dir, &[]),
        &mut HashSet::new(),
        &config.filters,
        config.reddit.min_score,
    );

    assert_eq!(ids(&survivors), vec!["nsfw", "text"]);
}

#[tokio::test]
async fn test_failed_delivery_does_not_stop_batch() {
    let dir = TempDir::new().unwrap();
    let posts: Vec<CandidatePost> = (1..=5).map(|i| post(&format!("p{}", i), 500)).collect();
    let deliverer = FakeDeliverer::failing(&["p3"]);
    let mut seen = seen_with(&dir, &[]);
    let mut stats = RunStats::new();

    let report = deliver_batch(
        &posts,
        &deliverer,
        &mut seen,
        &mut stats,
        Duration::ZERO,
        &ShutdownSignal::never(),
    )
    .await;

    assert_eq!(deliverer.attempted(), vec!["p1", "p2", "p3", "p4", "p5"]);
    assert_eq!(report.sent, 4);
    assert_eq!(report.failed, 1);
    assert!(report.persisted);
    assert_eq!(stats.sent, 4);
    assert_eq!(stats.failed, 1);
    assert!(stats.last_error.as_deref().unwrap().contains("p3"));

    let reloaded = SeenStore::load(dir.path().join("sent_posts.json")).unwrap();
    assert_eq!(reloaded.iter().collect::<Vec<_>>(), vec!["p1", "p2", "p4", "p5"]);
}

#[tokio::test]
async fn test_shutdown_between_items_leaves_rest_undelivered() {
    let dir = TempDir::new().unwrap();
    let controller = Arc::new(ShutdownController::new());
    let posts: Vec<CandidatePost> = (1..=4).map(|i| post(&format!("p{}", i), 500)).collect();
    let deliverer = FakeDeliverer {
        stop_after: Some((2, controller.clone())),
        ..FakeDeliverer::default()
    };
    let mut seen = seen_with(&dir, &[]);
    let mut stats = RunStats::new();

    let report = deliver_batch(
        &posts,
        &deliverer,
        &mut seen,
        &mut stats,
        Duration::from_secs(30),
        &controller.signal(),
    )
    .await;

    assert_eq!(deliverer.attempted(), vec!["p1", "p2"]);
    assert!(report.interrupted);
    assert_eq!(report.sent, 2);
    assert!(!seen.contains("p3"));
    // What was delivered is still persisted.
    assert!(report.persisted);
}

#[tokio::test]
async fn test_rate_limited_delivery_is_retried() {
    struct FlakyDeliverer {
        calls: Mutex<u32>,
    }

    impl Deliverer for FlakyDeliverer {
        async fn deliver(&self, _post: &CandidatePost) -> Result<DeliveryMethod, CoreError> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if *calls == 1 {
                Err(CoreError::Telegram(TelegramError::RateLimitExceeded {
                    retry_after: 0,
                }))
            } else {
                Ok(DeliveryMethod::Document)
            }
        }
    }

    let dir = TempDir::new().unwrap();
    let deliverer = FlakyDeliverer {
        calls: Mutex::new(0),
    };
    let mut seen = seen_with(&dir, &[]);
    let mut stats = RunStats::new();

    let report = deliver_batch(
        &[post("a", 500)],
        &deliverer,
        &mut seen,
        &mut stats,
        Duration::ZERO,
        &ShutdownSignal::never(),
    )
    .await;

    assert_eq!(report.sent, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(*deliverer.calls.lock().unwrap(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_long_retry_after_is_waited_out_in_full() {
    struct SlowDownDeliverer {
        calls: Mutex<Vec<tokio::time::Instant>>,
    }

    impl Deliverer for SlowDownDeliverer {
        async fn deliver(&self, _post: &CandidatePost) -> Result<DeliveryMethod, CoreError> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(tokio::time::Instant::now());
            if calls.len() == 1 {
                Err(CoreError::Telegram(TelegramError::RateLimitExceeded {
                    retry_after: 120,
                }))
            } else {
                Ok(DeliveryMethod::Photo)
            }
        }
    }

    let dir = TempDir::new().unwrap();
    let deliverer = SlowDownDeliverer {
        calls: Mutex::new(Vec::new()),
    };
    let mut seen = seen_with(&dir, &[]);
    let mut stats = RunStats::new();

    let report = deliver_batch(
        &[post("a", 500)],
        &deliverer,
        &mut seen,
        &mut stats,
        Duration::ZERO,
        &ShutdownSignal::never(),
    )
    .await;

    assert_eq!(report.sent, 1);
    let calls = deliverer.calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert!(calls[1] - calls[0] >= Duration::from_secs(120));
}

#[tokio::test]
async fn test_unwritable_seen_set_is_recorded_not_fatal() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "").unwrap();
    let mut seen = SeenStore::new(blocker.join("sent_posts.json"));
    let mut stats = RunStats::new();

    let report = deliver_batch(
        &[post("a", 500)],
        &FakeDeliverer::default(),
        &mut seen,
        &mut stats,
        Duration::ZERO,
        &ShutdownSignal::never(),
    )
    .await;

    assert_eq!(report.sent, 1);
    assert!(!report.persisted);
    assert!(seen.contains("a"));
    assert!(seen.is_dirty());
    assert_eq!(stats.recent_errors.len(), 1);
}

#[tokio::test]
async fn test_run_once_updates_stats_and_seen_set() {
    let dir = TempDir::new().unwrap();
    let source = FakeSource::default().with("memes", vec![post("a", 500), post("b", 500)]);
    let mut scheduler = Scheduler::new(
        config("{}"),
        source,
        FakeDeliverer::failing(&["b"]),
        seen_with(&dir, &[]),
        MonitoringManager::detached(),
        ShutdownSignal::never(),
    );

    let outcome = scheduler.run_once().await;
    assert_eq!(outcome.scraped, 2);
    assert_eq!(outcome.selected, 2);
    assert_eq!(outcome.delivery.sent, 1);
    assert_eq!(outcome.delivery.failed, 1);

    let stats = scheduler.monitor().stats();
    assert_eq!(stats.scraped, 2);
    assert_eq!(stats.sent, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.runs, 1);
    assert_eq!(stats.status, RunStatus::Error);
    assert!(stats.last_run.is_some());
    assert!(scheduler.seen().contains("a"));

    // The second run only retries what was not delivered.
    let outcome = scheduler.run_once().await;
    assert_eq!(outcome.selected, 1);
    assert_eq!(scheduler.deliverer().attempted(), vec!["a", "b", "b"]);
}

#[tokio::test]
async fn test_run_loop_stops_on_shutdown_and_flushes() {
    let dir = TempDir::new().unwrap();
    let controller = Arc::new(ShutdownController::new());
    let source = FakeSource::default().with("memes", vec![post("a", 500)]);
    let deliverer = FakeDeliverer {
        stop_after: Some((1, controller.clone())),
        ..FakeDeliverer::default()
    };
    let mut scheduler = Scheduler::new(
        config(r#"{"schedule": {"interval_hours": 1, "run_on_startup": true}}"#),
        source,
        deliverer,
        seen_with(&dir, &[]),
        MonitoringManager::detached(),
        controller.signal(),
    );

    tokio::time::timeout(Duration::from_secs(5), scheduler.run())
        .await
        .expect("scheduler should stop once shutdown is triggered");

    assert_eq!(scheduler.monitor().stats().runs, 1);
    assert!(!scheduler.seen().is_dirty());
    assert!(dir.path().join("sent_posts.json").exists());
}

#[tokio::test(start_paused = true)]
async fn test_interval_mode_runs_on_each_tick() {
    let dir = TempDir::new().unwrap();
    let controller = ShutdownController::new();
    let source = FakeSource::default().with("memes", Vec::new());
    let mut scheduler = Scheduler::new(
        config(r#"{"schedule": {"interval_minutes": 10, "run_on_startup": false}}"#),
        source,
        FakeDeliverer::default(),
        seen_with(&dir, &[]),
        MonitoringManager::detached(),
        controller.signal(),
    );

    // Paused clock: time only advances while everything is idle.
    let stopper = async {
        tokio::time::sleep(Duration::from_secs(25 * 60)).await;
        controller.trigger();
    };
    tokio::join!(scheduler.run(), stopper);

    assert_eq!(scheduler.monitor().stats().runs, 2);
    assert_eq!(scheduler.source().requested().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_interval_ticks_during_a_long_run_are_skipped() {
    let dir = TempDir::new().unwrap();
    let controller = ShutdownController::new();
    let source = FakeSource::default()
        .with("memes", Vec::new())
        .slow(Duration::from_secs(25 * 60));
    let mut scheduler = Scheduler::new(
        config(r#"{"schedule": {"interval_minutes": 10, "run_on_startup": false}}"#),
        source,
        FakeDeliverer::default(),
        seen_with(&dir, &[]),
        MonitoringManager::detached(),
        controller.signal(),
    );

    // Runs at 10-35 and 45-70; the ticks at 20 and 30 must not start a run at 35.
    let stopper = async {
        tokio::time::sleep(Duration::from_secs(66 * 60)).await;
        controller.trigger();
    };
    tokio::join!(scheduler.run(), stopper);

    assert_eq!(scheduler.monitor().stats().runs, 2);
    assert_eq!(scheduler.source().requested().len(), 2);
}

#[test]
fn test_next_run_after_picks_following_slot() {
    let times = vec![
        NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
        NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
    ];

    let morning = Utc.with_ymd_and_hms(2024, 6, 1, 7, 30, 0).unwrap();
    assert_eq!(
        next_run_after(&times, &morning),
        Some(Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap())
    );

    // Strictly after: a run finishing exactly on a slot waits for the next.
    let on_slot = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
    assert_eq!(
        next_run_after(&times, &on_slot),
        Some(Utc.with_ymd_and_hms(2024, 6, 1, 18, 0, 0).unwrap())
    );

    let night = Utc.with_ymd_and_hms(2024, 6, 1, 22, 15, 0).unwrap();
    assert_eq!(
        next_run_after(&times, &night),
        Some(Utc.with_ymd_and_hms(2024, 6, 2, 9, 0, 0).unwrap())
    );

    assert_eq!(next_run_after(&[], &night), None);
}

#[test]
fn test_summary_messages() {
    let mut outcome = RunOutcome {
        delivery: DeliveryReport {
            attempted: 3,
            sent: 3,
            ..DeliveryReport::default()
        },
        ..RunOutcome::default()
    };
    assert_eq!(
        summary_message(&outcome),
        Some(("✅ Successfully sent 3 posts".to_string(), NotifyLevel::Info))
    );

    outcome.delivery.sent = 2;
    outcome.delivery.failed = 1;
    assert_eq!(
        summary_message(&outcome),
        Some(("⚠️ Sent 2/3 posts. 1 failed.".to_string(), NotifyLevel::Warning))
    );

    outcome.all_sources_failed = true;
    outcome.failed_sources = vec![SourceFailure {
        source: "memes".to_string(),
        error: "Reddit API error: Server error: 503".to_string(),
    }];
    let (message, level) = summary_message(&outcome).unwrap();
    assert_eq!(level, NotifyLevel::Error);
    assert!(message.starts_with("❌ Fetching failed"));
    assert!(message.contains("503"));

    assert_eq!(summary_message(&RunOutcome::default()), None);
}
