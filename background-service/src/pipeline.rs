//! Fetch and filter stage of a run.

use crate::shutdown::ShutdownSignal;
use memerelay_core::config::{Config, FilterSettings};
use memerelay_core::{CandidatePost, ErrorExt, FetchRequest, PostSource};
use seen_store::SeenStore;
use std::collections::HashSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    pub source: String,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct PipelineOutput {
    /// Survivors in source order, capped at the per-run maximum.
    pub posts: Vec<CandidatePost>,
    /// Candidates examined from sources that answered.
    pub scraped: u64,
    pub scraped_by_source: Vec<(String, u64)>,
    pub failed_sources: Vec<SourceFailure>,
    pub all_sources_failed: bool,
    /// Shutdown was requested before every source was fetched.
    pub interrupted: bool,
}

/// Apply the per-candidate filters in their fixed order: already delivered,
/// already accepted this run, NSFW, media, title length, score.
pub fn filter_candidates(
    candidates: Vec<CandidatePost>,
    seen: &SeenStore,
    accepted: &mut HashSet<String>,
    filters: &FilterSettings,
    min_score: i64,
) -> Vec<CandidatePost> {
    let mut survivors = Vec::new();

    for mut post in candidates {
        if seen.contains(&post.id) {
            debug!("Skipping {}: already sent", post.id);
            continue;
        }
        if accepted.contains(&post.id) {
            debug!("Skipping {}: duplicate within this run", post.id);
            continue;
        }
        if filters.exclude_nsfw && post.nsfw {
            debug!("Skipping {}: NSFW", post.id);
            continue;
        }
        if filters.image_only && !post.has_media() {
            debug!("Skipping {}: no image", post.id);
            continue;
        }

        post.truncate_title(filters.max_title_length);

        if post.score < min_score {
            debug!("Skipping {}: score {} below {}", post.id, post.score, min_score);
            continue;
        }

        accepted.insert(post.id.clone());
        survivors.push(post);
    }

    survivors
}

/// Fetch every configured source in order and return the filtered batch.
///
/// A failing source counts as zero candidates; the run carries on with the
/// rest. The seen-set is only read here.
pub async fn run_pipeline<S: PostSource>(
    config: &Config,
    seen: &SeenStore,
    source: &S,
    shutdown: &ShutdownSignal,
) -> PipelineOutput {
    let reddit = &config.reddit;
    let mut output = PipelineOutput::default();
    let mut accepted = HashSet::new();
    let mut attempted = 0usize;

    for subreddit in &reddit.subreddits {
        if shutdown.is_triggered() {
            info!("Shutdown requested, not fetching remaining sources");
            output.interrupted = true;
            break;
        }
        attempted += 1;

        let request = FetchRequest {
            source: subreddit.as_str(),
            sort: reddit.sort_by,
            time_filter: reddit.top_time_filter,
            limit: reddit.limit,
        };

        let candidates = match source.fetch(request).await {
            Ok(candidates) => candidates,
            Err(e) => {
                e.log_error();
                warn!("Fetching r/{} failed, continuing with other sources", subreddit);
                output.failed_sources.push(SourceFailure {
                    source: subreddit.clone(),
                    error: e.to_string(),
                });
                continue;
            }
        };

        let examined = candidates.len() as u64;
        output.scraped += examined;
        output.scraped_by_source.push((subreddit.clone(), examined));

        let survivors = filter_candidates(
            candidates,
            seen,
            &mut accepted,
            &config.filters,
            reddit.min_score,
        );
        info!(
            "r/{}: {} of {} candidates passed filters",
            subreddit,
            survivors.len(),
            examined
        );
        output.posts.extend(survivors);
    }

    output.all_sources_failed = attempted > 0 && output.failed_sources.len() == attempted;

    let cap = config.delivery.max_posts_per_run;
    if output.posts.len() > cap {
        info!(
            "Capping batch at {} of {} candidates",
            cap,
            output.posts.len()
        );
        output.posts.truncate(cap);
    }

    output
}
