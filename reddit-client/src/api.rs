use crate::auth::{AppOnlyAuth, RedditOAuth2Config};
use crate::media::resolve_media_url;
use crate::rate_limiter::{RateLimitConfig, RateLimiter};
use crate::retry::{RetryConfig, RetryExecutor};
use memerelay_core::{
    CandidatePost, CoreError, FetchRequest, PostSource, RedditApiError, SortMode,
};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const REDDIT_API_BASE: &str = "https://oauth.reddit.com";
const REDDIT_WEB_BASE: &str = "https://reddit.com";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListing<T> {
    pub kind: String,
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingData<T> {
    pub children: Vec<RedditListingChild<T>>,
    pub after: Option<String>,
    pub before: Option<String>,
    pub dist: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingChild<T> {
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditPostData {
    pub id: String,
    pub title: String,
    pub author: String,
    pub subreddit: String,
    pub url: String,
    pub permalink: String,
    pub created_utc: f64,
    pub score: i64,
    pub over_18: bool,
    pub is_self: bool,
    pub post_hint: Option<String>,
    pub preview: Option<RedditPreview>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditPreview {
    pub images: Vec<PreviewImage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewImage {
    pub source: Option<PreviewRendition>,
    pub resolutions: Vec<PreviewRendition>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewRendition {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug)]
pub struct RedditApiClient {
    http_client: Client,
    auth: AppOnlyAuth,
    rate_limiter: RateLimiter,
    retry: RetryExecutor,
    api_base: String,
    user_agent: String,
}

impl RedditApiClient {
    pub fn new(config: RedditOAuth2Config) -> Result<Self, CoreError> {
        Self::with_options(
            config,
            REDDIT_API_BASE,
            RateLimitConfig::reddit_oauth(),
            RetryConfig::reddit(),
        )
    }

    pub fn with_options(
        config: RedditOAuth2Config,
        api_base: &str,
        rate_config: RateLimitConfig,
        retry_config: RetryConfig,
    ) -> Result<Self, CoreError> {
        let http_client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(30))
            .build()?;
        let auth = AppOnlyAuth::new(&config, http_client.clone())?;

        Ok(Self {
            http_client,
            auth,
            rate_limiter: RateLimiter::new(rate_config),
            retry: RetryExecutor::new(retry_config),
            api_base: api_base.trim_end_matches('/').to_string(),
            user_agent: config.user_agent,
        })
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Obtain a token up front so bad credentials fail at startup.
    pub async fn validate_credentials(&self) -> Result<(), CoreError> {
        self.auth.access_token().await.map(|_| ())
    }

    pub async fn make_request(
        &self,
        endpoint: &str,
        query_params: &[(&str, &str)],
    ) -> Result<Response, CoreError> {
        let url = format!("{}{}", self.api_base, endpoint);
        let access_token = self.auth.access_token().await?;

        let waited = self.rate_limiter.acquire_permit().await;
        if !waited.is_zero() {
            debug!("Waited {:?} for rate limit before {}", waited, endpoint);
        }

        info!("Making Reddit API request: GET {}", endpoint);
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(access_token)
            .query(query_params)
            .send()
            .await
            .map_err(|e| {
                error!("Network error for GET {}: {}", endpoint, e);
                if e.is_timeout() {
                    CoreError::RedditApi(RedditApiError::RequestTimeout)
                } else {
                    CoreError::Network(e)
                }
            })?;

        let status = response.status();
        if status.is_success() {
            debug!("Request successful: {} {}", status, endpoint);
            return Ok(response);
        }

        error!("Request failed with status: {} for {}", status, endpoint);
        Err(match status {
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| value.trim().parse::<u64>().ok())
                    .unwrap_or(60);
                warn!("Rate limited, retry after {} seconds", retry_after);
                RedditApiError::RateLimitExceeded { retry_after }.into()
            }
            StatusCode::UNAUTHORIZED => {
                self.auth.invalidate().await;
                RedditApiError::InvalidToken.into()
            }
            StatusCode::FORBIDDEN => RedditApiError::Forbidden {
                resource: endpoint.to_string(),
            }
            .into(),
            StatusCode::NOT_FOUND => RedditApiError::NotFound {
                resource: endpoint.to_string(),
            }
            .into(),
            status if status.is_server_error() => RedditApiError::ServerError {
                status_code: status.as_u16(),
            }
            .into(),
            status => RedditApiError::InvalidResponse {
                details: format!("unexpected status {} for {}", status, endpoint),
            }
            .into(),
        })
    }

    pub async fn get_subreddit_posts(
        &self,
        request: FetchRequest<'_>,
    ) -> Result<RedditListing<RedditPostData>, CoreError> {
        let subreddit = request.source;
        let endpoint = format!("/r/{}/{}", subreddit, request.sort.as_str());
        let limit = request.limit.to_string();

        let mut params = vec![("limit", limit.as_str()), ("raw_json", "1")];
        if request.sort == SortMode::Top {
            params.push(("t", request.time_filter.as_str()));
        }

        let response = self
            .make_request(&endpoint, &params)
            .await
            .map_err(|e| match e {
                // Banned and nonexistent subreddits both come back as 404.
                CoreError::RedditApi(RedditApiError::NotFound { .. }) => {
                    CoreError::RedditApi(RedditApiError::SubredditNotFound {
                        subreddit: subreddit.to_string(),
                    })
                }
                other => other,
            })?;

        let listing: RedditListing<RedditPostData> = response.json().await.map_err(|e| {
            error!("Failed to parse subreddit posts: {}", e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("Failed to parse posts for r/{}", subreddit),
            })
        })?;

        info!(
            "Retrieved {} posts from r/{}",
            listing.data.children.len(),
            subreddit
        );
        Ok(listing)
    }
}

impl PostSource for RedditApiClient {
    async fn fetch(&self, request: FetchRequest<'_>) -> Result<Vec<CandidatePost>, CoreError> {
        let operation_name = format!("fetch r/{}", request.source);
        let listing = self
            .retry
            .execute(&operation_name, move || self.get_subreddit_posts(request))
            .await?;

        Ok(listing_into_candidates(listing, request.source))
    }
}

/// Convert a listing into candidates. Only link posts (`t3`) are kept.
pub fn listing_into_candidates(
    listing: RedditListing<RedditPostData>,
    source: &str,
) -> Vec<CandidatePost> {
    listing
        .data
        .children
        .into_iter()
        .filter(|child| child.kind == "t3")
        .map(|child| candidate_from_post(child.data, source))
        .collect()
}

pub fn candidate_from_post(post: RedditPostData, source: &str) -> CandidatePost {
    let media_url = resolve_media_url(&post);
    let author = match post.author.as_str() {
        "" | "[deleted]" => "Unknown".to_string(),
        _ => post.author,
    };
    let permalink = if post.permalink.starts_with("http") {
        post.permalink
    } else {
        format!("{}{}", REDDIT_WEB_BASE, post.permalink)
    };

    CandidatePost {
        id: post.id,
        title: post.title,
        source: source.to_string(),
        score: post.score,
        author,
        url: post.url,
        media_url,
        permalink,
        nsfw: post.over_18,
        created_utc: post.created_utc as i64,
    }
}
