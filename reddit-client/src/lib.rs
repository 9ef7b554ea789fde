//! Reddit listing client used as the relay's post source.
//!
//! Authenticates with the application-only OAuth2 grant, throttles requests
//! with a token bucket and retries transient failures before handing
//! normalized [`CandidatePost`](memerelay_core::CandidatePost)s to the pipeline.

pub mod api;
pub mod auth;
pub mod media;
pub mod rate_limiter;
pub mod retry;

#[cfg(test)]
mod tests;

pub use api::{
    candidate_from_post, listing_into_candidates, RedditApiClient, RedditListing, RedditPostData,
};
pub use auth::{AppOnlyAuth, RedditOAuth2Config, RedditToken};
pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use retry::{RetryConfig, RetryExecutor};
