use crate::api::{self, RedditListing, RedditPostData};
use crate::{RateLimitConfig, RedditApiClient, RedditOAuth2Config, RedditToken, RetryConfig};
use memerelay_core::{CoreError, RedditApiError};
use std::time::{Duration, SystemTime};

fn create_test_config() -> RedditOAuth2Config {
    RedditOAuth2Config::new(
        "test_client_id".to_string(),
        "test_client_secret".to_string(),
        "memerelay/1.0 by test_user".to_string(),
    )
}

const LISTING_JSON: &str = r#"{
    "kind": "Listing",
    "data": {
        "after": "t3_ccc",
        "before": null,
        "dist": 4,
        "children": [
            {
                "kind": "t3",
                "data": {
                    "id": "aaa",
                    "title": "Rules of the subreddit",
                    "author": "AutoModerator",
                    "subreddit": "memes",
                    "url": "https://www.reddit.com/r/memes/comments/aaa/rules/",
                    "permalink": "/r/memes/comments/aaa/rules/",
                    "created_utc": 1700000000.0,
                    "score": 50000,
                    "over_18": false,
                    "is_self": true,
                    "stickied": true
                }
            },
            {
                "kind": "t3",
                "data": {
                    "id": "bbb",
                    "title": "When the build passes first try",
                    "author": "[deleted]",
                    "subreddit": "memes",
                    "url": "https://i.redd.it/bbb.jpg",
                    "permalink": "/r/memes/comments/bbb/when_the_build_passes/",
                    "created_utc": 1700000123.5,
                    "score": 4321,
                    "over_18": false,
                    "is_self": false,
                    "stickied": false,
                    "post_hint": "image"
                }
            },
            {
                "kind": "t3",
                "data": {
                    "id": "ccc",
                    "title": "Spicy one",
                    "author": "someone",
                    "subreddit": "memes",
                    "url": "https://imgur.com/gallery/ccc",
                    "permalink": "/r/memes/comments/ccc/spicy/",
                    "created_utc": 1700000200,
                    "score": 12,
                    "over_18": true,
                    "is_self": false,
                    "stickied": false,
                    "preview": {
                        "images": [
                            {
                                "source": {"url": "https://preview.redd.it/ccc.png?s=1&amp;w=1080", "width": 1080, "height": 1080},
                                "resolutions": []
                            }
                        ]
                    }
                }
            },
            {
                "kind": "t1",
                "data": {"id": "comment"}
            }
        ]
    }
}"#;

fn parse_listing() -> RedditListing<RedditPostData> {
    serde_json::from_str(LISTING_JSON).expect("listing fixture should parse")
}

#[test]
fn test_config_creation() {
    let config = create_test_config();
    assert_eq!(config.client_id, "test_client_id");
    assert_eq!(config.client_secret, "test_client_secret");
    assert_eq!(config.user_agent, "memerelay/1.0 by test_user");
    assert_eq!(config.token_url, "https://www.reddit.com/api/v1/access_token");

    let config = config.with_token_url("http://127.0.0.1:9/token");
    assert_eq!(config.token_url, "http://127.0.0.1:9/token");
}

#[test]
fn test_client_creation() {
    let client = RedditApiClient::new(create_test_config());
    assert!(client.is_ok());
    assert_eq!(client.unwrap().user_agent(), "memerelay/1.0 by test_user");
}

#[test]
fn test_client_rejects_bad_token_url() {
    let config = create_test_config().with_token_url("not a url");
    let result = RedditApiClient::new(config);
    assert!(matches!(
        result,
        Err(CoreError::RedditApi(RedditApiError::AuthenticationFailed { .. }))
    ));
}

#[test]
fn test_token_expiry() {
    let fresh = RedditToken {
        access_token: "abc".to_string(),
        expires_at: SystemTime::now() + Duration::from_secs(3600),
    };
    assert!(!fresh.is_expired());

    // Inside the refresh margin counts as expired.
    let nearly = RedditToken {
        access_token: "abc".to_string(),
        expires_at: SystemTime::now() + Duration::from_secs(30),
    };
    assert!(nearly.is_expired());
}

#[test]
fn test_listing_keeps_every_link_post() {
    let candidates = api::listing_into_candidates(parse_listing(), "memes");
    let ids: Vec<&str> = candidates.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["aaa", "bbb", "ccc"]);
}

#[test]
fn test_pinned_image_post_is_a_candidate() {
    let listing: RedditListing<RedditPostData> = serde_json::from_str(
        r#"{
            "kind": "Listing",
            "data": {
                "after": null,
                "before": null,
                "children": [
                    {
                        "kind": "t3",
                        "data": {
                            "id": "pin",
                            "title": "Meme of the month",
                            "author": "mod_team",
                            "url": "https://i.redd.it/pin.jpg",
                            "permalink": "/r/memes/comments/pin/meme_of_the_month/",
                            "score": 90000,
                            "stickied": true
                        }
                    }
                ]
            }
        }"#,
    )
    .unwrap();

    let candidates = api::listing_into_candidates(listing, "memes");
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].score, 90000);
    assert_eq!(
        candidates[0].media_url.as_deref(),
        Some("https://i.redd.it/pin.jpg")
    );
}

#[test]
fn test_candidate_normalization() {
    let candidates = api::listing_into_candidates(parse_listing(), "memes");

    let rules = &candidates[0];
    assert_eq!(rules.media_url, None);

    let image = &candidates[1];
    assert_eq!(image.author, "Unknown");
    assert_eq!(
        image.permalink,
        "https://reddit.com/r/memes/comments/bbb/when_the_build_passes/"
    );
    assert_eq!(image.media_url.as_deref(), Some("https://i.redd.it/bbb.jpg"));
    assert_eq!(image.score, 4321);
    assert_eq!(image.created_utc, 1700000123);
    assert_eq!(image.source, "memes");
    assert!(!image.nsfw);

    let spicy = &candidates[2];
    assert!(spicy.nsfw);
    assert_eq!(spicy.author, "someone");
    assert_eq!(
        spicy.media_url.as_deref(),
        Some("https://preview.redd.it/ccc.png?s=1&w=1080")
    );
}

#[test]
fn test_candidate_keeps_absolute_permalink() {
    let post = RedditPostData {
        id: "ddd".to_string(),
        author: "poster".to_string(),
        permalink: "https://reddit.com/r/memes/comments/ddd/".to_string(),
        url: "https://example.com/article".to_string(),
        is_self: true,
        ..RedditPostData::default()
    };

    let candidate = api::candidate_from_post(post, "dankmemes");
    assert_eq!(candidate.permalink, "https://reddit.com/r/memes/comments/ddd/");
    assert_eq!(candidate.source, "dankmemes");
    assert!(candidate.media_url.is_none());
    assert!(!candidate.has_media());
}

#[tokio::test]
async fn test_unreachable_token_endpoint_is_auth_failure() {
    let config = create_test_config().with_token_url("http://127.0.0.1:9/api/v1/access_token");
    let client = RedditApiClient::with_options(
        config,
        "http://127.0.0.1:9/",
        RateLimitConfig::unlimited(),
        RetryConfig::no_retry(),
    )
    .unwrap();

    let result = client.validate_credentials().await;
    assert!(matches!(
        result,
        Err(CoreError::RedditApi(RedditApiError::AuthenticationFailed { .. }))
    ));
}

#[test]
fn test_cached_token_is_reused() {
    let config = create_test_config().with_token_url("http://127.0.0.1:9/api/v1/access_token");
    let auth = crate::AppOnlyAuth::new(&config, reqwest::Client::new()).unwrap();

    tokio_test::block_on(auth.set_token(RedditToken {
        access_token: "cached-token".to_string(),
        expires_at: SystemTime::now() + Duration::from_secs(3600),
    }));

    // No network round trip while the cached token is fresh.
    let token = tokio_test::block_on(auth.access_token()).unwrap();
    assert_eq!(token, "cached-token");

    tokio_test::block_on(auth.invalidate());
    assert!(tokio_test::block_on(auth.access_token()).is_err());
}
