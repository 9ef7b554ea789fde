use serde::{Deserialize, Serialize};
use std::fmt;

/// Listing order requested from Reddit. The relay never re-sorts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    #[default]
    Hot,
    New,
    Top,
}

impl SortMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortMode::Hot => "hot",
            SortMode::New => "new",
            SortMode::Top => "top",
        }
    }

    /// Lenient parse used for the config document; unknown values become `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "hot" => Some(SortMode::Hot),
            "new" => Some(SortMode::New),
            "top" => Some(SortMode::Top),
            _ => None,
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time window for `top` listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopTimeFilter {
    Hour,
    #[default]
    Day,
    Week,
    Month,
    Year,
    All,
}

impl TopTimeFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopTimeFilter::Hour => "hour",
            TopTimeFilter::Day => "day",
            TopTimeFilter::Week => "week",
            TopTimeFilter::Month => "month",
            TopTimeFilter::Year => "year",
            TopTimeFilter::All => "all",
        }
    }
}

/// A post fetched from a source and under consideration for delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidatePost {
    pub id: String,
    pub title: String,
    pub source: String,
    pub score: i64,
    pub author: String,
    pub url: String,
    /// Direct image URL, absent for posts without a resolvable image.
    pub media_url: Option<String>,
    /// Absolute link to the Reddit comments page.
    pub permalink: String,
    pub nsfw: bool,
    pub created_utc: i64,
}

impl CandidatePost {
    pub fn has_media(&self) -> bool {
        self.media_url.as_deref().is_some_and(|url| !url.is_empty())
    }

    /// Truncate the title to at most `max_chars` characters.
    pub fn truncate_title(&mut self, max_chars: usize) {
        if let Some((byte_index, _)) = self.title.char_indices().nth(max_chars) {
            self.title.truncate(byte_index);
        }
    }
}

/// How a post ended up in the chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMethod {
    Photo,
    Document,
    Text,
}

impl fmt::Display for DeliveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryMethod::Photo => f.write_str("photo"),
            DeliveryMethod::Document => f.write_str("document"),
            DeliveryMethod::Text => f.write_str("text"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(title: &str) -> CandidatePost {
        CandidatePost {
            id: "abc".to_string(),
            title: title.to_string(),
            source: "memes".to_string(),
            score: 10,
            author: "someone".to_string(),
            url: "https://i.redd.it/abc.png".to_string(),
            media_url: Some("https://i.redd.it/abc.png".to_string()),
            permalink: "https://reddit.com/r/memes/comments/abc".to_string(),
            nsfw: false,
            created_utc: 0,
        }
    }

    #[test]
    fn test_truncate_title_respects_char_boundaries() {
        let mut candidate = post("héllo wörld");
        candidate.truncate_title(4);
        assert_eq!(candidate.title, "héll");

        let mut short = post("ok");
        short.truncate_title(200);
        assert_eq!(short.title, "ok");
    }

    #[test]
    fn test_sort_mode_parse() {
        assert_eq!(SortMode::parse("TOP"), Some(SortMode::Top));
        assert_eq!(SortMode::parse(" new "), Some(SortMode::New));
        assert_eq!(SortMode::parse("rising"), None);
    }

    #[test]
    fn test_has_media_ignores_empty_url() {
        let mut candidate = post("x");
        assert!(candidate.has_media());
        candidate.media_url = Some(String::new());
        assert!(!candidate.has_media());
        candidate.media_url = None;
        assert!(!candidate.has_media());
    }
}
