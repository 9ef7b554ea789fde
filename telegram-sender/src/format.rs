//! Message bodies for the Telegram legacy Markdown parse mode.

use memerelay_core::CandidatePost;

pub const MAX_CAPTION_CHARS: usize = 1024;
pub const MAX_MESSAGE_CHARS: usize = 4096;

const ELLIPSIS: &str = "...";

/// Caption attached to a photo or document.
pub fn format_caption(post: &CandidatePost) -> String {
    let caption = format!(
        "*{}*\n\n📍 r/{}\n⬆️ {} upvotes\n👤 u/{}\n\n[View on Reddit]({})",
        escape_markdown(&post.title),
        escape_markdown(&post.source),
        post.score,
        escape_markdown(&post.author),
        post.permalink
    );
    cap_chars(caption, MAX_CAPTION_CHARS)
}

/// Plain message used when no media could be delivered.
pub fn format_text(post: &CandidatePost) -> String {
    let mut message = format!(
        "*{}*\n\nr/{} • {} upvotes\n",
        escape_markdown(&post.title),
        escape_markdown(&post.source),
        post.score
    );
    if let Some(media_url) = post.media_url.as_deref().filter(|url| !url.is_empty()) {
        message.push_str(&format!("[View Image]({})\n", media_url));
    }
    message.push_str(&format!("[Reddit Post]({})", post.permalink));
    cap_chars(message, MAX_MESSAGE_CHARS)
}

/// Escape the characters legacy Markdown treats as entity delimiters.
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn cap_chars(text: String, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text;
    }
    let keep = max_chars - ELLIPSIS.len();
    let mut capped: String = text.chars().take(keep).collect();
    capped.push_str(ELLIPSIS);
    capped
}
