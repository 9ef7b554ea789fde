use crate::api::RedditPostData;

const IMAGE_EXTENSIONS: [&str; 5] = [".jpg", ".jpeg", ".png", ".gif", ".webp"];
const REDDIT_IMAGE_HOST: &str = "https://i.redd.it/";

/// True when the URL path ends in a known image extension.
pub fn is_image_url(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Find a direct image URL for a post.
///
/// Order: the link itself if it points at an image, then the largest preview
/// rendition, then any `i.redd.it` link, then a link Reddit hinted as an image.
pub fn resolve_media_url(post: &RedditPostData) -> Option<String> {
    if is_image_url(&post.url) {
        return Some(post.url.clone());
    }

    if let Some(image) = post.preview.as_ref().and_then(|p| p.images.first()) {
        let best = image
            .resolutions
            .last()
            .or(image.source.as_ref())
            .map(|rendition| unescape_html(&rendition.url));
        if best.is_some() {
            return best;
        }
    }

    if post.url.starts_with(REDDIT_IMAGE_HOST) {
        return Some(post.url.clone());
    }

    if !post.is_self && post.post_hint.as_deref() == Some("image") && !post.url.is_empty() {
        return Some(post.url.clone());
    }

    None
}

fn unescape_html(url: &str) -> String {
    url.replace("&amp;", "&")
}
