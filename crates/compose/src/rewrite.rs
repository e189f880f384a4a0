use {once_cell::sync::Lazy, regex::Regex};

use crate::urls::{URL_RE, strip_invisible};

#[allow(clippy::unwrap_used)]
static WP_PROXY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^https?://i\d+\.wp\.com/([^?\s]+)").unwrap());

#[allow(clippy::unwrap_used)]
static IMGUR_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^/([A-Za-z0-9]{5,8})(?:\..+)?$").unwrap());

#[allow(clippy::unwrap_used)]
static IMGUR_ALBUM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^/(?:gallery|a)/([^/?#]+)").unwrap());

#[allow(clippy::unwrap_used)]
static IMGUR_MEDIA_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9]{5,8}$").unwrap());

const IMGUR_HOSTS: [&str; 4] = ["imgur.com", "www.imgur.com", "m.imgur.com", "i.imgur.com"];

/// Unwrap a `i<n>.wp.com/...` CDN proxy URL back to its origin.
fn unproxy_cdn(url: &str) -> String {
    let Some(caps) = WP_PROXY_RE.captures(url) else {
        return url.to_string();
    };
    let target = &caps[1];
    if target.starts_with("http://") || target.starts_with("https://") {
        target.to_string()
    } else {
        format!("https://{target}")
    }
}

/// Convert an imgur page link to a direct CDN asset when the media id is
/// recoverable from the path or the gallery anchor. Already-direct links and
/// anything unrecognized pass through unchanged.
fn imgur_to_direct(url: &str) -> String {
    let Ok(parsed) = url::Url::parse(url) else {
        return url.to_string();
    };
    let host = parsed.host_str().unwrap_or_default().to_lowercase();
    if host == "i.imgur.com" || !IMGUR_HOSTS.contains(&host.as_str()) {
        return url.to_string();
    }
    let path = parsed.path();

    // /gallery/<slug>#<id> or /a/<album>#<id> — the anchor is the media id.
    if IMGUR_ALBUM_RE.is_match(path) {
        if let Some(frag) = parsed.fragment() {
            let media_id = frag.split('/').next().unwrap_or_default();
            if IMGUR_MEDIA_ID_RE.is_match(media_id) {
                return format!("https://i.imgur.com/{media_id}.mp4");
            }
        }
        return url.to_string();
    }

    // /<id> — a single post.
    if let Some(caps) = IMGUR_ID_RE.captures(path) {
        return format!("https://i.imgur.com/{}.mp4", &caps[1]);
    }

    url.to_string()
}

/// Normalize one URL: strip invisibles, unproxy, then imgur-direct.
#[must_use]
pub fn rewrite_url(url: &str) -> String {
    let clean = strip_invisible(url);
    imgur_to_direct(&unproxy_cdn(&clean))
}

/// Rewrite every URL occurring in free text, leaving the rest untouched.
#[must_use]
pub fn rewrite_urls_in_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let clean = strip_invisible(text);
    URL_RE
        .replace_all(&clean, |caps: &regex::Captures<'_>| rewrite_url(&caps[0]))
        .into_owned()
}

/// Rewrite a list of URLs, preserving `||spoiler||` wrappers.
#[must_use]
pub fn rewrite_links(urls: &[String]) -> Vec<String> {
    urls.iter()
        .map(|raw| {
            let clean = strip_invisible(raw);
            if let Some(core) = clean.strip_prefix("||").and_then(|s| s.strip_suffix("||")) {
                format!("||{}||", rewrite_url(core))
            } else {
                rewrite_url(&clean)
            }
        })
        .collect()
}
