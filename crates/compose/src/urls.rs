use {once_cell::sync::Lazy, regex::Regex};

use babelink_common::types::Attachment;

use crate::chunk::MAX_MSG_LEN;

/// Zero-width and BOM characters some clients sprinkle into content.
const ZERO_WIDTH: [char; 5] = ['\u{200b}', '\u{200c}', '\u{200d}', '\u{2060}', '\u{feff}'];

/// URLs never contain whitespace or the invisible characters above.
#[allow(clippy::unwrap_used)]
pub(crate) static URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"https?://[^\s\x{200B}\x{200C}\x{200D}\x{2060}\x{FEFF}]+").unwrap()
});

#[allow(clippy::unwrap_used)]
static FILENAME_ONLY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w\-\s\.\(\)\[\]]+\.[A-Za-z0-9]{2,4}$").unwrap());

const MEDIA_EXTS: [&str; 10] = [
    ".png", ".jpg", ".jpeg", ".gif", ".webp", ".mp4", ".mov", ".webm", ".mkv", ".m4v",
];
const IMG_EXTS: [&str; 5] = [".png", ".jpg", ".jpeg", ".gif", ".webp"];
const VID_EXTS: [&str; 5] = [".mp4", ".mov", ".webm", ".mkv", ".m4v"];

/// Remove zero-width/invisible characters.
#[must_use]
pub fn strip_invisible(text: &str) -> String {
    text.chars().filter(|c| !ZERO_WIDTH.contains(c)).collect()
}

/// Strip invisible characters, then remove every URL from the text.
/// Returns the stripped text and the URLs in their original order. URL
/// contents are never modified here.
#[must_use]
pub fn extract_urls(text: &str) -> (String, Vec<String>) {
    if text.is_empty() {
        return (String::new(), Vec::new());
    }
    let clean = strip_invisible(text);
    let urls: Vec<String> = URL_RE.find_iter(&clean).map(|m| m.as_str().to_string()).collect();
    let stripped = URL_RE.replace_all(&clean, "").trim().to_string();
    (stripped, urls)
}

/// Truncate overlong text to the platform limit with an ellipsis suffix.
#[must_use]
pub fn clamp_text(text: &str) -> String {
    if text.chars().count() > MAX_MSG_LEN {
        let cut: String = text.chars().take(MAX_MSG_LEN).collect();
        format!("{cut} (…)")
    } else {
        text.to_string()
    }
}

/// Truncate text to at most `limit` characters, ellipsis suffix included.
/// Use this when the result must share a single message with other content.
#[must_use]
pub fn clamp_text_to(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    if limit < 4 {
        return String::new();
    }
    let cut: String = text.chars().take(limit - 4).collect();
    format!("{cut} (…)")
}

/// Host of a URL, lowercased, without a `www.` prefix.
#[must_use]
pub fn url_host(raw: &str) -> String {
    let clean = strip_invisible(raw);
    let host = url::Url::parse(&clean)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .unwrap_or_default();
    host.strip_prefix("www.").map_or(host.clone(), str::to_string)
}

fn is_image(att: &Attachment) -> bool {
    if att.content_type.as_deref().is_some_and(|c| c.starts_with("image/")) {
        return true;
    }
    let name = att.filename.to_lowercase();
    IMG_EXTS.iter().any(|ext| name.ends_with(ext))
}

fn is_video(att: &Attachment) -> bool {
    if att.content_type.as_deref().is_some_and(|c| c.starts_with("video/")) {
        return true;
    }
    let name = att.filename.to_lowercase();
    VID_EXTS.iter().any(|ext| name.ends_with(ext))
}

/// Split attachments into media URLs (eligible for large inline preview) and
/// everything else. Spoilered attachments go to the "other" list wrapped in
/// `||` so the spoiler survives the relay.
#[must_use]
pub fn split_attachment_urls(atts: &[Attachment]) -> (Vec<String>, Vec<String>) {
    let mut media = Vec::new();
    let mut other = Vec::new();
    for att in atts {
        if att.spoiler {
            other.push(format!("||{}||", att.url));
        } else if is_image(att) || is_video(att) {
            media.push(att.url.clone());
        } else {
            other.push(att.url.clone());
        }
    }
    (media, other)
}

/// Drop text that is nothing but the names of the attached files — clients
/// add those automatically and they are noise once the files are relayed as
/// URLs.
#[must_use]
pub fn strip_filename_only_text(text: &str, atts: &[Attachment]) -> String {
    if text.is_empty() || atts.is_empty() {
        return text.to_string();
    }
    let trimmed = text.trim();
    if atts.iter().any(|a| a.filename == trimmed) {
        return String::new();
    }
    let looks_like_filename = |line: &str| {
        FILENAME_ONLY_RE.is_match(line)
            && MEDIA_EXTS.iter().any(|ext| line.to_lowercase().ends_with(ext))
    };
    let lines: Vec<&str> = trimmed.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if !lines.is_empty() && lines.iter().all(|l| looks_like_filename(l)) {
        return String::new();
    }
    text.to_string()
}
