use {once_cell::sync::Lazy, regex::Regex};

/// Hard per-message character limit of the platform.
pub const MAX_MSG_LEN: usize = 2000;

/// Invisible marker appended to relayed output so our own deliveries are
/// recognizable and never re-relayed.
pub const RELAY_MARKER: &str = "\u{200b}";

#[allow(clippy::unwrap_used)]
static URL_ONLY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*https?://[^\s\x{200B}\x{200C}\x{200D}\x{2060}\x{FEFF}]+\s*$").unwrap()
});

/// True when a block is nothing but a single URL (plus whitespace). Those
/// blocks must stay pristine so the platform renders its native preview.
#[must_use]
pub fn is_pure_url_block(block: &str) -> bool {
    URL_ONLY_RE.is_match(block)
}

/// Greedily pack lines into chunks of at most [`MAX_MSG_LEN`] characters,
/// preserving line breaks and never splitting a URL across chunks. A single
/// line longer than the limit is emitted as exactly one truncated chunk.
#[must_use]
pub fn split_by_limit(lines: &[String]) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for line in lines {
        let add = if current.is_empty() {
            line.clone()
        } else {
            format!("\n{line}")
        };
        if current.chars().count() + add.chars().count() <= MAX_MSG_LEN {
            current.push_str(&add);
        } else {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            current = if line.chars().count() > MAX_MSG_LEN {
                line.chars().take(MAX_MSG_LEN).collect()
            } else {
                line.clone()
            };
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Build the ordered block list for one relayed message: translated text
/// first, then media attachment URLs, then a labelled list of the remaining
/// attachments. Every block fits the platform limit.
#[must_use]
pub fn compose_blocks(base_text: &str, media_urls: &[String], other_urls: &[String]) -> Vec<String> {
    let mut blocks = Vec::new();
    if !base_text.is_empty() {
        blocks.push(base_text.to_string());
    }
    if !media_urls.is_empty() {
        blocks.extend(split_by_limit(media_urls));
    }
    if !other_urls.is_empty() {
        let mut lines = vec!["**Attachments:**".to_string()];
        lines.extend(other_urls.iter().map(|u| format!("• {u}")));
        blocks.extend(split_by_limit(&lines));
    }
    blocks
}

/// Append the anti-echo marker to the last block that is not purely a URL.
/// If every block is a bare URL, no marker is applied — a marker would break
/// the platform's native link preview. Returns whether a marker was placed.
pub fn apply_relay_marker(blocks: &mut Vec<String>) -> bool {
    for i in (0..blocks.len()).rev() {
        if !is_pure_url_block(&blocks[i]) {
            if blocks[i].chars().count() + RELAY_MARKER.chars().count() <= MAX_MSG_LEN {
                blocks[i].push_str(RELAY_MARKER);
            } else {
                blocks.push(RELAY_MARKER.to_string());
            }
            return true;
        }
    }
    false
}
