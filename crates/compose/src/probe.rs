use {reqwest::StatusCode, tracing::debug};

use crate::urls::{strip_invisible, url_host};

/// Check that a candidate URL exists and serves image/video content.
/// Tries HEAD first; some CDNs reject HEAD, so 403/405 falls back to a
/// one-byte ranged GET.
pub async fn probe_direct_url(client: &reqwest::Client, url: &str) -> bool {
    let head = match client.head(url).send().await {
        Ok(resp) => resp,
        Err(e) => {
            debug!(url, error = %e, "probe HEAD failed");
            return false;
        },
    };
    match head.status() {
        StatusCode::OK => is_media_content(head.headers()),
        StatusCode::FORBIDDEN | StatusCode::METHOD_NOT_ALLOWED => {
            match client.get(url).header("Range", "bytes=0-0").send().await {
                Ok(resp)
                    if resp.status() == StatusCode::OK
                        || resp.status() == StatusCode::PARTIAL_CONTENT =>
                {
                    is_media_content(resp.headers())
                },
                _ => false,
            }
        },
        _ => false,
    }
}

fn is_media_content(headers: &reqwest::header::HeaderMap) -> bool {
    headers
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_lowercase)
        .is_some_and(|ct| ct.starts_with("image/") || ct.starts_with("video/"))
}

/// Media id from a gallery/album share link anchor
/// (`https://imgur.com/gallery/<slug>#<id>`).
fn gallery_anchor_id(url: &str) -> Option<String> {
    let parsed = url::Url::parse(&strip_invisible(url)).ok()?;
    let frag = parsed.fragment()?;
    if !frag.is_empty() && frag.chars().all(char::is_alphanumeric) {
        Some(frag.to_string())
    } else {
        None
    }
}

/// Resolve a gallery-host share link to a direct asset URL, confirming each
/// candidate with a probe. Image extensions are tried before video so still
/// images don't end up as broken mp4 links. `None` when the link has no
/// recoverable media id or nothing probes as media — callers keep the
/// original URL in that case.
pub async fn resolve_gallery_direct(
    client: &reqwest::Client,
    url: &str,
    base: Option<&str>,
) -> Option<String> {
    if !url_host(url).ends_with("imgur.com") {
        return None;
    }
    let media_id = gallery_anchor_id(url)?;
    let base = base.unwrap_or("https://i.imgur.com");
    for ext in ["gif", "jpg", "png", "jpeg", "mp4"] {
        let candidate = format!("{base}/{media_id}.{ext}");
        if probe_direct_url(client, &candidate).await {
            return Some(candidate);
        }
    }
    None
}
