//! Content composition: URL extraction and rewriting, media probing,
//! attachment splitting, and chunking to the platform message limit with the
//! anti-echo marker.

mod chunk;
mod probe;
mod rewrite;
mod urls;

pub use {
    chunk::{MAX_MSG_LEN, RELAY_MARKER, apply_relay_marker, compose_blocks, is_pure_url_block, split_by_limit},
    probe::{probe_direct_url, resolve_gallery_direct},
    rewrite::{rewrite_links, rewrite_url, rewrite_urls_in_text},
    urls::{
        clamp_text, clamp_text_to, extract_urls, split_attachment_urls, strip_filename_only_text,
        strip_invisible, url_host,
    },
};
