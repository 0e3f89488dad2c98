use std::sync::LazyLock;

use percent_encoding::percent_decode_str;
use regex::Regex;

/// `https://<account>.blob.core.windows.net/<container>/<rest>`
static BLOB_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"//[^/]+\.blob\.core\.windows\.net/[^/]+/(.+)$").expect("blob url pattern is valid")
});

/// Folder markers that precede the blob path in stored thumbnail references,
/// matched case-insensitively. `images/` is part of the blob path itself and is kept.
static MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)sagathumbnails/|images/|thumbnails/").expect("marker pattern is valid")
});

/// Turn a stored thumbnail reference into a path inside the thumbnail container.
///
/// Accepts full blob URLs (signed or not), container-prefixed paths, or bare
/// paths. Any query string is discarded, so an embedded SAS token is never
/// reused. Returns `None` when nothing usable is left.
pub fn thumbnail_blob_path(raw: &str) -> Option<String> {
    let decoded = percent_decode_str(strip_query(raw).trim()).decode_utf8_lossy();
    // An encoded reference can hide its query until decoded.
    let decoded = strip_query(&decoded);

    let path = if let Some(rest) = BLOB_URL.captures(&decoded).and_then(|c| c.get(1)) {
        rest.as_str().to_string()
    } else if let Some(marker) = MARKER.find(decoded) {
        let start = if marker.as_str().eq_ignore_ascii_case("images/") {
            marker.start()
        } else {
            marker.end()
        };
        decoded[start..].to_string()
    } else {
        decoded.trim_start_matches('/').to_string()
    };

    if path.is_empty() {
        None
    } else {
        Some(path)
    }
}

fn strip_query(s: &str) -> &str {
    s.split_once('?').map_or(s, |(base, _)| base)
}
