use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::core::types::VideoId;

// ---------------------------------------------------------------------------
// Identifier patterns
// ---------------------------------------------------------------------------

/// Leading numeric user id followed by `_`.
static USER_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)_").expect("user id pattern is valid"));

/// Trailing `YYYY_<code>###.<ext>` filename. Codes: cw, bc, cm, gt.
static FILENAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d{4}_(?:cw|bc|cm|gt)\d{3}\.[a-z0-9]+)$").expect("filename pattern is valid")
});

/// Session folder the portal uploads into, and its known mistyped variants.
/// The first entry is the canonical one.
pub const DAY_FOLDER_VARIANTS: [&str; 3] = ["día 1", " día 1", "dia 1"];

/// Folder prefix used by the secondary `día N` sweep.
pub const DAY_FOLDER_PREFIX: &str = "día";

// ---------------------------------------------------------------------------
// CandidateSet
// ---------------------------------------------------------------------------

/// Ordered, de-duplicated blob paths guessed from one identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSet {
    pub user_id: Option<String>,
    /// Filename recovered from the identifier, if any.
    pub filename: Option<String>,
    paths: Vec<String>,
}

impl CandidateSet {
    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Appends while skipping anything already present.
struct OrderedPaths {
    seen: HashSet<String>,
    paths: Vec<String>,
}

impl OrderedPaths {
    fn new() -> Self {
        Self {
            seen: HashSet::new(),
            paths: Vec::new(),
        }
    }

    fn push(&mut self, path: String) {
        if self.seen.insert(path.clone()) {
            self.paths.push(path);
        }
    }
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Derive candidate blob paths for a video identifier, most likely first.
///
/// Order:
/// 1. `user/día 1/file` and its spacing/accent variants
/// 2. `user/día 1/videos/file`, `user/videos/file`, `user/file`
/// 3. the whole identifier under the same user folders
/// 4. the bare filename
/// 5. the raw identifier and `videos/<identifier>`
///
/// The result is never empty.
pub fn generate_candidates(video_id: &VideoId) -> CandidateSet {
    let raw = video_id.as_str();
    let user_id = USER_ID
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    let filename = FILENAME
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .or_else(|| {
            user_id
                .as_deref()
                .and_then(|uid| reconstruct_filename(&raw[uid.len() + 1..]))
        });

    let mut out = OrderedPaths::new();

    if let Some(uid) = user_id.as_deref() {
        if let Some(file) = filename.as_deref() {
            push_folder_variants(&mut out, uid, file);
        }

        out.push(format!("{}/{}", uid, raw));
        out.push(format!("{}/{}/{}", uid, DAY_FOLDER_VARIANTS[0], raw));
        out.push(format!("{}/{}/{}", uid, DAY_FOLDER_VARIANTS[1], raw));
        out.push(format!("{}/videos/{}", uid, raw));
        out.push(format!("{}/{}/videos/{}", uid, DAY_FOLDER_VARIANTS[0], raw));
    } else {
        warn!(
            video_id = %raw,
            "no user id prefix in video id, only generic fallbacks will be tried"
        );
    }

    if let Some(file) = filename.as_deref() {
        out.push(file.to_string());
    }

    out.push(raw.to_string());
    out.push(format!("videos/{}", raw));

    debug!(
        video_id = %raw,
        user_id = ?user_id,
        filename = ?filename,
        candidates = out.paths.len(),
        "generated path candidates"
    );

    CandidateSet {
        user_id,
        filename,
        paths: out.paths,
    }
}

fn push_folder_variants(out: &mut OrderedPaths, user_id: &str, file: &str) {
    for folder in DAY_FOLDER_VARIANTS {
        out.push(format!("{}/{}/{}", user_id, folder, file));
    }
    out.push(format!("{}/{}/videos/{}", user_id, DAY_FOLDER_VARIANTS[0], file));
    out.push(format!("{}/videos/{}", user_id, file));
    out.push(format!("{}/{}", user_id, file));
}

/// Rebuild a `YYYY_...` filename from the part after the user id.
///
/// Takes the last exactly-four-digit segment that is followed by at least one
/// more segment, provided the final segment carries an extension.
fn reconstruct_filename(rest: &str) -> Option<String> {
    let segments: Vec<&str> = rest.split('_').collect();
    let last = segments.last()?;
    if !last.contains('.') {
        return None;
    }

    let year_idx = segments
        .iter()
        .enumerate()
        .take(segments.len().saturating_sub(1))
        .filter(|(_, s)| s.len() == 4 && s.bytes().all(|b| b.is_ascii_digit()))
        .map(|(i, _)| i)
        .last()?;

    Some(segments[year_idx..].join("_"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(raw: &str) -> CandidateSet {
        generate_candidates(&VideoId::parse(raw).unwrap())
    }

    #[test]
    fn test_full_identifier_puts_day_folder_first() {
        let set = candidates("10011090_18687781_2023_cm005.mp4");
        assert_eq!(set.user_id.as_deref(), Some("10011090"));
        assert_eq!(set.filename.as_deref(), Some("2023_cm005.mp4"));
        assert_eq!(set.paths()[0], "10011090/día 1/2023_cm005.mp4");
        assert_eq!(set.paths()[1], "10011090/ día 1/2023_cm005.mp4");
        assert!(set
            .paths()
            .contains(&"10011090/videos/2023_cm005.mp4".to_string()));
        assert!(set.paths().contains(&"10011090/2023_cm005.mp4".to_string()));
    }

    #[test]
    fn test_full_identifier_ordering_and_fallbacks() {
        let set = candidates("10011090_18687781_2023_cw003.mp4");
        let expected = vec![
            "10011090/día 1/2023_cw003.mp4",
            "10011090/ día 1/2023_cw003.mp4",
            "10011090/dia 1/2023_cw003.mp4",
            "10011090/día 1/videos/2023_cw003.mp4",
            "10011090/videos/2023_cw003.mp4",
            "10011090/2023_cw003.mp4",
            "10011090/10011090_18687781_2023_cw003.mp4",
            "10011090/día 1/10011090_18687781_2023_cw003.mp4",
            "10011090/ día 1/10011090_18687781_2023_cw003.mp4",
            "10011090/videos/10011090_18687781_2023_cw003.mp4",
            "10011090/día 1/videos/10011090_18687781_2023_cw003.mp4",
            "2023_cw003.mp4",
            "10011090_18687781_2023_cw003.mp4",
            "videos/10011090_18687781_2023_cw003.mp4",
        ];
        assert_eq!(set.paths(), expected.as_slice());
    }

    #[test]
    fn test_category_codes_case_insensitive() {
        for raw in [
            "1_2023_BC001.MP4",
            "1_2023_gt123.mov",
            "1_2023_cw999.mp4",
        ] {
            let set = candidates(raw);
            assert_eq!(set.filename.as_deref(), Some(&raw[2..]), "{raw}");
        }
    }

    #[test]
    fn test_user_id_only_reconstructs_filename_from_year() {
        let set = candidates("10011090_18687781_2024_squat_front.mp4");
        assert!(set.filename.is_some());
        assert_eq!(set.filename.as_deref(), Some("2024_squat_front.mp4"));
        assert_eq!(set.paths()[0], "10011090/día 1/2024_squat_front.mp4");
    }

    #[test]
    fn test_user_id_without_year_uses_whole_identifier() {
        let set = candidates("10011090_plank.mp4");
        assert!(set.filename.is_none());
        assert_eq!(set.paths()[0], "10011090/10011090_plank.mp4");
        assert_eq!(
            set.paths().last().map(String::as_str),
            Some("videos/10011090_plank.mp4")
        );
    }

    #[test]
    fn test_no_user_id_still_has_fallbacks() {
        let set = candidates("warmup-routine.mp4");
        assert!(set.user_id.is_none());
        assert_eq!(
            set.paths(),
            &["warmup-routine.mp4".to_string(), "videos/warmup-routine.mp4".to_string()]
        );
        assert!(!set.is_empty());
    }

    #[test]
    fn test_filename_without_user_id() {
        let set = candidates("legacy_2023_cw003.mp4");
        assert!(set.user_id.is_none());
        assert_eq!(
            set.paths(),
            &[
                "2023_cw003.mp4".to_string(),
                "legacy_2023_cw003.mp4".to_string(),
                "videos/legacy_2023_cw003.mp4".to_string(),
            ]
        );
    }

    #[test]
    fn test_year_prefix_reads_as_user_id() {
        // A bare `2023_cw003.mp4` has a numeric prefix, so `2023` is taken as the user folder.
        let set = candidates("2023_cw003.mp4");
        assert_eq!(set.user_id.as_deref(), Some("2023"));
        assert_eq!(set.paths()[0], "2023/día 1/2023_cw003.mp4");
        assert_eq!(
            set.paths().iter().filter(|p| *p == "2023_cw003.mp4").count(),
            1
        );
    }

    #[test]
    fn test_candidates_are_unique() {
        let set = candidates("10011090_2023_cw003.mp4");
        let unique: HashSet<&String> = set.paths().iter().collect();
        assert_eq!(unique.len(), set.len());
    }

    #[test]
    fn test_reconstruct_filename() {
        assert_eq!(
            reconstruct_filename("18687781_2023_x12.mp4").as_deref(),
            Some("2023_x12.mp4")
        );
        assert_eq!(reconstruct_filename("2023.mp4"), None);
        assert_eq!(reconstruct_filename("2023_clip"), None);
        assert_eq!(
            reconstruct_filename("2022_2023_a.mp4").as_deref(),
            Some("2023_a.mp4")
        );
    }
}
