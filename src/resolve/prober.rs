use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::types::{BlobLocation, ProbeAttempt, ProbeOutcome, VideoId};
use crate::observability::metrics as obs;
use crate::storage::{BlobMeta, BlobResponse, BlobStore, ByteRange};

use super::candidates::{CandidateSet, DAY_FOLDER_PREFIX};

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// The blob that answered first, with its streamed body.
#[derive(Debug)]
pub struct ResolvedBlob {
    pub location: BlobLocation,
    pub response: BlobResponse,
    /// Number of locations probed, including the successful one.
    pub attempts: usize,
}

/// Diagnostic trace returned when no candidate could be fetched.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeReport {
    pub video_id: VideoId,
    pub tried_containers: Vec<String>,
    /// Containers where at least one attempt failed for a reason other than not-found.
    pub failed_containers: Vec<String>,
    pub tried_path_count: usize,
    pub tried_paths: Vec<String>,
    pub last_error: Option<String>,
    #[serde(skip)]
    pub attempts: Vec<ProbeAttempt>,
}

/// The blob exists but upstream rejected the requested byte range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsatisfiableRange {
    pub location: BlobLocation,
    /// Full blob size as reported by HEAD.
    pub total_length: Option<u64>,
    pub attempts: usize,
}

/// Outcome of a full probe sweep.
#[derive(Debug)]
pub enum Resolution {
    Found(ResolvedBlob),
    RangeNotSatisfiable(UnsatisfiableRange),
    Exhausted(ProbeReport),
}

/// Result of probing one location.
enum Attempt {
    Miss,
    Hit(BlobResponse),
    /// HEAD succeeded, GET answered 416. Carries the HEAD content length.
    RangeRejected(Option<u64>),
}

// ---------------------------------------------------------------------------
// ContainerProber
// ---------------------------------------------------------------------------

/// Sequential HEAD prober over containers × candidate paths.
///
/// Containers are the outer loop, paths the inner one. The first location
/// answering HEAD with success is fetched with GET and returned; nothing is
/// probed after that, even when upstream rejects the requested range.
/// Per-attempt failures are recorded and never abort the
/// sweep. Only exhausting every candidate (plus the `día N` fallback sweep)
/// ends in a `ProbeReport`.
pub struct ContainerProber<'a, S> {
    store: &'a S,
    containers: &'a [String],
    fallback_max_day: u32,
}

/// Mutable bookkeeping for one sweep.
struct Sweep {
    probed: HashSet<BlobLocation>,
    attempts: Vec<ProbeAttempt>,
    last_error: Option<String>,
}

impl Sweep {
    fn record(&mut self, location: BlobLocation, outcome: ProbeOutcome) {
        obs::inc_probe_attempt(outcome.as_str());
        if let ProbeOutcome::Error(reason) = &outcome {
            self.last_error = Some(reason.clone());
        }
        self.attempts.push(ProbeAttempt { location, outcome });
    }
}

impl<'a, S: BlobStore> ContainerProber<'a, S> {
    pub fn new(store: &'a S, containers: &'a [String], fallback_max_day: u32) -> Self {
        Self {
            store,
            containers,
            fallback_max_day,
        }
    }

    /// Probe every candidate until one blob can be fetched.
    pub async fn resolve(
        &self,
        video_id: &VideoId,
        candidates: &CandidateSet,
        range: Option<ByteRange>,
    ) -> Resolution {
        let mut sweep = Sweep {
            probed: HashSet::new(),
            attempts: Vec::new(),
            last_error: None,
        };

        for container in self.containers {
            for path in candidates.paths() {
                let location = BlobLocation::new(container.as_str(), path.as_str());
                let attempt = self.try_location(&location, range, &mut sweep).await;
                if let Some(resolution) = self.settle(video_id, location, attempt, &sweep) {
                    return resolution;
                }
            }
        }

        for location in self.fallback_locations(candidates) {
            if sweep.probed.contains(&location) {
                continue;
            }
            debug!(%video_id, %location, "trying day-folder fallback");
            let attempt = self.try_location(&location, range, &mut sweep).await;
            if let Some(resolution) = self.settle(video_id, location, attempt, &sweep) {
                return resolution;
            }
        }

        let report = self.report(video_id, candidates, sweep);
        warn!(
            %video_id,
            tried_path_count = report.tried_path_count,
            attempts = report.attempts.len(),
            last_error = ?report.last_error,
            "video not found in any container or path variation"
        );
        obs::record_probe_sweep_length("exhausted", report.attempts.len());
        Resolution::Exhausted(report)
    }

    /// HEAD one location and, on success, GET it.
    async fn try_location(
        &self,
        location: &BlobLocation,
        range: Option<ByteRange>,
        sweep: &mut Sweep,
    ) -> Attempt {
        sweep.probed.insert(location.clone());

        let head = match self.store.head_blob(location).await {
            Ok(meta) => meta,
            Err(e) if e.is_not_found() => {
                debug!(%location, "not found");
                sweep.record(location.clone(), ProbeOutcome::NotFound);
                return Attempt::Miss;
            }
            Err(e) => {
                debug!(%location, error = %e, "HEAD failed");
                sweep.record(location.clone(), ProbeOutcome::Error(e.to_string()));
                return Attempt::Miss;
            }
        };

        match self.store.get_blob(location, range).await {
            Ok(mut response) => {
                // HEAD reports the full size, which is wrong for a partial body.
                let head = if response.content_range.is_some() {
                    BlobMeta {
                        content_length: None,
                        ..head
                    }
                } else {
                    head
                };
                response.meta = response.meta.or(head);
                sweep.record(location.clone(), ProbeOutcome::Found);
                Attempt::Hit(response)
            }
            Err(e) if e.is_range_not_satisfiable() => {
                info!(%location, range = ?range, "blob found but range not satisfiable");
                sweep.record(location.clone(), ProbeOutcome::Found);
                Attempt::RangeRejected(head.content_length)
            }
            Err(e) => {
                warn!(%location, error = %e, "HEAD succeeded but GET failed");
                sweep.record(location.clone(), ProbeOutcome::Error(e.to_string()));
                Attempt::Miss
            }
        }
    }

    /// `user/día N/filename` in the primary container for N in 1..=max.
    fn fallback_locations(&self, candidates: &CandidateSet) -> Vec<BlobLocation> {
        let (Some(primary), Some(user_id), Some(filename)) = (
            self.containers.first(),
            candidates.user_id.as_deref(),
            candidates.filename.as_deref(),
        ) else {
            return Vec::new();
        };

        (1..=self.fallback_max_day)
            .map(|day| {
                BlobLocation::new(
                    primary.as_str(),
                    format!("{}/{} {}/{}", user_id, DAY_FOLDER_PREFIX, day, filename),
                )
            })
            .collect()
    }

    /// Turn a terminal attempt into the sweep result; `None` keeps probing.
    fn settle(
        &self,
        video_id: &VideoId,
        location: BlobLocation,
        attempt: Attempt,
        sweep: &Sweep,
    ) -> Option<Resolution> {
        match attempt {
            Attempt::Miss => None,
            Attempt::Hit(response) => Some(self.found(video_id, location, response, sweep)),
            Attempt::RangeRejected(total_length) => {
                let attempts = sweep.attempts.len();
                obs::record_probe_sweep_length("found", attempts);
                Some(Resolution::RangeNotSatisfiable(UnsatisfiableRange {
                    location,
                    total_length,
                    attempts,
                }))
            }
        }
    }

    fn found(
        &self,
        video_id: &VideoId,
        location: BlobLocation,
        response: BlobResponse,
        sweep: &Sweep,
    ) -> Resolution {
        let attempts = sweep.attempts.len();
        info!(%video_id, %location, attempts, "found video");
        obs::record_probe_sweep_length("found", attempts);
        Resolution::Found(ResolvedBlob {
            location,
            response,
            attempts,
        })
    }

    fn report(&self, video_id: &VideoId, candidates: &CandidateSet, sweep: Sweep) -> ProbeReport {
        let failed_containers = self
            .containers
            .iter()
            .filter(|c| {
                sweep.attempts.iter().any(|a| {
                    &a.location.container == *c && matches!(a.outcome, ProbeOutcome::Error(_))
                })
            })
            .cloned()
            .collect();

        ProbeReport {
            video_id: video_id.clone(),
            tried_containers: self.containers.to_vec(),
            failed_containers,
            tried_path_count: candidates.len(),
            tried_paths: candidates.paths().to_vec(),
            last_error: sweep.last_error,
            attempts: sweep.attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::candidates::generate_candidates;
    use crate::storage::memory::{InMemoryBlobStore, StoreCall};
    use futures::StreamExt;

    fn containers() -> Vec<String> {
        vec![
            "sagafitvideos".to_string(),
            "sagavideos".to_string(),
            "videos".to_string(),
        ]
    }

    fn video(raw: &str) -> (VideoId, CandidateSet) {
        let id = VideoId::parse(raw).unwrap();
        let set = generate_candidates(&id);
        (id, set)
    }

    async fn body_of(resolved: ResolvedBlob) -> Vec<u8> {
        let mut body = resolved.response.body;
        let mut out = Vec::new();
        while let Some(chunk) = body.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_stops_after_first_success() {
        let store = InMemoryBlobStore::new();
        let target = BlobLocation::new("sagavideos", "10011090/videos/2023_cw003.mp4");
        store.put_blob(target.clone(), "the-video").await;

        let containers = containers();
        let prober = ContainerProber::new(&store, &containers, 5);
        let (id, set) = video("10011090_18687781_2023_cw003.mp4");

        let Resolution::Found(resolved) = prober.resolve(&id, &set, None).await else {
            panic!("expected the blob to be found");
        };
        assert_eq!(resolved.location, target);
        // Whole first container, then the first five paths of the second.
        assert_eq!(resolved.attempts, set.len() + 5);
        assert_eq!(body_of(resolved).await, b"the-video");

        let calls = store.calls().await;
        assert_eq!(calls.last(), Some(&StoreCall::Get(target.clone())));
        assert_eq!(store.head_count().await, set.len() + 5);
        let after_get = calls
            .iter()
            .skip_while(|c| !matches!(c, StoreCall::Get(_)))
            .skip(1)
            .count();
        assert_eq!(after_get, 0);
    }

    #[tokio::test]
    async fn test_containers_outer_paths_inner() {
        let store = InMemoryBlobStore::new();
        let containers = containers();
        let prober = ContainerProber::new(&store, &containers, 0);
        let (id, set) = video("10011090_18687781_2023_cw003.mp4");

        let Resolution::Exhausted(_) = prober.resolve(&id, &set, None).await else {
            panic!("nothing is stored");
        };

        let calls = store.calls().await;
        assert_eq!(calls.len(), containers.len() * set.len());
        assert_eq!(
            calls[0],
            StoreCall::Head(BlobLocation::new(
                "sagafitvideos",
                "10011090/día 1/2023_cw003.mp4"
            ))
        );
        assert_eq!(
            calls[1],
            StoreCall::Head(BlobLocation::new(
                "sagafitvideos",
                "10011090/ día 1/2023_cw003.mp4"
            ))
        );
        assert_eq!(
            calls[set.len()],
            StoreCall::Head(BlobLocation::new(
                "sagavideos",
                "10011090/día 1/2023_cw003.mp4"
            ))
        );
    }

    #[tokio::test]
    async fn test_exhaustion_report() {
        let store = InMemoryBlobStore::new();
        let containers = containers();
        let prober = ContainerProber::new(&store, &containers, 5);
        let (id, set) = video("10011090_18687781_2023_cw003.mp4");

        let Resolution::Exhausted(report) = prober.resolve(&id, &set, None).await else {
            panic!("nothing is stored");
        };
        assert_eq!(report.tried_path_count, set.len());
        assert_eq!(report.tried_paths, set.paths());
        assert_eq!(report.tried_containers, containers);
        assert!(report.failed_containers.is_empty());
        assert!(report.last_error.is_none());
        // día 1 was already probed in the primary container; días 2..=5 are new.
        assert_eq!(report.attempts.len(), containers.len() * set.len() + 4);
    }

    #[tokio::test]
    async fn test_day_folder_fallback() {
        let store = InMemoryBlobStore::new();
        let target = BlobLocation::new("sagafitvideos", "10011090/día 3/2023_cw003.mp4");
        store.put_blob(target.clone(), "day-three").await;

        let containers = containers();
        let prober = ContainerProber::new(&store, &containers, 5);
        let (id, set) = video("10011090_18687781_2023_cw003.mp4");

        let Resolution::Found(resolved) = prober.resolve(&id, &set, None).await else {
            panic!("expected fallback to find día 3");
        };
        assert_eq!(resolved.location, target);
        assert_eq!(resolved.attempts, containers.len() * set.len() + 2);
    }

    #[tokio::test]
    async fn test_no_fallback_without_filename() {
        let store = InMemoryBlobStore::new();
        let containers = containers();
        let prober = ContainerProber::new(&store, &containers, 5);
        let (id, set) = video("10011090_plank.mp4");

        let Resolution::Exhausted(report) = prober.resolve(&id, &set, None).await else {
            panic!("nothing is stored");
        };
        assert_eq!(report.attempts.len(), containers.len() * set.len());
    }

    #[tokio::test]
    async fn test_errors_do_not_abort_sweep() {
        let store = InMemoryBlobStore::new();
        let broken = BlobLocation::new("sagafitvideos", "10011090/día 1/2023_cw003.mp4");
        store.fail_location(broken).await;
        let target = BlobLocation::new("videos", "videos/10011090_18687781_2023_cw003.mp4");
        store.put_blob(target.clone(), "late").await;

        let containers = containers();
        let prober = ContainerProber::new(&store, &containers, 5);
        let (id, set) = video("10011090_18687781_2023_cw003.mp4");

        let Resolution::Found(resolved) = prober.resolve(&id, &set, None).await else {
            panic!("a transport error must not stop the sweep");
        };
        assert_eq!(resolved.location, target);
    }

    #[tokio::test]
    async fn test_failed_get_continues_and_reports() {
        let store = InMemoryBlobStore::new();
        let flaky = BlobLocation::new("sagavideos", "10011090/día 1/2023_cw003.mp4");
        store.put_blob(flaky.clone(), "bytes").await;
        store.fail_get(flaky).await;

        let containers = containers();
        let prober = ContainerProber::new(&store, &containers, 5);
        let (id, set) = video("10011090_18687781_2023_cw003.mp4");

        let Resolution::Exhausted(report) = prober.resolve(&id, &set, None).await else {
            panic!("the only copy cannot be fetched");
        };
        assert_eq!(report.failed_containers, vec!["sagavideos".to_string()]);
        assert!(report
            .last_error
            .as_deref()
            .is_some_and(|e| e.contains("connection reset during GET")));
    }

    #[tokio::test]
    async fn test_range_past_end_stops_sweep() {
        let store = InMemoryBlobStore::new();
        let target = BlobLocation::new("sagafitvideos", "10011090/día 1/2023_cw003.mp4");
        store.put_blob(target.clone(), "0123456789").await;

        let containers = containers();
        let prober = ContainerProber::new(&store, &containers, 5);
        let (id, set) = video("10011090_18687781_2023_cw003.mp4");

        let Resolution::RangeNotSatisfiable(rejected) = prober
            .resolve(&id, &set, ByteRange::parse("bytes=50-"))
            .await
        else {
            panic!("an existing blob must not be reported as missing");
        };
        assert_eq!(
            rejected,
            UnsatisfiableRange {
                location: target.clone(),
                total_length: Some(10),
                attempts: 1,
            }
        );
        assert_eq!(
            store.calls().await,
            vec![StoreCall::Head(target.clone()), StoreCall::Get(target)]
        );
    }

    #[tokio::test]
    async fn test_range_is_forwarded() {
        let store = InMemoryBlobStore::new();
        let target = BlobLocation::new("sagafitvideos", "10011090/día 1/2023_cw003.mp4");
        store.put_blob(target, "0123456789").await;

        let containers = containers();
        let prober = ContainerProber::new(&store, &containers, 5);
        let (id, set) = video("10011090_18687781_2023_cw003.mp4");

        let Resolution::Found(resolved) = prober
            .resolve(&id, &set, ByteRange::parse("bytes=2-4"))
            .await
        else {
            panic!("expected a hit on the first candidate");
        };
        assert_eq!(resolved.attempts, 1);
        assert_eq!(
            resolved.response.content_range.as_deref(),
            Some("bytes 2-4/10")
        );
        assert_eq!(body_of(resolved).await, b"234");
    }
}
