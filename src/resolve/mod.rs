//! Turning loose asset references into concrete blob locations.

pub mod candidates;
pub mod prober;
pub mod thumbnail;

pub use candidates::{generate_candidates, CandidateSet};
pub use prober::{ContainerProber, ProbeReport, Resolution, ResolvedBlob, UnsatisfiableRange};
pub use thumbnail::thumbnail_blob_path;
