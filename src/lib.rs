//! Media proxy for the fitness-studio admin portal.
//!
//! Resolves loosely-formatted video identifiers and thumbnail references to
//! blobs in Azure Blob Storage and streams them back to the browser.

pub mod core;
pub mod delivery;
pub mod observability;
pub mod resolve;
pub mod storage;
