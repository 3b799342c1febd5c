//! Service components for the scan pipeline
//!
//! The dependency graph is a strict DAG: the orchestrator and batch
//! coordinator call down into detection and enrichment; detection and
//! enrichment call down into their external collaborators; nothing
//! calls back up.

pub mod batch;
pub mod detector;
pub mod enrichment;
pub mod orchestrator;
pub mod providers;
pub mod vision_client;
