//! Cluster-wise read correction engine.
//!
//! Clusters of reads believed to come from the same molecule are split into
//! bounded batches, aligned through the POA collaborator, end-trimmed,
//! reduced to a phred-weighted column consensus, and rewritten toward it.

pub mod consensus;
pub mod corrector;
pub mod phred;
pub mod results;
pub mod scheduler;
pub mod trim;

pub use corrector::CorrectionThresholds;
pub use results::CorrectionResults;
pub use scheduler::correct_clusters;

use serde::{Deserialize, Serialize};
use std::fmt;

/// One read's membership in a cluster.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClusterMember {
    /// Index into the shared read set.
    pub read: usize,
    /// The read aligns to the cluster in reverse-complement orientation.
    #[serde(default)]
    pub rev: bool,
}

pub type Cluster = Vec<ClusterMember>;

/// Run-level parameters for the scheduler.
#[derive(Debug, Clone)]
pub struct CorrectParams {
    pub thresholds: CorrectionThresholds,
    /// Maximum reads per correction batch.
    pub split: usize,
    /// Batches with at most this many reads skip correction.
    pub min_reads: usize,
    /// Worker pool size.
    pub n_threads: usize,
}

impl Default for CorrectParams {
    fn default() -> Self {
        Self {
            thresholds: CorrectionThresholds::default(),
            split: 200,
            min_reads: 5,
            n_threads: num_cpus::get(),
        }
    }
}

impl CorrectParams {
    /// Rejects out-of-range parameters before any batch is scheduled.
    pub fn validate(&self) -> Result<(), CorrectError> {
        self.thresholds.validate()?;
        if self.n_threads < 1 {
            return Err(CorrectError::ThresholdOutOfRange {
                name: "n_threads",
                value: self.n_threads as f64,
            });
        }
        if self.split < 1 {
            return Err(CorrectError::ThresholdOutOfRange {
                name: "split",
                value: self.split as f64,
            });
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum CorrectError {
    /// A correction parameter is outside its documented range.
    ThresholdOutOfRange { name: &'static str, value: f64 },
    /// The collaborator returned an MSA whose shape does not match its batch.
    AlignmentWidthMismatch(String),
    /// A read id is claimed by more than one cluster member.
    OrientationAssignmentConflict { read_id: usize },
    /// A cluster references a read the input set does not contain.
    ReadIdOutOfRange { read_id: usize, n_reads: usize },
    /// A worker died mid-batch; surfaced at the join barrier.
    WorkerPanic,
}

impl fmt::Display for CorrectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrectError::ThresholdOutOfRange { name, value } => {
                write!(f, "parameter {} out of range: {}", name, value)
            }
            CorrectError::AlignmentWidthMismatch(detail) => {
                write!(f, "alignment shape mismatch: {}", detail)
            }
            CorrectError::OrientationAssignmentConflict { read_id } => {
                write!(f, "read {} is claimed by more than one cluster member", read_id)
            }
            CorrectError::ReadIdOutOfRange { read_id, n_reads } => {
                write!(f, "cluster references read {} but only {} reads were loaded", read_id, n_reads)
            }
            CorrectError::WorkerPanic => write!(f, "a correction worker panicked"),
        }
    }
}

impl std::error::Error for CorrectError {}
