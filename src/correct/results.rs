//! Shared result sink and per-cluster consensus consolidation.

use crate::io::fastq::FastqRecord;
use ahash::AHashMap;
use std::sync::Mutex;
use tracing::debug;

/// Quality fill for consensus sequences, which carry no per-base evidence.
const CONSENSUS_QUALITY: &str = "K";

/// Consensus of one corrected batch, keyed by its original cluster.
#[derive(Debug, Clone)]
pub struct SplitConsensus {
    /// Reads that contributed to this split.
    pub n_reads: usize,
    pub sequence: String,
    pub quality: String,
}

impl SplitConsensus {
    pub fn new(n_reads: usize, sequence: String) -> Self {
        let quality = CONSENSUS_QUALITY.repeat(sequence.len());
        Self {
            n_reads,
            sequence,
            quality,
        }
    }
}

/// A cluster whose consensus spans several splits. Merging the split
/// consensi is not supported; the splits are surfaced as-is instead of
/// being collapsed into a guessed (or empty) sequence.
#[derive(Debug, Clone)]
pub struct UnmergedCluster {
    pub cluster_id: usize,
    pub total_reads: usize,
    pub splits: Vec<SplitConsensus>,
}

/// Final output of a correction run.
#[derive(Debug, Default)]
pub struct CorrectionResults {
    /// Rewritten reads, batch by batch; order across batches follows worker
    /// completion and is not deterministic.
    pub corrected: Vec<FastqRecord>,
    /// Reads from skipped batches, orientation-adjusted but untouched.
    pub uncorrected: Vec<FastqRecord>,
    /// One consensus record per fully-consolidated cluster.
    pub consensus: Vec<FastqRecord>,
    /// Clusters left without a consensus because they span several splits.
    pub unmerged: Vec<UnmergedCluster>,
}

#[derive(Default)]
struct SinkState {
    corrected: Vec<FastqRecord>,
    uncorrected: Vec<FastqRecord>,
    splits: AHashMap<usize, Vec<SplitConsensus>>,
}

/// Append-only result collector shared by the worker pool. One coarse lock,
/// independent of the work queue's.
pub(crate) struct ResultSink {
    state: Mutex<SinkState>,
}

impl ResultSink {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SinkState::default()),
        }
    }

    pub fn push_uncorrected(&self, reads: Vec<FastqRecord>) {
        let mut state = self.state.lock().expect("result sink lock poisoned");
        state.uncorrected.extend(reads);
    }

    /// Records one completed batch: its corrected reads and its split
    /// consensus, under a single lock acquisition.
    pub fn push_batch(&self, cluster_id: usize, corrected: Vec<FastqRecord>, split: SplitConsensus) {
        let mut state = self.state.lock().expect("result sink lock poisoned");
        state.corrected.extend(corrected);
        state.splits.entry(cluster_id).or_default().push(split);
    }

    /// Consolidates split consensi after the worker pool has joined.
    pub fn into_results(self, n_clusters: usize) -> CorrectionResults {
        let state = self.state.into_inner().expect("result sink lock poisoned");
        let mut splits = state.splits;

        let mut consensus = Vec::new();
        let mut unmerged = Vec::new();
        for cluster_id in 0..n_clusters {
            let Some(cluster_splits) = splits.remove(&cluster_id) else {
                continue;
            };
            let total_reads: usize = cluster_splits.iter().map(|s| s.n_reads).sum();

            if cluster_splits.len() == 1 {
                let split = &cluster_splits[0];
                consensus.push(FastqRecord {
                    header: format!("@cluster_{} reads={}", cluster_id, total_reads),
                    sequence: split.sequence.clone(),
                    plus: "+".into(),
                    quality: split.quality.clone(),
                });
            } else {
                debug!(
                    "cluster {} consensus spans {} splits; merge unsupported",
                    cluster_id,
                    cluster_splits.len()
                );
                unmerged.push(UnmergedCluster {
                    cluster_id,
                    total_reads,
                    splits: cluster_splits,
                });
            }
        }

        CorrectionResults {
            corrected: state.corrected,
            uncorrected: state.uncorrected,
            consensus,
            unmerged,
        }
    }
}
