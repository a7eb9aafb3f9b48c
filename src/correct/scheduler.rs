//! Splits clusters into batches and drives the worker pool.
//!
//! Oversized clusters are split round-robin so every batch keeps a
//! representative mix of the cluster. Batches flow through one shared FIFO
//! queue into a fixed pool of workers; each worker runs a batch end to end
//! (align, trim, aggregate, correct, re-align) and appends its output to the
//! shared result sink. The queue and the sink are the only two locks.

use crate::align::PoaEngine;
use crate::correct::consensus::consensus_vector;
use crate::correct::corrector::{correct_batch, CorrectionThresholds};
use crate::correct::results::{CorrectionResults, ResultSink, SplitConsensus};
use crate::correct::trim::trim_msa_ends;
use crate::correct::{Cluster, ClusterMember, CorrectError, CorrectParams};
use crate::io::fastq::FastqRecord;
use ahash::AHashSet;
use bio::alphabets::dna;
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// One unit of worker work: a bounded slice of a cluster.
struct Batch {
    cluster_id: usize,
    reads: Vec<FastqRecord>,
}

struct QueueState {
    pending: VecDeque<Batch>,
    dispatched_reads: usize,
    total_reads: usize,
}

/// Shared FIFO of pending batches. The progress counter lives under the same
/// lock and is reported as batches are handed out.
struct WorkQueue {
    state: Mutex<QueueState>,
}

impl WorkQueue {
    fn new(pending: VecDeque<Batch>, total_reads: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending,
                dispatched_reads: 0,
                total_reads,
            }),
        }
    }

    fn pop(&self) -> Option<Batch> {
        let mut state = self.state.lock().expect("work queue lock poisoned");
        let batch = state.pending.pop_front()?;
        state.dispatched_reads += batch.reads.len();
        debug!(
            "dispatched {} of {} reads",
            state.dispatched_reads, state.total_reads
        );
        Some(batch)
    }
}

/// Corrects every cluster of `clusters` over the shared read set.
///
/// Validates parameters and cluster membership eagerly, routes undersized
/// batches straight to the uncorrected set, and runs `n_threads` workers
/// over the remaining batches. A worker fault surfaces as `WorkerPanic` at
/// the join barrier; a malformed MSA only skips its own batch.
pub fn correct_clusters<E: PoaEngine>(
    clusters: &[Cluster],
    reads: &[FastqRecord],
    engine: &E,
    params: &CorrectParams,
) -> Result<CorrectionResults, CorrectError> {
    params.validate()?;
    check_membership(clusters, reads.len())?;

    let sink = ResultSink::new();
    let mut pending = VecDeque::new();
    let mut total_reads = 0;

    for (cluster_id, cluster) in clusters.iter().enumerate() {
        for batch_reads in split_cluster(cluster, reads, params.split) {
            total_reads += batch_reads.len();
            if batch_reads.len() > params.min_reads {
                pending.push_back(Batch {
                    cluster_id,
                    reads: batch_reads,
                });
            } else {
                sink.push_uncorrected(batch_reads);
            }
        }
    }

    info!(
        "{} clusters split into {} correction batches over {} reads",
        clusters.len(),
        pending.len(),
        total_reads
    );

    let queue = WorkQueue::new(pending, total_reads);
    crossbeam::thread::scope(|scope| {
        for _ in 0..params.n_threads {
            scope.spawn(|_| run_worker(engine, &queue, &sink, &params.thresholds));
        }
    })
    .map_err(|_| CorrectError::WorkerPanic)?;

    Ok(sink.into_results(clusters.len()))
}

/// Every read id must be claimed by at most one member and refer to a loaded
/// read. Orientation is resolved per member, so a duplicate claim means the
/// cluster file is corrupt.
fn check_membership(clusters: &[Cluster], n_reads: usize) -> Result<(), CorrectError> {
    let mut seen = AHashSet::new();
    for cluster in clusters {
        for member in cluster {
            if member.read >= n_reads {
                return Err(CorrectError::ReadIdOutOfRange {
                    read_id: member.read,
                    n_reads,
                });
            }
            if !seen.insert(member.read) {
                return Err(CorrectError::OrientationAssignmentConflict {
                    read_id: member.read,
                });
            }
        }
    }
    Ok(())
}

/// Round-robin split of one cluster into `ceil(len / split)` batches: member
/// `j` lands in batch `j % n_splits`, keeping relative order within each
/// batch. Every read is copied in resolved orientation.
pub fn split_cluster(
    cluster: &[ClusterMember],
    reads: &[FastqRecord],
    split: usize,
) -> Vec<Vec<FastqRecord>> {
    let n_splits = (cluster.len() + split - 1) / split;
    (0..n_splits)
        .map(|s| {
            cluster
                .iter()
                .skip(s)
                .step_by(n_splits)
                .map(|member| oriented_read(&reads[member.read], member.rev))
                .collect()
        })
        .collect()
}

/// Owned copy of a read in the orientation its cluster expects.
fn oriented_read(read: &FastqRecord, rev: bool) -> FastqRecord {
    if !rev {
        return read.clone();
    }
    let sequence = String::from_utf8(dna::revcomp(read.sequence.as_bytes()))
        .expect("reverse complement is ASCII");
    FastqRecord {
        header: read.header.clone(),
        sequence,
        plus: read.plus.clone(),
        quality: read.quality.chars().rev().collect(),
    }
}

fn run_worker<E: PoaEngine>(
    engine: &E,
    queue: &WorkQueue,
    sink: &ResultSink,
    thresholds: &CorrectionThresholds,
) {
    while let Some(batch) = queue.pop() {
        let Batch { cluster_id, reads } = batch;
        match aligned_rows(engine, &reads) {
            Ok(msa) => {
                let (corrected, split) = correct_pack(engine, reads, msa, thresholds);
                sink.push_batch(cluster_id, corrected, split);
            }
            Err(err) => {
                warn!(
                    "skipping a batch of {} reads from cluster {}: {}",
                    reads.len(),
                    cluster_id,
                    err
                );
                sink.push_uncorrected(reads);
            }
        }
    }
}

/// Builds the batch MSA through the collaborator and validates its shape.
fn aligned_rows<E: PoaEngine>(
    engine: &E,
    reads: &[FastqRecord],
) -> Result<Vec<Vec<u8>>, CorrectError> {
    let mut graph = engine.create_graph();
    for read in reads {
        let alignment = engine.align(&read.sequence, &graph);
        engine.add_alignment(&mut graph, alignment, &read.sequence);
    }

    let msa: Vec<Vec<u8>> = engine
        .generate_msa(&graph)
        .into_iter()
        .map(String::into_bytes)
        .collect();

    if msa.len() != reads.len() {
        return Err(CorrectError::AlignmentWidthMismatch(format!(
            "{} rows for {} reads",
            msa.len(),
            reads.len()
        )));
    }
    let width = msa.first().map_or(0, |row| row.len());
    for (i, row) in msa.iter().enumerate() {
        if row.len() != width {
            return Err(CorrectError::AlignmentWidthMismatch(format!(
                "row {} is {} columns wide, expected {}",
                i,
                row.len(),
                width
            )));
        }
    }
    Ok(msa)
}

/// One batch end to end: trim, aggregate, correct, then re-align the
/// corrected reads (longest first) for the collaborator's consensus.
fn correct_pack<E: PoaEngine>(
    engine: &E,
    mut reads: Vec<FastqRecord>,
    mut msa: Vec<Vec<u8>>,
    thresholds: &CorrectionThresholds,
) -> (Vec<FastqRecord>, SplitConsensus) {
    trim_msa_ends(&mut reads, &mut msa);

    let cv = consensus_vector(&reads, &msa, 1);
    let (corrected, counts) = correct_batch(&reads, &msa, &cv, thresholds, 1);
    debug!(
        "batch of {}: {} substitutions, {} insertions dropped, {} deletions repaired",
        corrected.len(),
        counts.substitutions,
        counts.insertions_dropped,
        counts.deletions_repaired
    );

    let mut order: Vec<&FastqRecord> = corrected.iter().collect();
    order.sort_by(|a, b| b.sequence.len().cmp(&a.sequence.len()));

    let mut graph = engine.create_graph();
    for read in order {
        let alignment = engine.align(&read.sequence, &graph);
        engine.add_alignment(&mut graph, alignment, &read.sequence);
    }
    let consensus = engine.generate_consensus(&graph);

    let split = SplitConsensus::new(corrected.len(), consensus);
    (corrected, split)
}
