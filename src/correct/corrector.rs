//! Rewrites each read of a batch toward the column consensus.

use crate::correct::consensus::ConsensusVector;
use crate::correct::phred::{phred_err, phred_symbol};
use crate::correct::CorrectError;
use crate::io::fastq::FastqRecord;

const GAP: u8 = b'-';

/// Quality-aware correction thresholds.
#[derive(Debug, Clone, Copy)]
pub struct CorrectionThresholds {
    /// Occurrence-ratio floor for substitution corrections, in (0, 1].
    pub min_occ: f64,
    /// Occurrence-ratio floor for indel corrections, in (0, 1].
    pub gap_occ: f64,
    /// Multiplier on the read's own error before a substitution is accepted.
    pub err_ratio: f64,
}

impl Default for CorrectionThresholds {
    fn default() -> Self {
        Self {
            min_occ: 0.3,
            gap_occ: 0.3,
            err_ratio: 30.0,
        }
    }
}

impl CorrectionThresholds {
    pub fn validate(&self) -> Result<(), CorrectError> {
        if !(self.min_occ > 0.0 && self.min_occ <= 1.0) {
            return Err(CorrectError::ThresholdOutOfRange {
                name: "min_occ",
                value: self.min_occ,
            });
        }
        if !(self.gap_occ > 0.0 && self.gap_occ <= 1.0) {
            return Err(CorrectError::ThresholdOutOfRange {
                name: "gap_occ",
                value: self.gap_occ,
            });
        }
        if self.err_ratio <= 0.0 {
            return Err(CorrectError::ThresholdOutOfRange {
                name: "err_ratio",
                value: self.err_ratio,
            });
        }
        Ok(())
    }
}

/// How many positions each correction kind touched across a batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorrectionCounts {
    pub substitutions: u32,
    pub insertions_dropped: u32,
    pub deletions_repaired: u32,
}

impl CorrectionCounts {
    fn merge(&mut self, other: &CorrectionCounts) {
        self.substitutions += other.substitutions;
        self.insertions_dropped += other.insertions_dropped;
        self.deletions_repaired += other.deletions_repaired;
    }
}

/// Corrects every read of a batch against the consensus vector.
///
/// Rows are partitioned round-robin as in the aggregator; each task fills its
/// own output slots, so no lock is taken. Output order mirrors input order.
pub fn correct_batch(
    reads: &[FastqRecord],
    msa: &[Vec<u8>],
    cv: &ConsensusVector,
    thresholds: &CorrectionThresholds,
    n_threads: usize,
) -> (Vec<FastqRecord>, CorrectionCounts) {
    debug_assert_eq!(reads.len(), msa.len());

    if n_threads <= 1 {
        let mut counts = CorrectionCounts::default();
        let corrected = reads
            .iter()
            .zip(msa)
            .map(|(read, row)| correct_read(read, row, cv, thresholds, &mut counts))
            .collect();
        return (corrected, counts);
    }

    let mut slots: Vec<Option<FastqRecord>> = reads.iter().map(|_| None).collect();
    let mut counts = CorrectionCounts::default();

    crossbeam::thread::scope(|scope| {
        let handles: Vec<_> = (0..n_threads)
            .map(|t| {
                scope.spawn(move |_| {
                    let mut part = Vec::new();
                    let mut local = CorrectionCounts::default();
                    for i in (t..reads.len()).step_by(n_threads) {
                        part.push((i, correct_read(&reads[i], &msa[i], cv, thresholds, &mut local)));
                    }
                    (part, local)
                })
            })
            .collect();

        for handle in handles {
            let (part, local) = handle.join().expect("corrector task panicked");
            counts.merge(&local);
            for (i, corrected) in part {
                slots[i] = Some(corrected);
            }
        }
    })
    .expect("corrector task panicked");

    let corrected = slots
        .into_iter()
        .map(|slot| slot.expect("corrector filled every slot"))
        .collect();
    (corrected, counts)
}

/// Column-wise decision table for one read. Gap emissions never reach the
/// output sequence, so corrected reads stay gap-free with one quality
/// character per base.
fn correct_read(
    read: &FastqRecord,
    row: &[u8],
    cv: &ConsensusVector,
    thresholds: &CorrectionThresholds,
    counts: &mut CorrectionCounts,
) -> FastqRecord {
    let quality = read.quality.as_bytes();
    let qlen = quality.len() as isize;
    let mut seq_pos: isize = -1;
    let mut out_seq = String::with_capacity(row.len());
    let mut out_qual = String::with_capacity(row.len());

    for (k, &nt) in row.iter().enumerate() {
        let mut err_p = 0.0;
        if nt != GAP {
            seq_pos += 1;
            if seq_pos < qlen {
                err_p = phred_err(quality[seq_pos as usize]);
            }
        }

        if seq_pos >= 0 && seq_pos < qlen {
            let cnt = cv.symbols[k];
            let info = cv.columns[k].get(cnt);
            let occ_ratio = info.ratio();

            if cnt == GAP {
                if nt != GAP {
                    if occ_ratio >= thresholds.gap_occ {
                        // likely insertion; drop the base
                        counts.insertions_dropped += 1;
                    } else {
                        out_seq.push(nt as char);
                        out_qual.push(quality[seq_pos as usize] as char);
                    }
                }
            } else if nt == GAP {
                if occ_ratio >= thresholds.gap_occ {
                    // likely deletion; repair from the consensus
                    out_seq.push(cnt as char);
                    out_qual.push(phred_symbol(info.err) as char);
                    counts.deletions_repaired += 1;
                }
            } else if nt == cnt {
                out_seq.push(nt as char);
                out_qual.push(quality[seq_pos as usize] as char);
            } else if occ_ratio >= thresholds.min_occ && thresholds.err_ratio * err_p > info.err {
                // strict > keeps reads that formed the consensus uncorrected
                out_seq.push(cnt as char);
                out_qual.push(phred_symbol(info.err) as char);
                counts.substitutions += 1;
            } else {
                out_seq.push(nt as char);
                out_qual.push(quality[seq_pos as usize] as char);
            }

            if seq_pos == qlen - 1 {
                seq_pos += 1; // end of read
            }
        }
    }

    FastqRecord {
        header: read.header.clone(),
        sequence: out_seq,
        plus: read.plus.clone(),
        quality: out_qual,
    }
}
