//! Phred-weighted per-column statistics and the majority consensus vector.

use crate::correct::phred::phred_err;
use crate::io::fastq::FastqRecord;
use std::sync::Mutex;

const GAP: u8 = b'-';

/// Column symbols in majority tie-break order: the first strict maximum wins.
pub const SYMBOLS: [u8; 5] = *b"ACGT-";

fn symbol_index(symbol: u8) -> Option<usize> {
    SYMBOLS.iter().position(|&s| s == symbol)
}

/// Tallies for one symbol in one column.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymbolStat {
    /// Times this symbol was observed in the column.
    pub occ: u32,
    /// Accumulated error probability; mean after finalization.
    pub err: f64,
    /// Column total across all symbols (filled during finalization).
    pub total_occ: u32,
}

impl SymbolStat {
    /// Share of the column's observations held by this symbol; 0 for an
    /// untallied column.
    pub fn ratio(&self) -> f64 {
        if self.total_occ == 0 {
            0.0
        } else {
            self.occ as f64 / self.total_occ as f64
        }
    }
}

/// Per-symbol tallies for one alignment column, indexed in `SYMBOLS` order.
#[derive(Debug, Clone, Default)]
pub struct ColumnStats {
    stats: [SymbolStat; 5],
}

impl ColumnStats {
    fn record(&mut self, symbol: u8, err_p: f64) {
        if let Some(i) = symbol_index(symbol) {
            self.stats[i].occ += 1;
            self.stats[i].err += err_p;
        }
    }

    fn merge(&mut self, other: &ColumnStats) {
        for (into, from) in self.stats.iter_mut().zip(&other.stats) {
            into.occ += from.occ;
            into.err += from.err;
        }
    }

    /// Converts accumulated error into mean error and fills `total_occ` for
    /// every observed symbol.
    fn finalize(&mut self) {
        let total: u32 = self.stats.iter().map(|s| s.occ).sum();
        for stat in &mut self.stats {
            if stat.occ > 0 {
                stat.total_occ = total;
                stat.err /= stat.occ as f64;
            }
        }
    }

    /// Symbol with the strictly greatest occurrence count, first in
    /// `SYMBOLS` order on ties. An untallied column reports a gap.
    fn majority(&self) -> u8 {
        let mut max_occ = 0;
        let mut max_symbol = GAP;
        for (i, stat) in self.stats.iter().enumerate() {
            if stat.occ > max_occ {
                max_occ = stat.occ;
                max_symbol = SYMBOLS[i];
            }
        }
        max_symbol
    }

    pub fn get(&self, symbol: u8) -> &SymbolStat {
        &self.stats[symbol_index(symbol).expect("column symbol")]
    }
}

/// Majority symbol and full tallies for every alignment column.
#[derive(Debug, Clone)]
pub struct ConsensusVector {
    pub symbols: Vec<u8>,
    pub columns: Vec<ColumnStats>,
}

impl ConsensusVector {
    pub fn width(&self) -> usize {
        self.symbols.len()
    }
}

/// Reduces a batch's MSA into a consensus vector.
///
/// Rows are partitioned round-robin over `n_threads` tasks; each task tallies
/// into a private column array and the partials are merged under one coarse
/// lock. Expects a shape-validated MSA (`msa.len() == reads.len()`, uniform
/// width).
pub fn consensus_vector(
    reads: &[FastqRecord],
    msa: &[Vec<u8>],
    n_threads: usize,
) -> ConsensusVector {
    debug_assert_eq!(reads.len(), msa.len());
    let width = msa.first().map_or(0, |row| row.len());

    let mut columns = if n_threads <= 1 {
        let mut cols = vec![ColumnStats::default(); width];
        for (read, row) in reads.iter().zip(msa) {
            tally_row(row, read.quality.as_bytes(), &mut cols);
        }
        cols
    } else {
        let shared = Mutex::new(vec![ColumnStats::default(); width]);
        crossbeam::thread::scope(|scope| {
            for t in 0..n_threads {
                let shared = &shared;
                scope.spawn(move |_| {
                    let mut local = vec![ColumnStats::default(); width];
                    for i in (t..reads.len()).step_by(n_threads) {
                        tally_row(&msa[i], reads[i].quality.as_bytes(), &mut local);
                    }

                    let mut merged = shared.lock().expect("tally lock poisoned");
                    for (into, from) in merged.iter_mut().zip(&local) {
                        into.merge(from);
                    }
                });
            }
        })
        .expect("consensus tally task panicked");
        shared.into_inner().expect("tally lock poisoned")
    };

    let symbols = columns
        .iter_mut()
        .map(|column| {
            column.finalize();
            column.majority()
        })
        .collect();

    ConsensusVector { symbols, columns }
}

/// Walks one aligned row, accumulating occurrence and error tallies for the
/// columns inside the read's span. `seq_pos` tracks the quality character of
/// the current base; columns before the first base or after the last one are
/// not tallied.
fn tally_row(row: &[u8], quality: &[u8], columns: &mut [ColumnStats]) {
    let qlen = quality.len() as isize;
    let mut seq_pos: isize = -1;

    for (k, &symbol) in row.iter().enumerate() {
        let mut err_p = 0.0;
        if symbol != GAP {
            seq_pos += 1;
            if seq_pos < qlen {
                err_p = phred_err(quality[seq_pos as usize]);
            }
        }

        if seq_pos >= 0 && seq_pos < qlen {
            columns[k].record(symbol, err_p);
            if seq_pos == qlen - 1 {
                seq_pos += 1; // end of read; trailing gap columns are not tallied
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(quality: &str) -> FastqRecord {
        FastqRecord {
            header: "@read".into(),
            sequence: "N".repeat(quality.len()),
            plus: "+".into(),
            quality: quality.into(),
        }
    }

    fn rows(rows: &[&str]) -> Vec<Vec<u8>> {
        rows.iter().map(|r| r.as_bytes().to_vec()).collect()
    }

    #[test]
    fn test_majority_tie_breaks_in_symbol_order() {
        let mut column = ColumnStats::default();
        for _ in 0..3 {
            column.record(b'A', 0.0);
        }
        for _ in 0..5 {
            column.record(b'C', 0.0);
        }
        for _ in 0..5 {
            column.record(b'G', 0.0);
        }
        column.finalize();
        assert_eq!(column.majority(), b'C');
    }

    #[test]
    fn test_counts_and_mean_error() {
        let msa = rows(&["ACGT", "ACGT", "AGGT"]);
        let reads = vec![record("IIII"), record("IIII"), record("++++")];
        let cv = consensus_vector(&reads, &msa, 1);

        assert_eq!(cv.symbols, b"ACGT".to_vec());

        let a = cv.columns[0].get(b'A');
        assert_eq!(a.occ, 3);
        assert_eq!(a.total_occ, 3);

        let c = cv.columns[1].get(b'C');
        assert_eq!(c.occ, 2);
        assert_eq!(c.total_occ, 3);
        assert!((c.err - 1e-4).abs() < 1e-9);

        let g = cv.columns[1].get(b'G');
        assert_eq!(g.occ, 1);
        assert!((g.err - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_gaps_inside_span_count_toward_gap_symbol() {
        let msa = rows(&["A-GT", "ACGT", "ACGT"]);
        let reads = vec![record("III"), record("IIII"), record("IIII")];
        let cv = consensus_vector(&reads, &msa, 1);

        let gap = cv.columns[1].get(b'-');
        assert_eq!(gap.occ, 1);
        assert_eq!(gap.total_occ, 3);
        assert_eq!(cv.symbols[1], b'C');
    }

    #[test]
    fn test_columns_outside_read_span_not_tallied() {
        // row 0 starts late and ends early; its terminal gap runs are not its span
        let msa = rows(&["--GT--", "ACGTAC", "ACGTAC"]);
        let reads = vec![record("GT"), record("IIIIII"), record("IIIIII")];
        let cv = consensus_vector(&reads, &msa, 1);

        assert_eq!(cv.columns[0].get(b'A').total_occ, 2);
        assert_eq!(cv.columns[5].get(b'C').total_occ, 2);
        assert_eq!(cv.columns[2].get(b'G').total_occ, 3);
    }

    #[test]
    fn test_parallel_matches_serial() {
        let msa = rows(&["ACGT", "AC-T", "GCGT", "ACGA", "ACGT"]);
        let reads = vec![
            record("IIII"),
            record("III"),
            record("KIII"),
            record("II+I"),
            record("IIII"),
        ];

        let serial = consensus_vector(&reads, &msa, 1);
        let parallel = consensus_vector(&reads, &msa, 3);

        assert_eq!(serial.symbols, parallel.symbols);
        for (s, p) in serial.columns.iter().zip(&parallel.columns) {
            for &symbol in SYMBOLS.iter() {
                assert_eq!(s.get(symbol).occ, p.get(symbol).occ);
                assert_eq!(s.get(symbol).total_occ, p.get(symbol).total_occ);
                assert!((s.get(symbol).err - p.get(symbol).err).abs() < 1e-12);
            }
        }
    }
}
