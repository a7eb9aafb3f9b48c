//! Trims spurious aligned blocks from the ends of MSA rows.
//!
//! Long-read alignments often pin a handful of terminal bases far away from
//! the rest of the read, separated by a long gap run. Those stray blocks
//! drag the column consensus, so they are erased before aggregation: the
//! bases become gap columns and the matching quality characters are dropped,
//! keeping each read's sequence/quality lengths consistent.

use crate::io::fastq::FastqRecord;
use rayon::prelude::*;

const GAP: u8 = b'-';

/// A gap run of this length closes the current block.
const MAX_BLOCK_GAP_RUN: usize = 4;

/// Blocks shorter than this are candidates for removal.
const MIN_SOLID_BLOCK: usize = 10;

/// A candidate block is erased only when followed by at least this many gaps.
const MIN_TRAILING_GAPS: usize = 20;

/// Cleans both ends of every row in `msa`, dropping the quality characters
/// of erased bases. Rows are processed independently.
pub fn trim_msa_ends(reads: &mut [FastqRecord], msa: &mut [Vec<u8>]) {
    reads
        .par_iter_mut()
        .zip(msa.par_iter_mut())
        .for_each(|(read, row)| trim_row(row, &mut read.quality));
}

/// Two-state scan over one row: a forward pass, then a pass over the flipped
/// row so the far end is examined the same way. Flip parity is tracked so the
/// row always ends in its original orientation.
fn trim_row(row: &mut [u8], quality: &mut String) {
    let mut flips = 0;

    for _pass in 0..2 {
        let mut flipped = false;
        let mut pos = 0;

        while pos < row.len() {
            // skip the leading gap run
            while pos < row.len() && row[pos] == GAP {
                pos += 1;
            }

            // grow a block, tolerating embedded gap runs shorter than the cutoff
            let mut end = pos;
            let mut gaps = 0;
            let mut sz = 0;
            while gaps < MAX_BLOCK_GAP_RUN && end < row.len() {
                if row[end] == GAP {
                    gaps += 1;
                } else {
                    sz += 1;
                    gaps = 0;
                }
                end += 1;
            }

            if sz < MIN_SOLID_BLOCK {
                // measure the full gap run after the block
                while end < row.len() && row[end] == GAP {
                    end += 1;
                    gaps += 1;
                }

                if gaps >= MIN_TRAILING_GAPS {
                    row[pos..end].fill(GAP);
                    quality.drain(..sz.min(quality.len()));
                    pos = end;
                    continue;
                }
            }

            // terminal block is solid; flip to examine the other end
            flip(row, quality);
            flips += 1;
            flipped = true;
            break;
        }

        if !flipped {
            // the scan ran off the row's end; nothing left to examine
            break;
        }
    }

    if flips % 2 == 1 {
        flip(row, quality);
    }
}

fn flip(row: &mut [u8], quality: &mut String) {
    row.reverse();
    *quality = quality.chars().rev().collect();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(sequence: &str, quality: &str) -> FastqRecord {
        FastqRecord {
            header: "@read".into(),
            sequence: sequence.into(),
            plus: "+".into(),
            quality: quality.into(),
        }
    }

    fn run(rows: &[&str], quals: &[&str]) -> (Vec<FastqRecord>, Vec<Vec<u8>>) {
        let mut msa: Vec<Vec<u8>> = rows.iter().map(|r| r.as_bytes().to_vec()).collect();
        let mut reads: Vec<FastqRecord> = msa
            .iter()
            .zip(quals)
            .map(|(row, q)| {
                let seq: String = row.iter().filter(|&&b| b != GAP).map(|&b| b as char).collect();
                record(&seq, q)
            })
            .collect();
        trim_msa_ends(&mut reads, &mut msa);
        (reads, msa)
    }

    #[test]
    fn test_short_leading_block_erased() {
        // leading gaps, a 6-base block, a 25-gap run, then the rest of the read
        let row = format!("--{}{}{}", "ACGTAC", "-".repeat(25), "ACGTACGTACGT");
        let qual = "K".repeat(18);
        let (reads, msa) = run(&[&row], &[&qual]);

        let expect = format!("{}{}", "-".repeat(33), "ACGTACGTACGT");
        assert_eq!(msa[0], expect.as_bytes());
        assert_eq!(reads[0].quality.len(), 12);
    }

    #[test]
    fn test_short_trailing_block_erased() {
        // the same stray block at the far end, reached by the flipped pass
        let row = format!("{}{}{}--", "ACGTACGTACGT", "-".repeat(25), "ACGTAC");
        let qual: String = "ABCDEFGHIJKLMNOPQR".into();
        let (reads, msa) = run(&[&row], &[&qual]);

        let expect = format!("{}{}", "ACGTACGTACGT", "-".repeat(33));
        assert_eq!(msa[0], expect.as_bytes());
        // the last six quality characters go with the erased bases
        assert_eq!(reads[0].quality, "ABCDEFGHIJKL");
    }

    #[test]
    fn test_solid_row_untouched() {
        let row = "ACGTACGTACGTACGT";
        let qual = "K".repeat(16);
        let (reads, msa) = run(&[row], &[&qual]);
        assert_eq!(msa[0], row.as_bytes());
        assert_eq!(reads[0].quality, qual);
    }

    #[test]
    fn test_short_block_without_long_gap_kept() {
        // short terminal block but only a small gap run after it
        let row = format!("{}{}{}", "ACGTAC", "-".repeat(10), "ACGTACGTACGT");
        let qual = "K".repeat(18);
        let (reads, msa) = run(&[&row], &[&qual]);
        assert_eq!(msa[0], row.as_bytes());
        assert_eq!(reads[0].quality.len(), 18);
    }

    #[test]
    fn test_idempotent() {
        let row = format!("--{}{}{}", "ACGTAC", "-".repeat(25), "ACGTACGTACGT");
        let qual = "K".repeat(18);
        let (reads, msa) = run(&[&row], &[&qual]);

        let mut reads2 = reads.clone();
        let mut msa2 = msa.clone();
        trim_msa_ends(&mut reads2, &mut msa2);
        assert_eq!(msa2, msa);
        assert_eq!(reads2[0].quality, reads[0].quality);
    }

    #[test]
    fn test_all_gap_row() {
        let row = "-".repeat(30);
        let (reads, msa) = run(&[&row], &[""]);
        assert_eq!(msa[0], row.as_bytes());
        assert!(reads[0].quality.is_empty());
    }
}
