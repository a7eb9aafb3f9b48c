//! Center-star MSA engine over `bio`'s pairwise aligner.
//!
//! Each new sequence is globally aligned against the current per-column
//! anchor (the majority base of every column); insertions open fresh gap
//! columns in every existing row, deletions become gaps in the new row. The
//! result is a progressive MSA that is deterministic for a fixed input order.

use crate::align::{AlignScoring, PoaEngine};
use bio::alignment::pairwise::Aligner;
use bio::alignment::AlignmentOperation;

const GAP: u8 = b'-';

pub struct StarAligner {
    scoring: AlignScoring,
}

impl StarAligner {
    pub fn new(scoring: AlignScoring) -> Self {
        Self { scoring }
    }
}

impl Default for StarAligner {
    fn default() -> Self {
        Self::new(AlignScoring::default())
    }
}

/// Growing MSA: equal-width rows, one per added sequence.
pub struct StarGraph {
    rows: Vec<Vec<u8>>,
}

pub struct StarAlignment {
    operations: Vec<AlignmentOperation>,
}

impl PoaEngine for StarAligner {
    type Graph = StarGraph;
    type Alignment = StarAlignment;

    fn create_graph(&self) -> StarGraph {
        StarGraph { rows: Vec::new() }
    }

    fn align(&self, sequence: &str, graph: &StarGraph) -> StarAlignment {
        if graph.rows.is_empty() {
            return StarAlignment { operations: Vec::new() };
        }

        let anchor = graph.anchor();
        let score = |a: u8, b: u8| {
            if a == b {
                self.scoring.match_score
            } else {
                self.scoring.mismatch
            }
        };
        let mut aligner = Aligner::with_capacity(
            sequence.len(),
            anchor.len(),
            self.scoring.gap_open,
            self.scoring.gap_extend,
            score,
        );
        let alignment = aligner.global(sequence.as_bytes(), &anchor);
        StarAlignment {
            operations: alignment.operations,
        }
    }

    fn add_alignment(&self, graph: &mut StarGraph, alignment: StarAlignment, sequence: &str) {
        if graph.rows.is_empty() {
            graph.rows.push(sequence.as_bytes().to_vec());
        } else {
            graph.merge(&alignment.operations, sequence.as_bytes());
        }
    }

    fn generate_msa(&self, graph: &StarGraph) -> Vec<String> {
        graph
            .rows
            .iter()
            .map(|row| String::from_utf8_lossy(row).into_owned())
            .collect()
    }

    fn generate_consensus(&self, graph: &StarGraph) -> String {
        let mut consensus = String::new();
        for k in 0..graph.width() {
            let mut counts = [0u32; 5];
            for row in &graph.rows {
                match row[k] {
                    b'A' => counts[0] += 1,
                    b'C' => counts[1] += 1,
                    b'G' => counts[2] += 1,
                    b'T' => counts[3] += 1,
                    GAP => counts[4] += 1,
                    _ => {}
                }
            }
            let mut best = 0;
            for (i, &c) in counts.iter().enumerate() {
                if c > counts[best] {
                    best = i;
                }
            }
            if best < 4 && counts[best] > 0 {
                consensus.push(b"ACGT"[best] as char);
            }
        }
        consensus
    }
}

impl StarGraph {
    fn width(&self) -> usize {
        self.rows.first().map_or(0, |row| row.len())
    }

    /// Per-column representative base: the most frequent non-gap symbol.
    /// Every column holds at least one base, so the anchor spans the full
    /// alignment width.
    fn anchor(&self) -> Vec<u8> {
        (0..self.width())
            .map(|k| {
                let mut counts = [0u32; 4];
                for row in &self.rows {
                    match row[k] {
                        b'A' => counts[0] += 1,
                        b'C' => counts[1] += 1,
                        b'G' => counts[2] += 1,
                        b'T' => counts[3] += 1,
                        _ => {}
                    }
                }
                let mut best = 0;
                for (i, &c) in counts.iter().enumerate() {
                    if c > counts[best] {
                        best = i;
                    }
                }
                if counts[best] > 0 {
                    b"ACGT"[best]
                } else {
                    b'N'
                }
            })
            .collect()
    }

    /// Folds an aligned sequence in: gaps in the new row where the anchor had
    /// bases the sequence lacks, fresh gap columns in every existing row
    /// where the sequence carries extra bases.
    fn merge(&mut self, operations: &[AlignmentOperation], sequence: &[u8]) {
        let width = self.width();
        let mut new_row = Vec::with_capacity(width);
        let mut inserts = vec![0usize; width + 1];
        let mut xi = 0;
        let mut yj = 0;

        for op in operations {
            match op {
                AlignmentOperation::Match | AlignmentOperation::Subst => {
                    new_row.push(sequence[xi]);
                    xi += 1;
                    yj += 1;
                }
                AlignmentOperation::Del => {
                    new_row.push(GAP);
                    yj += 1;
                }
                AlignmentOperation::Ins => {
                    new_row.push(sequence[xi]);
                    xi += 1;
                    inserts[yj] += 1;
                }
                AlignmentOperation::Xclip(n) => {
                    for _ in 0..*n {
                        new_row.push(sequence[xi]);
                        xi += 1;
                        inserts[yj] += 1;
                    }
                }
                AlignmentOperation::Yclip(n) => {
                    for _ in 0..*n {
                        new_row.push(GAP);
                        yj += 1;
                    }
                }
            }
        }

        if inserts.iter().any(|&n| n > 0) {
            for row in &mut self.rows {
                let mut expanded = Vec::with_capacity(new_row.len());
                for (j, &symbol) in row.iter().enumerate() {
                    expanded.resize(expanded.len() + inserts[j], GAP);
                    expanded.push(symbol);
                }
                expanded.resize(expanded.len() + inserts[width], GAP);
                *row = expanded;
            }
        }

        self.rows.push(new_row);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(engine: &StarAligner, sequences: &[&str]) -> StarGraph {
        let mut graph = engine.create_graph();
        for seq in sequences {
            let alignment = engine.align(seq, &graph);
            engine.add_alignment(&mut graph, alignment, seq);
        }
        graph
    }

    #[test]
    fn test_identical_sequences() {
        let engine = StarAligner::default();
        let graph = build(&engine, &["ACGTACGT", "ACGTACGT", "ACGTACGT"]);
        let msa = engine.generate_msa(&graph);
        assert_eq!(msa, vec!["ACGTACGT"; 3]);
        assert_eq!(engine.generate_consensus(&graph), "ACGTACGT");
    }

    #[test]
    fn test_deletion_opens_gap_in_new_row() {
        let engine = StarAligner::default();
        let graph = build(&engine, &["ACGTACGT", "ACGTACGT", "ACGACGT"]);
        let msa = engine.generate_msa(&graph);

        let width = msa[0].len();
        assert!(msa.iter().all(|row| row.len() == width));
        assert_eq!(msa[2].matches('-').count(), 1);
        assert_eq!(engine.generate_consensus(&graph), "ACGTACGT");
    }

    #[test]
    fn test_insertion_opens_column_in_old_rows() {
        let engine = StarAligner::default();
        let graph = build(&engine, &["ACGTACGT", "ACGTTACGT"]);
        let msa = engine.generate_msa(&graph);

        assert_eq!(msa[0].len(), 9);
        assert_eq!(msa[1].len(), 9);
        assert_eq!(msa[0].matches('-').count(), 1);
        assert_eq!(msa[1].matches('-').count(), 0);
    }

    #[test]
    fn test_rows_keep_input_order() {
        let engine = StarAligner::default();
        let graph = build(&engine, &["ACGTACGTAA", "ACGTACGTCC"]);
        let msa = engine.generate_msa(&graph);
        assert!(msa[0].ends_with("AA"));
        assert!(msa[1].ends_with("CC"));
    }
}
