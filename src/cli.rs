use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "preen", version, about = "Cluster-aware error correction for long sequencing reads", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Correct clustered reads against their MSA consensus
    Correct {
        /// Input FASTQ(.gz) with all reads
        #[arg(short, long)]
        input: String,

        /// Cluster membership JSON produced by the clustering stage
        #[arg(short, long)]
        clusters: String,

        /// Output directory for corrected.fq, uncorrected.fq and consensi.fq
        #[arg(short, long)]
        output: String,

        /// Occurrence-ratio floor for substitution corrections
        #[arg(long, default_value_t = 0.3)]
        min_occ: f64,

        /// Occurrence-ratio floor for indel corrections
        #[arg(long, default_value_t = 0.3)]
        gap_occ: f64,

        /// Multiplier on a base's own error before a substitution is accepted
        #[arg(long, default_value_t = 30.0)]
        err_ratio: f64,

        /// Maximum reads per correction batch
        #[arg(long, default_value_t = 200)]
        split: usize,

        /// Skip correction for batches with at most this many reads
        #[arg(long, default_value_t = 5)]
        min_reads: usize,

        /// Number of worker threads
        #[arg(short, long, default_value_t = num_cpus::get())]
        threads: usize,

        /// Log per-batch progress
        #[arg(short, long)]
        verbose: bool,
    },
}
