use clap::Parser;
use preen::align::star::StarAligner;
use preen::cli::{Cli, Commands};
use preen::correct::{correct_clusters, CorrectParams, CorrectionThresholds};
use preen::io::clusters::read_clusters;
use preen::io::fastq::{read_fastq, FastqRecord, FastqWriter};
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::FmtSubscriber;

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Correct {
            input,
            clusters,
            output,
            min_occ,
            gap_occ,
            err_ratio,
            split,
            min_reads,
            threads,
            verbose,
        } => {
            let level = if verbose {
                tracing::Level::DEBUG
            } else {
                tracing::Level::INFO
            };
            let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
            tracing::subscriber::set_global_default(subscriber)
                .expect("Setting tracing default failed");

            rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build_global()
                .expect("Building rayon pool failed");

            let start = std::time::Instant::now();

            let reads = match read_fastq(Path::new(&input)) {
                Ok(reads) => reads,
                Err(e) => {
                    eprintln!("Error reading {}: {}", input, e);
                    std::process::exit(1);
                }
            };
            info!("Loaded {} reads from {}", reads.len(), input);

            let cluster_set = match read_clusters(Path::new(&clusters)) {
                Ok(cluster_set) => cluster_set,
                Err(e) => {
                    eprintln!("Error reading {}: {}", clusters, e);
                    std::process::exit(1);
                }
            };
            info!("Loaded {} clusters from {}", cluster_set.len(), clusters);

            let params = CorrectParams {
                thresholds: CorrectionThresholds {
                    min_occ,
                    gap_occ,
                    err_ratio,
                },
                split,
                min_reads,
                n_threads: threads,
            };
            let engine = StarAligner::default();

            let results = match correct_clusters(&cluster_set, &reads, &engine, &params) {
                Ok(results) => results,
                Err(e) => {
                    eprintln!("Error during correction: {}", e);
                    std::process::exit(1);
                }
            };

            for cluster in &results.unmerged {
                warn!(
                    "Cluster {} ({} reads) has {} split consensi; merging is unsupported, no consensus written",
                    cluster.cluster_id,
                    cluster.total_reads,
                    cluster.splits.len()
                );
            }

            let out_dir = Path::new(&output);
            if let Err(e) = std::fs::create_dir_all(out_dir) {
                eprintln!("Error creating {}: {}", output, e);
                std::process::exit(1);
            }

            let outputs = [
                ("corrected.fq", &results.corrected),
                ("uncorrected.fq", &results.uncorrected),
                ("consensi.fq", &results.consensus),
            ];
            for (name, records) in outputs {
                if let Err(e) = write_fastq(&out_dir.join(name), records) {
                    eprintln!("Error writing {}: {}", name, e);
                    std::process::exit(1);
                }
            }

            info!(
                "Corrected {} reads ({} uncorrected, {} consensi) in {:.2}s",
                results.corrected.len(),
                results.uncorrected.len(),
                results.consensus.len(),
                start.elapsed().as_secs_f32()
            );
        }
    }
}

fn write_fastq(path: &Path, records: &[FastqRecord]) -> std::io::Result<()> {
    let mut writer = FastqWriter::create(path)?;
    writer.write_all(records)?;
    writer.finish()
}
