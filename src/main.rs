use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use olc_rust::assembly::{persist, AssemblyGraph};
use olc_rust::config::{AssemblerConfig, ConsensusAlgorithm, GraphConstruction, LayoutAlgorithm};
use olc_rust::io::reads::{self, ReadsFormat};
use olc_rust::pipeline::{Assembler, Outcome};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(
    name = "olc-rust",
    author,
    version,
    about = "Overlap-layout-consensus de novo assembler for long reads",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Assemble reads into contigs (<prefix>.fa)
    Assemble {
        /// Reads in FASTA or FASTQ, optionally gzip compressed
        reads: PathBuf,
        /// Prefix of the output files
        #[arg(short, long, default_value = "assembly")]
        output: PathBuf,
        /// Reads format (fasta|fastq); guessed from the extension if omitted
        #[arg(long)]
        format: Option<ReadsFormat>,
        #[arg(short = 'k', long = "kmer-length", default_value_t = 15)]
        kmer_length: usize,
        /// K-mers per minimizer window
        #[arg(short = 'w', long = "window-length", default_value_t = 10)]
        window_length: usize,
        #[arg(short = 'm', long = "min-read-length", default_value_t = 5000)]
        min_read_length: usize,
        #[arg(short = 't', long = "threads", default_value_t = 1)]
        threads: usize,
        /// Graph construction algorithm (FMIndex|Minimizers)
        #[arg(long = "graph-construction", default_value_t = GraphConstruction::Minimizers)]
        graph_construction: GraphConstruction,
        /// Layout algorithm (MaxOverlap|KruskalPath)
        #[arg(long = "layout", default_value_t = LayoutAlgorithm::KruskalPath)]
        layout: LayoutAlgorithm,
        /// Consensus algorithm (Simple|Polishing)
        #[arg(long = "consensus", default_value_t = ConsensusAlgorithm::Simple)]
        consensus: ConsensusAlgorithm,
        /// Sampling step of k-mers for the FMIndex construction
        #[arg(long = "kmer-offset", default_value_t = 5)]
        kmer_offset: usize,
        /// K-mers seen more often are treated as repeats
        #[arg(long = "max-kmer-count", default_value_t = 100)]
        max_kmer_count: u32,
        #[arg(long = "min-shared-kmers", default_value_t = 5)]
        min_shared_kmers: usize,
        /// Load this graph instead of building one
        #[arg(long = "graph")]
        graph: Option<PathBuf>,
        /// Write <prefix>_correctedReads.fa.gz (Polishing consensus only)
        #[arg(long = "correct-reads")]
        correct_reads: bool,
        /// Seconds allowed per read during graph construction
        #[arg(long = "timeout-per-read", default_value_t = 2)]
        timeout_per_read: u64,
    },
    /// Summarize a saved graph: counts and vertex degree distribution
    Stats {
        /// Graph file (<prefix>.graph.gz)
        graph: PathBuf,
        /// Reads the graph was built from; without them only the read list is shown
        #[arg(short, long)]
        reads: Option<PathBuf>,
        #[arg(long)]
        format: Option<ReadsFormat>,
        /// Same length filter the graph was built with
        #[arg(short = 'm', long = "min-read-length", default_value_t = 5000)]
        min_read_length: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Assemble {
            reads,
            output,
            format,
            kmer_length,
            window_length,
            min_read_length,
            threads,
            graph_construction,
            layout,
            consensus,
            kmer_offset,
            max_kmer_count,
            min_shared_kmers,
            graph,
            correct_reads,
            timeout_per_read,
        } => {
            let mut config = AssemblerConfig {
                kmer_length,
                window_length,
                min_read_length,
                threads,
                kmer_offset,
                max_kmer_count,
                graph_construction,
                layout,
                consensus,
                correct_reads,
                timeout_per_read: Duration::from_secs(timeout_per_read),
                input_format: format,
                graph_file: graph,
                ..AssemblerConfig::default()
            };
            config.classifier.min_shared_kmers = min_shared_kmers;
            config.filter.min_shared_kmers = min_shared_kmers;
            run_assemble(config, &reads, &output)
        }
        Commands::Stats { graph, reads, format, min_read_length } => {
            run_stats(&graph, reads.as_deref(), format, min_read_length)
        }
    }
}

fn run_assemble(config: AssemblerConfig, reads: &std::path::Path, output: &std::path::Path) -> Result<()> {
    let outcome = Assembler::new(config)
        .run(reads, output)
        .with_context(|| format!("assembly of '{}' failed", reads.display()))?;
    match outcome {
        Outcome::Completed(summary) => {
            println!("reads: {}", summary.reads);
            println!("total_bp: {}", summary.total_bases);
            println!("embedded: {}", summary.embedded);
            println!("paths: {}", summary.paths);
            println!("contigs: {}", summary.contigs);
            println!("contig_bp: {}", summary.contig_bases);
            println!("output: {}", summary.contigs_file.display());
            if let Some(path) = summary.corrected_reads_file {
                println!("corrected_reads: {}", path.display());
            }
        }
        Outcome::Cancelled { at } => info!("Assembly stopped at {}%", at),
    }
    Ok(())
}

fn run_stats(
    graph_path: &std::path::Path,
    reads_path: Option<&std::path::Path>,
    format: Option<ReadsFormat>,
    min_read_length: usize,
) -> Result<()> {
    let names = persist::load_sequence_names(graph_path)
        .with_context(|| format!("cannot read graph file '{}'", graph_path.display()))?;
    println!("graph: {}", graph_path.display());
    println!("sequences: {}", names.len());
    println!("total_bp: {}", names.iter().map(|(_, len)| len).sum::<usize>());

    let reads_path = match reads_path {
        Some(p) => p,
        None => return Ok(()),
    };
    let graph = load_graph_with_reads(graph_path, reads_path, format, min_read_length)?;
    println!("vertices: {}", graph.num_vertices());
    println!("edges: {}", graph.num_edges());
    println!("embedded: {}", graph.embedded_count());
    println!("degree distribution:");
    let mut out = std::io::stdout().lock();
    graph.degree_distribution().write_int(&mut out)?;
    Ok(())
}

/// 按建图时的长度过滤加载 read，再把图文件解析到这些 read 上
fn load_graph_with_reads(
    graph_path: &std::path::Path,
    reads_path: &std::path::Path,
    format: Option<ReadsFormat>,
    min_read_length: usize,
) -> Result<AssemblyGraph> {
    let format = format
        .or_else(|| ReadsFormat::from_path(reads_path))
        .with_context(|| format!("cannot infer the reads format of '{}'", reads_path.display()))?;
    let store = reads::load_reads(reads_path, format, min_read_length)?;
    Ok(persist::load(&store, graph_path)?)
}
