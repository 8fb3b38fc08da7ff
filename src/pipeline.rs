//! 端到端组装流程：读入、建图、过滤、布局、共识、写出。
//!
//! 各阶段之间在 10/50/60/95 处询问进度回调，回调返回 false 时立即停止，
//! 不写出 contig 文件。

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::info;

use crate::assembly::{persist, AssemblyGraph};
use crate::config::AssemblerConfig;
use crate::error::{AssemblyError, Result};
use crate::io::fasta::FastaWriter;
use crate::io::reads::{self, ReadsFormat, Sequence, SequenceStore};

const FASTA_LINE_WIDTH: usize = 100;

/// 进度回调：返回 false 表示请求停止
pub trait ProgressNotifier {
    fn keep_running(&self, percent: u8) -> bool;
}

impl<F> ProgressNotifier for F
where
    F: Fn(u8) -> bool,
{
    fn keep_running(&self, percent: u8) -> bool {
        self(percent)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblySummary {
    pub reads: usize,
    pub total_bases: usize,
    pub vertices: usize,
    pub edges: usize,
    pub embedded: usize,
    pub paths: usize,
    pub contigs: usize,
    pub contig_bases: usize,
    pub contigs_file: PathBuf,
    pub corrected_reads_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed(AssemblySummary),
    /// 在给定的进度点被回调停止
    Cancelled { at: u8 },
}

/// `<prefix><suffix>`，前缀可以带目录
pub fn output_path(prefix: &Path, suffix: &str) -> PathBuf {
    let mut s: OsString = prefix.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

fn write_error(path: &Path, e: anyhow::Error) -> AssemblyError {
    AssemblyError::Io(std::io::Error::new(std::io::ErrorKind::Other, format!("{}: {:#}", path.display(), e)))
}

fn write_fasta<W: Write>(writer: W, seqs: &[Sequence]) -> anyhow::Result<W> {
    let mut out = FastaWriter::new(writer, FASTA_LINE_WIDTH);
    for s in seqs {
        out.write_record(&s.name, &s.seq)?;
    }
    out.into_inner()
}

/// 先写临时文件再改名，失败时不留下半截的输出
fn write_contigs(path: &Path, contigs: &[Sequence]) -> Result<()> {
    let tmp = output_path(path, ".tmp");
    let file = File::create(&tmp)?;
    let written = write_fasta(BufWriter::new(file), contigs)
        .and_then(|w| w.into_inner().map_err(|e| anyhow::Error::new(e.into_error())))
        .and_then(|f| f.sync_all().map_err(anyhow::Error::from));
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(write_error(path, e));
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn write_corrected_reads(path: &Path, reads: &[Sequence]) -> Result<()> {
    let gz = GzEncoder::new(BufWriter::new(File::create(path)?), Compression::default());
    let gz = write_fasta(gz, reads).map_err(|e| write_error(path, e))?;
    gz.finish()?.flush()?;
    Ok(())
}

pub struct Assembler {
    config: AssemblerConfig,
    notifier: Option<Box<dyn ProgressNotifier>>,
}

impl Assembler {
    pub fn new(config: AssemblerConfig) -> Self {
        Self { config, notifier: None }
    }

    pub fn with_progress(mut self, notifier: impl ProgressNotifier + 'static) -> Self {
        self.notifier = Some(Box::new(notifier));
        self
    }

    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    fn keep_running(&self, percent: u8) -> bool {
        match &self.notifier {
            Some(n) => n.keep_running(percent),
            None => true,
        }
    }

    /// 读入 `input` 中的 read 并组装，结果写到 `<output_prefix>.fa`
    pub fn run(&self, input: &Path, output_prefix: &Path) -> Result<Outcome> {
        self.config.validate()?;
        let format = match self.config.input_format.or_else(|| ReadsFormat::from_path(input)) {
            Some(f) => f,
            None => {
                return Err(AssemblyError::Input(format!(
                    "cannot infer the reads format of '{}'; set it explicitly",
                    input.display()
                )))
            }
        };
        let store = reads::load_reads(input, format, self.config.min_read_length)?;
        self.assemble(&store, output_prefix)
    }

    /// 组装已载入的 read；`store` 应已按长度降序排列
    pub fn assemble(&self, store: &SequenceStore, output_prefix: &Path) -> Result<Outcome> {
        self.config.validate()?;
        if store.is_empty() {
            return Err(AssemblyError::Input(format!(
                "no reads of at least {} bp to assemble",
                self.config.min_read_length
            )));
        }
        info!("Assembling {} sequences. Total basepairs: {}", store.len(), store.total_bases());
        if !self.keep_running(10) {
            return Ok(Outcome::Cancelled { at: 10 });
        }

        let mut graph = match &self.config.graph_file {
            Some(path) => persist::load(store, path)?,
            None => {
                info!("Building graph with strategy {}", self.config.graph_construction);
                self.config.graph_builder().build_assembly_graph(store)?
            }
        };
        info!(
            "Built assembly graph with {} vertices and {} edges. Embedded reads: {}",
            graph.num_vertices(),
            graph.num_edges(),
            graph.embedded_count()
        );
        if !self.keep_running(50) {
            return Ok(Outcome::Cancelled { at: 50 });
        }
        if self.config.graph_file.is_none() {
            let graph_path = output_path(output_prefix, ".graph.gz");
            persist::save(&graph, store, &graph_path)?;
        }

        graph.filter_edges_and_embedded(&self.config.filter);
        info!("Filtered graph. Vertices: {} Edges: {}", graph.num_vertices(), graph.num_edges());
        self.config.layout_builder().find_paths(&mut graph);
        info!("Layout complete with strategy {}. Paths: {}", self.config.layout, graph.paths().len());
        if !self.keep_running(60) {
            return Ok(Outcome::Cancelled { at: 60 });
        }

        let consensus = self.consensus(&graph, store)?;
        info!("Built consensus with strategy {}", self.config.consensus);
        if !self.keep_running(95) {
            return Ok(Outcome::Cancelled { at: 95 });
        }

        let contigs_file = output_path(output_prefix, ".fa");
        write_contigs(&contigs_file, &consensus.contigs)?;
        let corrected_reads_file = if consensus.corrected_reads.is_empty() {
            None
        } else {
            let path = output_path(output_prefix, "_correctedReads.fa.gz");
            write_corrected_reads(&path, &consensus.corrected_reads)?;
            Some(path)
        };

        let summary = AssemblySummary {
            reads: store.len(),
            total_bases: store.total_bases(),
            vertices: graph.num_vertices(),
            edges: graph.num_edges(),
            embedded: graph.embedded_count(),
            paths: graph.paths().len(),
            contigs: consensus.contigs.len(),
            contig_bases: consensus.contigs.iter().map(Sequence::len).sum(),
            contigs_file,
            corrected_reads_file,
        };
        info!(
            "Wrote {} contigs ({} bp) to {}",
            summary.contigs,
            summary.contig_bases,
            summary.contigs_file.display()
        );
        Ok(Outcome::Completed(summary))
    }

    /// 共识在 `threads` 个线程的池中运行
    fn consensus(&self, graph: &AssemblyGraph, store: &SequenceStore) -> Result<crate::assembly::ConsensusResult> {
        let builder = self.config.consensus_builder();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads)
            .thread_name(|i| format!("olc-consensus-{i}"))
            .build()
            .map_err(|e| AssemblyError::WorkerPool(e.to_string()))?;
        Ok(pool.install(|| builder.make_consensus(graph, store)))
    }
}
