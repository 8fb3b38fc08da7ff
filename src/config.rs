//! 组装参数与策略选择。

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::assembly::{
    BuildParams, ClassifierParams, ConsensusBuilder, FilterParams, FmIndexGraphBuilder, GraphBuilder, GreedyMaxOverlap,
    KruskalPath, LayoutBuilder, MinimizerGraphBuilder, PolishParams, PolishingConsensus, SimpleConsensus,
};
use crate::error::{AssemblyError, Result};
use crate::index::kmers::MAX_KMER_LENGTH;
use crate::io::reads::ReadsFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GraphConstruction {
    FmIndex,
    #[default]
    Minimizers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LayoutAlgorithm {
    MaxOverlap,
    #[default]
    KruskalPath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsensusAlgorithm {
    #[default]
    Simple,
    Polishing,
}

/// 小写并去掉 `-`/`_` 后比较，接受 `FMIndex`、`fm-index`、`fm_index` 等写法
fn canonical(s: &str) -> String {
    s.chars().filter(|c| *c != '-' && *c != '_').flat_map(char::to_lowercase).collect()
}

impl FromStr for GraphConstruction {
    type Err = AssemblyError;

    fn from_str(s: &str) -> Result<Self> {
        match canonical(s).as_str() {
            "fmindex" => Ok(GraphConstruction::FmIndex),
            "minimizers" => Ok(GraphConstruction::Minimizers),
            _ => Err(AssemblyError::config(format!("unrecognized graph construction algorithm '{}'", s))),
        }
    }
}

impl fmt::Display for GraphConstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphConstruction::FmIndex => write!(f, "FMIndex"),
            GraphConstruction::Minimizers => write!(f, "Minimizers"),
        }
    }
}

impl FromStr for LayoutAlgorithm {
    type Err = AssemblyError;

    fn from_str(s: &str) -> Result<Self> {
        match canonical(s).as_str() {
            "maxoverlap" => Ok(LayoutAlgorithm::MaxOverlap),
            "kruskalpath" | "kruskal" => Ok(LayoutAlgorithm::KruskalPath),
            _ => Err(AssemblyError::config(format!("unrecognized layout algorithm '{}'", s))),
        }
    }
}

impl fmt::Display for LayoutAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutAlgorithm::MaxOverlap => write!(f, "MaxOverlap"),
            LayoutAlgorithm::KruskalPath => write!(f, "KruskalPath"),
        }
    }
}

impl FromStr for ConsensusAlgorithm {
    type Err = AssemblyError;

    fn from_str(s: &str) -> Result<Self> {
        match canonical(s).as_str() {
            "simple" => Ok(ConsensusAlgorithm::Simple),
            "polishing" => Ok(ConsensusAlgorithm::Polishing),
            _ => Err(AssemblyError::config(format!("unrecognized consensus algorithm '{}'", s))),
        }
    }
}

impl fmt::Display for ConsensusAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsensusAlgorithm::Simple => write!(f, "Simple"),
            ConsensusAlgorithm::Polishing => write!(f, "Polishing"),
        }
    }
}

/// 一次组装运行的全部参数
#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    pub kmer_length: usize,
    /// minimizer 窗口内的 k-mer 个数
    pub window_length: usize,
    pub min_read_length: usize,
    pub threads: usize,
    /// FM 索引策略下的 k-mer 采样间隔
    pub kmer_offset: usize,
    /// 出现次数超过该值的 k-mer 视为重复序列，不参与比对
    pub max_kmer_count: u32,
    pub graph_construction: GraphConstruction,
    pub layout: LayoutAlgorithm,
    pub consensus: ConsensusAlgorithm,
    pub classifier: ClassifierParams,
    pub filter: FilterParams,
    pub tolerance: usize,
    pub polish: PolishParams,
    /// 仅在 Polishing 共识下生效
    pub correct_reads: bool,
    pub timeout_per_read: Duration,
    /// 为 None 时按扩展名判断
    pub input_format: Option<ReadsFormat>,
    /// 给定时跳过建图，直接加载
    pub graph_file: Option<PathBuf>,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            kmer_length: 15,
            window_length: 10,
            min_read_length: 5000,
            threads: 1,
            kmer_offset: 5,
            max_kmer_count: 100,
            graph_construction: GraphConstruction::default(),
            layout: LayoutAlgorithm::default(),
            consensus: ConsensusAlgorithm::default(),
            classifier: ClassifierParams::default(),
            filter: FilterParams::default(),
            tolerance: 0,
            polish: PolishParams::default(),
            correct_reads: false,
            timeout_per_read: Duration::from_secs(2),
            input_format: None,
            graph_file: None,
        }
    }
}

impl AssemblerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.kmer_length == 0 {
            return Err(AssemblyError::config("k-mer length should be a positive number"));
        }
        if self.kmer_length > MAX_KMER_LENGTH {
            return Err(AssemblyError::config(format!(
                "k-mer length {} exceeds the maximum of {}",
                self.kmer_length, MAX_KMER_LENGTH
            )));
        }
        if self.window_length == 0 {
            return Err(AssemblyError::config("window length should be a positive number"));
        }
        if self.threads == 0 {
            return Err(AssemblyError::config("number of threads should be a positive number"));
        }
        if self.kmer_offset == 0 {
            return Err(AssemblyError::config("k-mer offset should be a positive number"));
        }
        if !(0.0..=1.0).contains(&self.filter.dominance_ratio) {
            return Err(AssemblyError::config("dominance ratio should be between 0 and 1"));
        }
        if !(0.0..=1.0).contains(&self.classifier.min_end_coverage) {
            return Err(AssemblyError::config("minimum end coverage should be between 0 and 1"));
        }
        if self.timeout_per_read.is_zero() {
            return Err(AssemblyError::config("per-read timeout should be positive"));
        }
        Ok(())
    }

    pub fn build_params(&self) -> BuildParams {
        BuildParams {
            kmer_len: self.kmer_length,
            threads: self.threads,
            max_kmer_count: self.max_kmer_count,
            classifier: self.classifier,
            timeout_per_read: self.timeout_per_read,
        }
    }

    pub fn graph_builder(&self) -> Box<dyn GraphBuilder> {
        match self.graph_construction {
            GraphConstruction::FmIndex => {
                Box::new(FmIndexGraphBuilder { params: self.build_params(), kmer_offset: self.kmer_offset })
            }
            GraphConstruction::Minimizers => {
                Box::new(MinimizerGraphBuilder { params: self.build_params(), window: self.window_length })
            }
        }
    }

    pub fn layout_builder(&self) -> Box<dyn LayoutBuilder> {
        match self.layout {
            LayoutAlgorithm::MaxOverlap => Box::new(GreedyMaxOverlap),
            LayoutAlgorithm::KruskalPath => Box::new(KruskalPath),
        }
    }

    pub fn consensus_builder(&self) -> Box<dyn ConsensusBuilder> {
        match self.consensus {
            ConsensusAlgorithm::Simple => Box::new(SimpleConsensus::new(self.tolerance)),
            ConsensusAlgorithm::Polishing => Box::new(PolishingConsensus {
                tolerance: self.tolerance,
                correct_reads: self.correct_reads,
                params: self.polish,
            }),
        }
    }
}
