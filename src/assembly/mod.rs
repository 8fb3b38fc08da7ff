//! 重叠-布局-共识的组装阶段：建图、过滤、布局、共识与图文件。

pub mod builder;
pub mod classifier;
pub mod consensus;
pub mod graph;
pub mod layout;
pub mod persist;

pub use builder::{BuildParams, FmIndexGraphBuilder, GraphBuilder, MinimizerGraphBuilder};
pub use classifier::{Classifier, ClassifierParams, GraphUpdate};
pub use consensus::{ConsensusBuilder, ConsensusResult, PolishParams, PolishingConsensus, SimpleConsensus};
pub use graph::{AssemblyEdge, AssemblyEmbedded, AssemblyGraph, AssemblyVertex, FilterParams};
pub use layout::{GreedyMaxOverlap, KruskalPath, LayoutBuilder};
