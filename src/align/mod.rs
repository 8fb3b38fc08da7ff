//! 读段之间的 k-mer 比对：命中收集、命中聚类与局部重比对。

pub mod cluster;
pub mod hits;
pub mod sw;

pub use cluster::{cluster_kmer_hits, sort_hits, KmerAlignmentCluster};
pub use hits::{FmHitSource, KmerHit, KmerHitSource, MinimizerHitSource};
pub use sw::{banded_sw, banded_sw_with_buf, SwBuffer, SwParams, SwResult};
