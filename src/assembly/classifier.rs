//! 根据 k-mer 命中簇判断两条 read 之间是重叠、包含还是噪声。
//!
//! 分类器只产出 [`GraphUpdate`]，不直接修改图。

use std::collections::BTreeMap;

use tracing::debug;

use crate::align::{
    banded_sw_with_buf, cluster_kmer_hits, sort_hits, KmerAlignmentCluster, KmerHit, SwBuffer, SwParams,
};
use crate::assembly::graph::{AssemblyEdge, AssemblyEmbedded, AssemblyVertex};
use crate::io::reads::SequenceStore;
use crate::util::stats::mean_and_sd;

const MIN_OVERLAP_BAND: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifierParams {
    /// 最佳簇至少需要的不同 k-mer 数
    pub min_shared_kmers: usize,
    /// 判断包含关系时允许越过目标边界的碱基数
    pub boundary_tolerance: usize,
    /// 重叠端没有 k-mer 命中时，要求的覆盖度占重叠长度的比例
    pub min_end_coverage: f64,
}

impl Default for ClassifierParams {
    fn default() -> Self {
        Self { min_shared_kmers: 5, boundary_tolerance: 0, min_end_coverage: 0.5 }
    }
}

/// 发往聚合线程的图更新
#[derive(Debug, Clone, PartialEq)]
pub enum GraphUpdate {
    Edge(AssemblyEdge),
    Embedded(AssemblyEmbedded),
}

/// 当前正在处理的查询：read id、按当前方向取出的序列，以及是否为反向互补
#[derive(Debug, Clone, Copy)]
pub struct Query<'a> {
    pub idx: usize,
    pub seq: &'a [u8],
    pub reverse: bool,
}

impl Query<'_> {
    /// 查询方向上的左端对应的顶点
    fn left_vertex(&self) -> AssemblyVertex {
        AssemblyVertex::new(self.idx, !self.reverse)
    }

    fn right_vertex(&self) -> AssemblyVertex {
        AssemblyVertex::new(self.idx, self.reverse)
    }
}

pub struct Classifier<'a> {
    store: &'a SequenceStore,
    kmer_len: usize,
    params: ClassifierParams,
}

impl<'a> Classifier<'a> {
    pub fn new(store: &'a SequenceStore, kmer_len: usize, params: ClassifierParams) -> Self {
        Self { store, kmer_len, params }
    }

    /// 对一条查询（某一方向）的全部命中逐个目标分类
    pub fn classify(&self, query: Query<'_>, hits: BTreeMap<usize, Vec<KmerHit>>) -> Vec<GraphUpdate> {
        let mut updates = Vec::new();
        for (target, mut target_hits) in hits {
            if target == query.idx || target_hits.is_empty() {
                continue;
            }
            sort_hits(&mut target_hits);
            let clusters = cluster_kmer_hits(query.seq.len(), self.kmer_len, &target_hits);
            let Some(best) = best_cluster(&clusters) else {
                continue;
            };
            if let Some(update) = self.evaluate(query, best) {
                updates.push(update);
            }
        }
        updates
    }

    fn evaluate(&self, query: Query<'_>, cluster: &KmerAlignmentCluster) -> Option<GraphUpdate> {
        let target = cluster.target_idx();
        let distinct = cluster.num_different_kmers();
        let required = if cluster.is_repeated_number() {
            2 * self.params.min_shared_kmers
        } else {
            self.params.min_shared_kmers
        };
        if distinct < required {
            debug!("query {} target {}: {} shared k-mers below {}", query.idx, target, distinct, required);
            return None;
        }

        let qlen = query.seq.len() as i64;
        let tlen = self.store.get(target).len() as i64;
        let tol = self.params.boundary_tolerance as i64;
        let (first, last) = (cluster.first(), cluster.last());

        let query_in_target = first >= -tol && last <= tlen - 1 + tol;
        let target_in_query = first <= tol && last >= tlen - 1 - tol;

        if query_in_target {
            let host_start = first.max(0) as usize;
            let host_end = last.min(tlen - 1) as usize;
            debug!("query {} embedded in {} at {}-{}", query.idx, target, host_start, host_end);
            return Some(GraphUpdate::Embedded(AssemblyEmbedded {
                seq_idx: query.idx,
                host_idx: target,
                reverse: query.reverse,
                host_start,
                host_end,
                num_shared_kmers: distinct,
                weighted_coverage: cluster.weighted_coverage(),
            }));
        }
        if target_in_query {
            let start = (-first).clamp(0, qlen - 1);
            let end = (start + tlen - 1).min(qlen - 1);
            let (host_start, host_end) = if query.reverse { (qlen - 1 - end, qlen - 1 - start) } else { (start, end) };
            debug!("target {} embedded in {} at {}-{}", target, query.idx, host_start, host_end);
            return Some(GraphUpdate::Embedded(AssemblyEmbedded {
                seq_idx: target,
                host_idx: query.idx,
                reverse: query.reverse,
                host_start: host_start as usize,
                host_end: host_end as usize,
                num_shared_kmers: distinct,
                weighted_coverage: cluster.weighted_coverage(),
            }));
        }

        // first > 0：查询左端与目标右端重叠；否则查询右端与目标左端重叠
        let query_left_overlaps = first > 0;
        let end_present =
            if query_left_overlaps { cluster.is_first_aln_present() } else { cluster.is_last_aln_present() };
        let exact_overlap = if query_left_overlaps { tlen - first } else { last + 1 };
        let exact_overlap = exact_overlap.clamp(1, qlen.min(tlen)) as usize;

        let coverage = cluster.coverage();
        if !end_present && (coverage as f64) < self.params.min_end_coverage * exact_overlap as f64 {
            debug!(
                "query {} target {}: overlap end without k-mers, coverage {} of {}",
                query.idx, target, coverage, exact_overlap
            );
            return None;
        }

        let tseq = &self.store.get(target).seq;
        let (overlap, overlap_sd, mismatches) = if cluster.is_all_consistent() {
            let (qpart, tpart) = if query_left_overlaps {
                (&query.seq[..exact_overlap], &tseq[tseq.len() - exact_overlap..])
            } else {
                (&query.seq[query.seq.len() - exact_overlap..], &tseq[..exact_overlap])
            };
            let mismatches = qpart.iter().zip(tpart).filter(|(a, b)| a != b).count();
            (exact_overlap, 0.0, mismatches)
        } else {
            let estimates: Vec<f64> = cluster
                .hits()
                .iter()
                .map(|h| {
                    let (ts, qs) = (h.target_start as i64, h.query_start as i64);
                    let est = if query_left_overlaps { tlen - (ts - qs) } else { ts + qlen - qs };
                    est.clamp(1, qlen.min(tlen)) as f64
                })
                .collect();
            let (mean, sd) = mean_and_sd(&estimates);
            let overlap = (mean.round() as usize).clamp(1, query.seq.len().min(tseq.len()));
            let (qpart, tpart) = if query_left_overlaps {
                (&query.seq[..overlap], &tseq[tseq.len() - overlap..])
            } else {
                (&query.seq[query.seq.len() - overlap..], &tseq[..overlap])
            };
            let mismatches = overlap_edits(qpart, tpart, sd).unwrap_or_else(|| {
                let uncovered = overlap.saturating_sub(coverage.min(overlap));
                uncovered / self.kmer_len.max(1)
            });
            (overlap, sd, mismatches)
        };

        let target_vertex = AssemblyVertex::new(target, !query_left_overlaps);
        let query_vertex = if query_left_overlaps { query.left_vertex() } else { query.right_vertex() };
        let mut edge = AssemblyEdge::new(query_vertex, target_vertex, overlap);
        edge.mismatches = mismatches;
        edge.num_shared_kmers = distinct;
        edge.coverage_shared_kmers = coverage;
        edge.weighted_coverage_shared_kmers = cluster.weighted_coverage();
        edge.overlap_sd = overlap_sd;
        debug!("edge {}-{} overlap {} from query {} target {}", query_vertex.id, target_vertex.id, overlap, query.idx, target);
        Some(GraphUpdate::Edge(edge))
    }
}

/// 带状比对两段估计的重叠窗口，返回编辑数；两端双方都没对上的碱基也计入。
/// 比对得分不为正时返回 None。
fn overlap_edits(qpart: &[u8], tpart: &[u8], overlap_sd: f64) -> Option<usize> {
    let drift = qpart.len().abs_diff(tpart.len()) + (3.0 * overlap_sd).ceil() as usize;
    let params = SwParams { band_width: MIN_OVERLAP_BAND.max(drift + 8), ..SwParams::default() };
    let res = banded_sw_with_buf(qpart, tpart, params, &mut SwBuffer::new());
    if res.score <= 0 {
        return None;
    }
    let head = res.query_start.min(res.ref_start);
    let tail = (qpart.len() - res.query_end).min(tpart.len() - res.ref_end);
    Some(res.nm as usize + head + tail)
}

/// 不同 k-mer 最多的簇；并列时取靠前者
fn best_cluster(clusters: &[KmerAlignmentCluster]) -> Option<&KmerAlignmentCluster> {
    clusters.iter().fold(None, |best: Option<&KmerAlignmentCluster>, c| match best {
        Some(b) if b.num_different_kmers() >= c.num_different_kmers() => Some(b),
        _ => Some(c),
    })
}
