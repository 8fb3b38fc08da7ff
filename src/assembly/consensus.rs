//! 共识：沿布局路径拼接 read，得到 contig。
//!
//! 两种策略共用同一套路径遍历 [`path_placements`]：
//! - [`SimpleConsensus`] 直接按边上记录的重叠长度截断拼接；
//! - [`PolishingConsensus`] 在每个拼接点用带状 Smith-Waterman 重新定位接缝，
//!   并可输出被共识校正过的 read。

use std::borrow::Cow;

use rayon::prelude::*;
use tracing::{error, info, warn};

use crate::align::{banded_sw_with_buf, SwBuffer, SwParams};
use crate::assembly::graph::{AssemblyEdge, AssemblyGraph, AssemblyVertex};
use crate::error::{AssemblyError, Result};
use crate::io::reads::{Sequence, SequenceStore};
use crate::util::dna;

#[derive(Debug, Clone, Default)]
pub struct ConsensusResult {
    /// 名为 `Contig_<n>`，n 从 1 开始
    pub contigs: Vec<Sequence>,
    /// 仅打磨策略且开启校正时非空
    pub corrected_reads: Vec<Sequence>,
}

pub trait ConsensusBuilder: Send + Sync {
    fn make_consensus(&self, graph: &AssemblyGraph, store: &SequenceStore) -> ConsensusResult;
}

/// 路径上的一条 read 及其拼接方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Placement {
    read: usize,
    reverse: bool,
    /// 与前一条 read 的重叠；路径首条 read 为 0
    overlap: usize,
}

/// 从 `vertex` 进入 read：进入起点则正向使用
fn placement_entering(vertex: AssemblyVertex, overlap: usize) -> Placement {
    Placement { read: vertex.read, reverse: !vertex.is_start, overlap }
}

/// 遍历一条路径，给出 read 的拼接顺序与方向。
///
/// 第一条边的方向由它与第二条边共享的顶点决定；之后每条边都必须接在上一个
/// 访问的顶点上，否则该路径不一致。
fn path_placements(path_idx: usize, path: &[AssemblyEdge]) -> Result<Vec<Placement>> {
    let inconsistent = |message: String| AssemblyError::Consistency { path: path_idx, message };

    let first = match path.first() {
        Some(e) => e,
        None => return Ok(Vec::new()),
    };
    if path.len() == 1 {
        return Ok(vec![Placement { read: first.vertex1.read, reverse: false, overlap: 0 }]);
    }

    let shared = first
        .shared_vertex(&path[1])
        .ok_or_else(|| inconsistent("first edge shares no vertex with the second".to_string()))?;
    let previous = if first.vertex1.id == shared.id { first.vertex2 } else { first.vertex1 };

    let mut placements = Vec::with_capacity(path.len() / 2 + 1);
    if previous.read == shared.read {
        placements.push(placement_entering(previous, 0));
    } else {
        // 路径以重叠边开头：首条 read 从 `previous` 离开，第二条从共享顶点进入
        placements.push(Placement { read: previous.read, reverse: previous.is_start, overlap: 0 });
        placements.push(placement_entering(shared, first.overlap));
    }

    let mut last = shared;
    for e in &path[1..] {
        let next = e.other(last.id).ok_or_else(|| {
            inconsistent(format!(
                "edge {}-{} does not continue from vertex {}",
                e.vertex1.id, e.vertex2.id, last.id
            ))
        })?;
        if next.read != last.read {
            placements.push(placement_entering(next, e.overlap));
        }
        last = next;
    }
    Ok(placements)
}

fn oriented<'a>(store: &'a SequenceStore, p: &Placement) -> Cow<'a, [u8]> {
    let seq = &store.get(p.read).seq;
    if p.reverse {
        Cow::Owned(dna::revcomp(seq))
    } else {
        Cow::Borrowed(seq.as_slice())
    }
}

fn contig_name(n: usize) -> String {
    format!("Contig_{}", n)
}

/// 按边上记录的重叠长度拼接
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleConsensus {
    /// 剩余后缀不超过该长度时不再追加
    pub tolerance: usize,
}

impl SimpleConsensus {
    pub fn new(tolerance: usize) -> Self {
        Self { tolerance }
    }

    fn path_consensus(&self, path_idx: usize, path: &[AssemblyEdge], store: &SequenceStore) -> Result<Vec<u8>> {
        let placements = path_placements(path_idx, path)?;
        let mut consensus = Vec::new();
        for (i, p) in placements.iter().enumerate() {
            let seq = oriented(store, p);
            if i == 0 {
                consensus.extend_from_slice(&seq);
                continue;
            }
            if seq.len().saturating_sub(p.overlap) > self.tolerance {
                consensus.extend_from_slice(&seq[p.overlap..]);
            } else {
                warn!(
                    "Path {}: read {} of length {} adds nothing beyond overlap {}",
                    path_idx,
                    store.get(p.read).name,
                    seq.len(),
                    p.overlap
                );
            }
        }
        Ok(consensus)
    }
}

impl ConsensusBuilder for SimpleConsensus {
    fn make_consensus(&self, graph: &AssemblyGraph, store: &SequenceStore) -> ConsensusResult {
        let mut result = ConsensusResult::default();
        for (i, path) in graph.paths().iter().enumerate() {
            match self.path_consensus(i, path, store) {
                Ok(seq) if !seq.is_empty() => {
                    let name = contig_name(result.contigs.len() + 1);
                    result.contigs.push(Sequence { name, seq });
                }
                Ok(_) => {}
                Err(e) => error!("{}", e),
            }
        }
        info!("Built {} contigs from {} paths", result.contigs.len(), graph.paths().len());
        result
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolishParams {
    /// 在拼接点重新比对的共识末端长度
    pub window: usize,
    /// 参考区间在声明重叠之外额外延伸的碱基数
    pub slack: usize,
    /// 比对得分至少为完美得分的该比例才采用
    pub min_identity: f64,
    pub sw: SwParams,
}

impl Default for PolishParams {
    fn default() -> Self {
        Self { window: 200, slack: 32, min_identity: 0.8, sw: SwParams::default() }
    }
}

/// 带接缝打磨的拼接，可选输出校正后的 read；多条路径并行处理
#[derive(Debug, Clone, Copy, Default)]
pub struct PolishingConsensus {
    pub tolerance: usize,
    pub correct_reads: bool,
    pub params: PolishParams,
}

/// 一条 read 在共识上的覆盖区间 [start, end)
struct ReadSpan {
    read: usize,
    reverse: bool,
    start: usize,
    end: usize,
}

struct PolishedPath {
    consensus: Vec<u8>,
    spans: Vec<ReadSpan>,
}

impl PolishingConsensus {
    /// 下一条 read 在共识末端的接缝位置：返回 `seq` 中第一个未被共识覆盖的下标
    fn junction(&self, consensus: &[u8], seq: &[u8], declared: usize, buf: &mut SwBuffer) -> usize {
        let overlap = declared.min(seq.len()).min(consensus.len());
        let w = self.params.window.min(overlap);
        if w == 0 {
            return overlap;
        }
        let tail = &consensus[consensus.len() - w..];
        let ref_begin = overlap - w;
        let ref_end = (overlap + self.params.slack).min(seq.len());
        let aln = banded_sw_with_buf(tail, &seq[ref_begin..ref_end], self.params.sw, buf);

        let perfect = w as f64 * f64::from(self.params.sw.match_score);
        if f64::from(aln.score) < self.params.min_identity * perfect {
            return overlap;
        }
        // 共识末尾未参与比对的碱基沿对角线外推
        (ref_begin + aln.ref_end + (w - aln.query_end)).min(seq.len())
    }

    fn polish_path(&self, path_idx: usize, path: &[AssemblyEdge], store: &SequenceStore) -> Result<PolishedPath> {
        let placements = path_placements(path_idx, path)?;
        let mut buf = SwBuffer::new();
        let mut consensus: Vec<u8> = Vec::new();
        let mut spans = Vec::with_capacity(placements.len());
        for (i, p) in placements.iter().enumerate() {
            let seq = oriented(store, p);
            if i == 0 {
                consensus.extend_from_slice(&seq);
                spans.push(ReadSpan { read: p.read, reverse: p.reverse, start: 0, end: seq.len() });
                continue;
            }
            let cut = self.junction(&consensus, &seq, p.overlap, &mut buf);
            let start = consensus.len() - cut.min(consensus.len());
            if seq.len() - cut > self.tolerance {
                consensus.extend_from_slice(&seq[cut..]);
            } else {
                warn!(
                    "Path {}: read {} of length {} adds nothing beyond polished overlap {}",
                    path_idx,
                    store.get(p.read).name,
                    seq.len(),
                    cut
                );
            }
            let end = (start + seq.len()).min(consensus.len());
            spans.push(ReadSpan { read: p.read, reverse: p.reverse, start, end });
        }
        Ok(PolishedPath { consensus, spans })
    }
}

impl ConsensusBuilder for PolishingConsensus {
    fn make_consensus(&self, graph: &AssemblyGraph, store: &SequenceStore) -> ConsensusResult {
        let polished: Vec<Option<PolishedPath>> = graph
            .paths()
            .par_iter()
            .enumerate()
            .map(|(i, path)| match self.polish_path(i, path, store) {
                Ok(p) => Some(p),
                Err(e) => {
                    error!("{}", e);
                    None
                }
            })
            .collect();

        let mut result = ConsensusResult::default();
        for p in polished.into_iter().flatten() {
            if p.consensus.is_empty() {
                continue;
            }
            if self.correct_reads {
                for span in &p.spans {
                    let slice = &p.consensus[span.start..span.end];
                    let seq = if span.reverse { dna::revcomp(slice) } else { slice.to_vec() };
                    result.corrected_reads.push(Sequence { name: store.get(span.read).name.clone(), seq });
                }
            }
            let name = contig_name(result.contigs.len() + 1);
            result.contigs.push(Sequence { name, seq: p.consensus });
        }
        info!(
            "Built {} polished contigs from {} paths. Corrected reads: {}",
            result.contigs.len(),
            graph.paths().len(),
            result.corrected_reads.len()
        );
        result
    }
}
