//! 组装图：read 端点为顶点，重叠为边，另外记录包含关系与布局路径。

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::io::reads::SequenceStore;
use crate::util::stats::Distribution;

/// read 端点的顶点 id：起点为 2*read，终点为 2*read+1。
#[inline]
pub fn vertex_id(read: usize, is_start: bool) -> usize {
    2 * read + usize::from(!is_start)
}

/// 无序顶点对的规范化键
#[inline]
pub fn edge_key(v1: usize, v2: usize) -> (usize, usize) {
    if v1 <= v2 { (v1, v2) } else { (v2, v1) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssemblyVertex {
    pub read: usize,
    pub is_start: bool,
    pub id: usize,
}

impl AssemblyVertex {
    pub fn new(read: usize, is_start: bool) -> Self {
        Self { read, is_start, id: vertex_id(read, is_start) }
    }

    /// 同一条 read 的另一端
    pub fn mate_id(&self) -> usize {
        vertex_id(self.read, !self.is_start)
    }
}

/// 两个顶点之间的无向边。
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyEdge {
    pub vertex1: AssemblyVertex,
    pub vertex2: AssemblyVertex,
    pub overlap: usize,
    /// 越小越好；同序列边上无意义
    pub cost: usize,
    pub mismatches: usize,
    pub num_shared_kmers: usize,
    pub coverage_shared_kmers: usize,
    pub weighted_coverage_shared_kmers: f64,
    pub overlap_sd: f64,
    /// 合并进这条边的独立观测次数
    pub evidence: u32,
    pub layout_edge: bool,
}

impl AssemblyEdge {
    pub fn new(vertex1: AssemblyVertex, vertex2: AssemblyVertex, overlap: usize) -> Self {
        Self {
            vertex1,
            vertex2,
            overlap,
            cost: 0,
            mismatches: 0,
            num_shared_kmers: 0,
            coverage_shared_kmers: 0,
            weighted_coverage_shared_kmers: 0.0,
            overlap_sd: 0.0,
            evidence: 1,
            layout_edge: false,
        }
    }

    pub fn key(&self) -> (usize, usize) {
        edge_key(self.vertex1.id, self.vertex2.id)
    }

    pub fn is_same_sequence_edge(&self) -> bool {
        self.vertex1.read == self.vertex2.read
    }

    pub fn connects(&self, vertex: usize) -> bool {
        self.vertex1.id == vertex || self.vertex2.id == vertex
    }

    /// `vertex` 在边上的另一端
    pub fn other(&self, vertex: usize) -> Option<AssemblyVertex> {
        if self.vertex1.id == vertex {
            Some(self.vertex2)
        } else if self.vertex2.id == vertex {
            Some(self.vertex1)
        } else {
            None
        }
    }

    /// 与另一条边共享的顶点
    pub fn shared_vertex(&self, other: &AssemblyEdge) -> Option<AssemblyVertex> {
        [self.vertex1, self.vertex2].into_iter().find(|v| other.connects(v.id))
    }

    /// 合并另一次观测：证据取并集，重叠长度取合并后的均值与标准差。
    fn merge(&mut self, other: &AssemblyEdge) {
        let n1 = f64::from(self.evidence.max(1));
        let n2 = f64::from(other.evidence.max(1));
        let (m1, m2) = (self.overlap as f64, other.overlap as f64);
        let total = n1 + n2;
        let mean = (n1 * m1 + n2 * m2) / total;
        let second_moment = (n1 * (self.overlap_sd.powi(2) + m1 * m1) + n2 * (other.overlap_sd.powi(2) + m2 * m2)) / total;

        self.overlap = mean.round() as usize;
        self.overlap_sd = (second_moment - mean * mean).max(0.0).sqrt();
        self.num_shared_kmers = self.num_shared_kmers.max(other.num_shared_kmers);
        self.coverage_shared_kmers = self.coverage_shared_kmers.max(other.coverage_shared_kmers);
        self.weighted_coverage_shared_kmers =
            self.weighted_coverage_shared_kmers.max(other.weighted_coverage_shared_kmers);
        self.mismatches = self.mismatches.min(other.mismatches);
        self.evidence = self.evidence.saturating_add(other.evidence);
    }
}

/// `contained` 整体落在 `host` 内部；坐标为 host 上的 [host_start, host_end]。
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyEmbedded {
    pub seq_idx: usize,
    pub host_idx: usize,
    /// 包含的 read 与 host 方向相反
    pub reverse: bool,
    pub host_start: usize,
    pub host_end: usize,
    pub num_shared_kmers: usize,
    pub weighted_coverage: f64,
}

/// 过滤阈值，见 [`AssemblyGraph::filter_edges_and_embedded`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterParams {
    pub min_shared_kmers: usize,
    pub dominance_ratio: f64,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self { min_shared_kmers: 5, dominance_ratio: 0.5 }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AssemblyGraph {
    read_lengths: Vec<usize>,
    /// 按顶点 id 索引；被剪除的 read 对应 None
    vertices: Vec<Option<AssemblyVertex>>,
    edges: BTreeMap<(usize, usize), AssemblyEdge>,
    adjacency: Vec<BTreeSet<usize>>,
    embedded_by_seq: BTreeMap<usize, Vec<AssemblyEmbedded>>,
    embedded_by_host: BTreeMap<usize, Vec<AssemblyEmbedded>>,
    paths: Vec<Vec<AssemblyEdge>>,
}

impl AssemblyGraph {
    /// 每条 read 两个顶点加一条同序列边
    pub fn new(store: &SequenceStore) -> Self {
        Self::from_read_lengths(store.iter().map(|s| s.len()).collect())
    }

    pub fn from_read_lengths(read_lengths: Vec<usize>) -> Self {
        let n = read_lengths.len();
        let mut graph = Self {
            read_lengths,
            vertices: Vec::with_capacity(2 * n),
            edges: BTreeMap::new(),
            adjacency: vec![BTreeSet::new(); 2 * n],
            ..Default::default()
        };
        for read in 0..n {
            let start = AssemblyVertex::new(read, true);
            let end = AssemblyVertex::new(read, false);
            graph.vertices.push(Some(start));
            graph.vertices.push(Some(end));
            let len = graph.read_lengths[read];
            let mut edge = AssemblyEdge::new(start, end, len);
            edge.coverage_shared_kmers = len;
            edge.weighted_coverage_shared_kmers = len as f64;
            graph.insert_edge(edge);
        }
        graph
    }

    pub fn num_sequences(&self) -> usize {
        self.read_lengths.len()
    }

    pub fn read_length(&self, read: usize) -> usize {
        self.read_lengths[read]
    }

    pub fn vertex(&self, id: usize) -> Option<&AssemblyVertex> {
        self.vertices.get(id)?.as_ref()
    }

    pub fn vertex_of(&self, read: usize, is_start: bool) -> Option<&AssemblyVertex> {
        self.vertex(vertex_id(read, is_start))
    }

    pub fn vertices(&self) -> impl Iterator<Item = &AssemblyVertex> + '_ {
        self.vertices.iter().flatten()
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices().count()
    }

    pub fn edge(&self, v1: usize, v2: usize) -> Option<&AssemblyEdge> {
        self.edges.get(&edge_key(v1, v2))
    }

    pub fn same_sequence_edge(&self, read: usize) -> Option<&AssemblyEdge> {
        self.edge(vertex_id(read, true), vertex_id(read, false))
    }

    /// 按顶点对升序遍历全部边
    pub fn edges(&self) -> impl Iterator<Item = &AssemblyEdge> + '_ {
        self.edges.values()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn edges_of(&self, vertex: usize) -> impl Iterator<Item = &AssemblyEdge> + '_ {
        self.adjacency
            .get(vertex)
            .into_iter()
            .flatten()
            .filter_map(move |&n| self.edges.get(&edge_key(vertex, n)))
    }

    /// 顶点的度（包含同序列边）
    pub fn degree(&self, vertex: usize) -> usize {
        self.adjacency.get(vertex).map_or(0, BTreeSet::len)
    }

    pub fn degree_distribution(&self) -> Distribution {
        let mut dist = Distribution::new(0.0, 100.0, 1.0);
        for v in self.vertices() {
            dist.process(self.degree(v.id) as f64);
        }
        dist
    }

    fn insert_edge(&mut self, edge: AssemblyEdge) {
        let (a, b) = edge.key();
        self.adjacency[a].insert(b);
        self.adjacency[b].insert(a);
        self.edges.insert((a, b), edge);
    }

    fn remove_edge(&mut self, key: (usize, usize)) -> Option<AssemblyEdge> {
        let edge = self.edges.remove(&key)?;
        self.adjacency[key.0].remove(&key.1);
        self.adjacency[key.1].remove(&key.0);
        Some(edge)
    }

    /// 按无序顶点对插入或合并一条重叠边；返回是否被接受。
    /// 开销按 `len1 + len2 - coverage_shared_kmers` 重新计算。
    pub fn add_edge(&mut self, edge: AssemblyEdge) -> bool {
        let (a, b) = edge.key();
        if a == b || edge.is_same_sequence_edge() {
            warn!("rejected edge between {} and {}: both ends belong to read {}", a, b, edge.vertex1.read);
            return false;
        }
        if self.vertex(a).is_none() || self.vertex(b).is_none() {
            debug!("ignored edge {}-{}: vertex not present", a, b);
            return false;
        }
        let len_sum = self.read_lengths[edge.vertex1.read] + self.read_lengths[edge.vertex2.read];
        match self.edges.get_mut(&(a, b)) {
            Some(existing) => {
                existing.merge(&edge);
                existing.cost = len_sum.saturating_sub(existing.coverage_shared_kmers);
            }
            None => {
                let mut edge = edge;
                edge.cost = len_sum.saturating_sub(edge.coverage_shared_kmers);
                self.insert_edge(edge);
            }
        }
        true
    }

    /// 记录一次包含关系；返回是否被接受。
    /// 等长的两条 read 之间只允许后者包含于前者，避免相同 read 互相剪除。
    pub fn add_embedded(&mut self, embedded: AssemblyEmbedded) -> bool {
        let (seq, host) = (embedded.seq_idx, embedded.host_idx);
        if seq == host {
            return false;
        }
        if self.read_lengths[seq] == self.read_lengths[host] && seq < host {
            debug!("ignored embedding of read {} in read {} of equal length", seq, host);
            return false;
        }

        let records = self.embedded_by_seq.entry(seq).or_default();
        if let Some(prev) = records.iter_mut().find(|e| e.host_idx == host && e.reverse == embedded.reverse) {
            if embedded.num_shared_kmers <= prev.num_shared_kmers {
                return true;
            }
            *prev = embedded.clone();
            if let Some(by_host) = self.embedded_by_host.get_mut(&host) {
                if let Some(h) = by_host.iter_mut().find(|e| e.seq_idx == seq && e.reverse == embedded.reverse) {
                    *h = embedded;
                }
            }
            return true;
        }
        records.push(embedded.clone());
        self.embedded_by_host.entry(host).or_default().push(embedded);
        true
    }

    pub fn embedded_by_seq(&self, seq: usize) -> &[AssemblyEmbedded] {
        self.embedded_by_seq.get(&seq).map_or(&[], Vec::as_slice)
    }

    pub fn embedded_by_host(&self, host: usize) -> &[AssemblyEmbedded] {
        self.embedded_by_host.get(&host).map_or(&[], Vec::as_slice)
    }

    pub fn is_embedded(&self, seq: usize) -> bool {
        self.embedded_by_seq.get(&seq).map_or(false, |v| !v.is_empty())
    }

    /// 被包含的不同 read 数
    pub fn embedded_count(&self) -> usize {
        self.embedded_by_seq.values().filter(|v| !v.is_empty()).count()
    }

    /// 全部包含记录，按被包含 read 升序
    pub fn embedded_records(&self) -> impl Iterator<Item = &AssemblyEmbedded> + '_ {
        self.embedded_by_seq.values().flatten()
    }

    /// 删除所有被包含 read 的两个顶点及其关联边
    pub fn prune_embedded_sequences(&mut self) {
        let embedded: Vec<usize> = self.embedded_by_seq.iter().filter(|(_, v)| !v.is_empty()).map(|(&s, _)| s).collect();
        for seq in embedded {
            for is_start in [true, false] {
                let v = vertex_id(seq, is_start);
                if self.vertices[v].take().is_none() {
                    continue;
                }
                let neighbors: Vec<usize> = self.adjacency[v].iter().copied().collect();
                for n in neighbors {
                    self.remove_edge(edge_key(v, n));
                }
            }
        }
    }

    /// 过滤启发式：
    /// 1. 去掉共享 k-mer 少于 `min_shared_kmers` 的重叠边；
    /// 2. 去掉在两个端点上都被支配的边（覆盖度低于该端点最佳覆盖度的 `dominance_ratio` 倍）；
    /// 3. 对每条被包含的 read，去掉加权覆盖度低于最佳 host `dominance_ratio` 倍的记录。
    pub fn filter_edges_and_embedded(&mut self, params: &FilterParams) {
        let weak: Vec<(usize, usize)> = self
            .edges
            .iter()
            .filter(|(_, e)| !e.is_same_sequence_edge() && e.num_shared_kmers < params.min_shared_kmers)
            .map(|(&k, _)| k)
            .collect();
        for key in &weak {
            self.remove_edge(*key);
        }

        let mut best = vec![0usize; self.vertices.len()];
        for e in self.edges.values().filter(|e| !e.is_same_sequence_edge()) {
            for v in [e.vertex1.id, e.vertex2.id] {
                best[v] = best[v].max(e.coverage_shared_kmers);
            }
        }
        let dominated: Vec<(usize, usize)> = self
            .edges
            .iter()
            .filter(|(_, e)| !e.is_same_sequence_edge())
            .filter(|(_, e)| {
                let cov = e.coverage_shared_kmers as f64;
                cov < params.dominance_ratio * best[e.vertex1.id] as f64
                    && cov < params.dominance_ratio * best[e.vertex2.id] as f64
            })
            .map(|(&k, _)| k)
            .collect();
        for key in &dominated {
            self.remove_edge(*key);
        }

        let mut dropped_hosts = 0usize;
        for records in self.embedded_by_seq.values_mut() {
            let best_host = records.iter().map(|e| e.weighted_coverage).fold(0.0f64, f64::max);
            let before = records.len();
            records.retain(|e| e.weighted_coverage >= params.dominance_ratio * best_host);
            dropped_hosts += before - records.len();
        }
        let by_seq = &self.embedded_by_seq;
        for (host, records) in self.embedded_by_host.iter_mut() {
            records.retain(|e| {
                by_seq
                    .get(&e.seq_idx)
                    .map_or(false, |v| v.iter().any(|r| r.host_idx == *host && r.reverse == e.reverse))
            });
        }
        debug!(
            "filter removed {} weak edges, {} dominated edges, {} embedded host records",
            weak.len(),
            dominated.len(),
            dropped_hosts
        );
    }

    pub fn paths(&self) -> &[Vec<AssemblyEdge>] {
        &self.paths
    }

    pub fn add_path(&mut self, path: Vec<AssemblyEdge>) {
        self.paths.push(path);
    }

    /// 清除上一次布局：路径与所有边的布局标记
    pub fn clear_layout(&mut self) {
        self.paths.clear();
        for e in self.edges.values_mut() {
            e.layout_edge = false;
        }
    }

    pub fn set_layout_edge(&mut self, v1: usize, v2: usize) -> Option<&AssemblyEdge> {
        let e = self.edges.get_mut(&edge_key(v1, v2))?;
        e.layout_edge = true;
        Some(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(read: usize, is_start: bool) -> AssemblyVertex {
        AssemblyVertex::new(read, is_start)
    }

    fn overlap_edge(a: AssemblyVertex, b: AssemblyVertex, overlap: usize, kmers: usize) -> AssemblyEdge {
        let mut e = AssemblyEdge::new(a, b, overlap);
        e.num_shared_kmers = kmers;
        e.coverage_shared_kmers = overlap;
        e.weighted_coverage_shared_kmers = overlap as f64;
        e
    }

    fn embedded(seq: usize, host: usize, kmers: usize, weighted: f64) -> AssemblyEmbedded {
        AssemblyEmbedded {
            seq_idx: seq,
            host_idx: host,
            reverse: false,
            host_start: 10,
            host_end: 50,
            num_shared_kmers: kmers,
            weighted_coverage: weighted,
        }
    }

    #[test]
    fn vertex_ids_are_deterministic() {
        assert_eq!(vertex_id(0, true), 0);
        assert_eq!(vertex_id(0, false), 1);
        assert_eq!(vertex_id(7, false), 15);
        assert_eq!(v(3, true).mate_id(), 7);
    }

    #[test]
    fn new_graph_has_same_sequence_edges() {
        let g = AssemblyGraph::from_read_lengths(vec![100, 80]);
        assert_eq!(g.num_vertices(), 4);
        assert_eq!(g.num_edges(), 2);
        let e = g.same_sequence_edge(1).unwrap();
        assert_eq!(e.overlap, 80);
        assert!(e.is_same_sequence_edge());
        assert_eq!(g.degree(2), 1);
    }

    #[test]
    fn upsert_is_idempotent_and_merges_evidence() {
        let mut g = AssemblyGraph::from_read_lengths(vec![200, 200]);
        let mut first = overlap_edge(v(0, false), v(1, true), 100, 12);
        first.mismatches = 3;
        assert!(g.add_edge(first));
        let mut second = overlap_edge(v(1, true), v(0, false), 104, 9);
        second.coverage_shared_kmers = 120;
        second.mismatches = 1;
        assert!(g.add_edge(second));

        assert_eq!(g.num_edges(), 3);
        let e = g.edge(1, 2).unwrap();
        assert_eq!(e.overlap, 102);
        assert!((e.overlap_sd - 2.0).abs() < 1e-9);
        assert_eq!(e.evidence, 2);
        assert_eq!(e.num_shared_kmers, 12);
        assert_eq!(e.coverage_shared_kmers, 120);
        assert_eq!(e.mismatches, 1);
        assert_eq!(e.cost, 400 - 120);
        assert_eq!(g.degree(1), 2);

        // 同一次观测重复提交：重叠长度与标准差不变
        let mut g2 = AssemblyGraph::from_read_lengths(vec![200, 200]);
        let e1 = overlap_edge(v(0, false), v(1, true), 100, 12);
        g2.add_edge(e1.clone());
        g2.add_edge(e1);
        let merged = g2.edge(1, 2).unwrap();
        assert_eq!(merged.overlap, 100);
        assert_eq!(merged.overlap_sd, 0.0);
        assert_eq!(merged.num_shared_kmers, 12);
        assert_eq!(g2.num_edges(), 3);
    }

    #[test]
    fn rejects_self_loops() {
        let mut g = AssemblyGraph::from_read_lengths(vec![50, 50]);
        assert!(!g.add_edge(overlap_edge(v(0, true), v(0, true), 10, 5)));
        assert!(!g.add_edge(overlap_edge(v(0, true), v(0, false), 10, 5)));
        assert_eq!(g.num_edges(), 2);
        assert_eq!(g.same_sequence_edge(0).unwrap().overlap, 50);
    }

    #[test]
    fn embedded_records_are_deduplicated() {
        let mut g = AssemblyGraph::from_read_lengths(vec![100, 60, 60]);
        assert!(g.add_embedded(embedded(1, 0, 5, 20.0)));
        assert!(g.add_embedded(embedded(1, 0, 9, 30.0)));
        assert!(g.add_embedded(embedded(1, 0, 2, 10.0)));
        assert_eq!(g.embedded_by_seq(1).len(), 1);
        assert_eq!(g.embedded_by_seq(1)[0].num_shared_kmers, 9);
        assert_eq!(g.embedded_by_host(0)[0].num_shared_kmers, 9);

        // 等长 read：只能后者包含于前者
        assert!(!g.add_embedded(embedded(1, 2, 5, 20.0)));
        assert!(g.add_embedded(embedded(2, 1, 5, 20.0)));
        assert_eq!(g.embedded_count(), 2);
        assert!(!g.is_embedded(0));
    }

    #[test]
    fn pruning_removes_vertices_and_edges_of_embedded_reads() {
        let mut g = AssemblyGraph::from_read_lengths(vec![100, 40, 90]);
        g.add_edge(overlap_edge(v(0, false), v(1, true), 30, 8));
        g.add_edge(overlap_edge(v(0, false), v(2, true), 50, 8));
        g.add_edge(overlap_edge(v(1, false), v(2, true), 20, 8));
        g.add_embedded(embedded(1, 0, 8, 30.0));
        g.prune_embedded_sequences();

        assert!(g.vertex_of(1, true).is_none());
        assert!(g.vertex_of(1, false).is_none());
        assert!(g.same_sequence_edge(1).is_none());
        assert!(g.edges().all(|e| e.vertex1.read != 1 && e.vertex2.read != 1));
        assert_eq!(g.num_vertices(), 4);
        assert_eq!(g.num_edges(), 3);
        assert_eq!(g.degree(vertex_id(0, false)), 2);
        // 顶点已剪除后不再接受新的边
        assert!(!g.add_edge(overlap_edge(v(1, true), v(2, false), 20, 8)));
    }

    #[test]
    fn filter_drops_weak_and_dominated_edges() {
        let mut g = AssemblyGraph::from_read_lengths(vec![300, 300, 300, 300]);
        g.add_edge(overlap_edge(v(0, false), v(1, true), 200, 20));
        // 两端都被支配
        g.add_edge(overlap_edge(v(0, false), v(2, true), 40, 10));
        g.add_edge(overlap_edge(v(1, true), v(2, true), 30, 10));
        g.add_edge(overlap_edge(v(2, true), v(3, false), 150, 10));
        // 共享 k-mer 太少
        g.add_edge(overlap_edge(v(1, false), v(3, true), 150, 2));

        g.add_embedded(AssemblyEmbedded { host_idx: 0, ..embedded(3, 0, 9, 100.0) });
        g.add_embedded(AssemblyEmbedded { host_idx: 1, ..embedded(3, 1, 9, 20.0) });

        g.filter_edges_and_embedded(&FilterParams { min_shared_kmers: 5, dominance_ratio: 0.5 });

        assert!(g.edge(vertex_id(0, false), vertex_id(1, true)).is_some());
        assert!(g.edge(vertex_id(0, false), vertex_id(2, true)).is_none());
        assert!(g.edge(vertex_id(1, true), vertex_id(2, true)).is_none());
        assert!(g.edge(vertex_id(2, true), vertex_id(3, false)).is_some());
        assert!(g.edge(vertex_id(1, false), vertex_id(3, true)).is_none());
        assert_eq!(g.num_edges(), 4 + 2);

        assert_eq!(g.embedded_by_seq(3).len(), 1);
        assert_eq!(g.embedded_by_seq(3)[0].host_idx, 0);
        assert!(g.embedded_by_host(1).is_empty());
    }

    #[test]
    fn degree_distribution_counts_every_vertex() {
        let mut g = AssemblyGraph::from_read_lengths(vec![100, 100, 100]);
        g.add_edge(overlap_edge(v(0, false), v(1, true), 50, 8));
        let dist = g.degree_distribution();
        assert_eq!(dist.count(), 6);
        assert_eq!(dist.bins()[1], 4);
        assert_eq!(dist.bins()[2], 2);
    }

    #[test]
    fn shared_vertex_and_other_end() {
        let e1 = overlap_edge(v(0, false), v(1, true), 50, 8);
        let e2 = AssemblyEdge::new(v(1, true), v(1, false), 100);
        assert_eq!(e1.shared_vertex(&e2), Some(v(1, true)));
        assert_eq!(e1.other(vertex_id(1, true)), Some(v(0, false)));
        assert_eq!(e1.other(vertex_id(2, true)), None);
    }
}
