//! 布局：在组装图上选出互不相交的简单路径。

use std::cmp::Ordering;

use tracing::info;

use crate::assembly::graph::{vertex_id, AssemblyEdge, AssemblyGraph};

pub trait LayoutBuilder: Send + Sync {
    /// 丢弃已有路径，重新计算并写入图中
    fn find_paths(&self, graph: &mut AssemblyGraph);
}

/// 贪心：重叠长度优先
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyMaxOverlap;

/// Kruskal：开销优先
#[derive(Debug, Clone, Copy, Default)]
pub struct KruskalPath;

impl LayoutBuilder for GreedyMaxOverlap {
    fn find_paths(&self, graph: &mut AssemblyGraph) {
        build_paths(graph, |a, b| {
            b.overlap.cmp(&a.overlap).then(a.cost.cmp(&b.cost)).then(a.key().cmp(&b.key()))
        });
    }
}

impl LayoutBuilder for KruskalPath {
    fn find_paths(&self, graph: &mut AssemblyGraph) {
        build_paths(graph, |a, b| a.cost.cmp(&b.cost).then(a.key().cmp(&b.key())));
    }
}

/// 按 read 合并的并查集
struct DisjointSets {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl DisjointSets {
    fn new(n: usize) -> Self {
        Self { parent: (0..n).collect(), size: vec![1; n] }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// 已在同一集合时返回 false
    fn union(&mut self, a: usize, b: usize) -> bool {
        let (mut ra, mut rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        if self.size[ra] < self.size[rb] {
            std::mem::swap(&mut ra, &mut rb);
        }
        self.parent[rb] = ra;
        self.size[ra] += self.size[rb];
        true
    }
}

fn build_paths<F>(graph: &mut AssemblyGraph, order: F)
where
    F: Fn(&AssemblyEdge, &AssemblyEdge) -> Ordering,
{
    graph.clear_layout();
    let n = graph.num_sequences();

    let mut candidates: Vec<&AssemblyEdge> = graph.edges().filter(|e| !e.is_same_sequence_edge()).collect();
    candidates.sort_by(|a, b| order(a, b));

    // partner[v]：与顶点 v 通过重叠边相连的顶点
    let mut partner: Vec<Option<usize>> = vec![None; 2 * n];
    let mut sets = DisjointSets::new(n);
    let mut selected: Vec<(usize, usize)> = Vec::new();
    for e in candidates {
        let (v1, v2) = (e.vertex1.id, e.vertex2.id);
        if partner[v1].is_some() || partner[v2].is_some() {
            continue;
        }
        if !sets.union(e.vertex1.read, e.vertex2.read) {
            continue;
        }
        partner[v1] = Some(v2);
        partner[v2] = Some(v1);
        selected.push((v1, v2));
    }

    let mut visited = vec![false; n];
    let mut paths: Vec<Vec<(usize, usize)>> = Vec::new();
    for read in 0..n {
        let (start, end) = (vertex_id(read, true), vertex_id(read, false));
        if visited[read] || graph.vertex(start).is_none() {
            continue;
        }
        let mut entry = match (partner[start], partner[end]) {
            (None, _) => start,
            (_, None) => end,
            // 两端都已连接的 read 是某条路径的中间节点，由端点负责遍历
            _ => continue,
        };
        let mut path = Vec::new();
        loop {
            let r = entry / 2;
            visited[r] = true;
            let exit = entry ^ 1;
            path.push((entry, exit));
            match partner[exit] {
                Some(next) => {
                    path.push((exit, next));
                    entry = next;
                }
                None => break,
            }
        }
        paths.push(path);
    }

    for (v1, v2) in paths.iter().flatten() {
        graph.set_layout_edge(*v1, *v2);
    }
    for path in paths {
        let edges: Vec<AssemblyEdge> = path.iter().filter_map(|&(a, b)| graph.edge(a, b).cloned()).collect();
        graph.add_path(edges);
    }
    info!("Layout complete. Overlap edges selected: {} Paths: {}", selected.len(), graph.paths().len());
}
