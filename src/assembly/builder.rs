//! 组装图构建：并行地对每条 read 的两条链收集命中并分类，
//! 由单个聚合者按 read 顺序把更新写入图。

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, RecvTimeoutError};
use rayon::prelude::*;
use tracing::info;

use crate::align::{FmHitSource, KmerHitSource, MinimizerHitSource};
use crate::assembly::classifier::{Classifier, ClassifierParams, GraphUpdate, Query};
use crate::assembly::graph::AssemblyGraph;
use crate::error::{AssemblyError, Result};
use crate::index::kmers::KmerCounts;
use crate::index::minimizers::MinimizerTable;
use crate::index::search::ReadIndex;
use crate::io::reads::SequenceStore;

/// 由一组 read 构建组装图，返回前已剪除被包含的 read。
pub trait GraphBuilder: Send + Sync {
    fn build_assembly_graph(&self, store: &SequenceStore) -> Result<AssemblyGraph>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildParams {
    pub kmer_len: usize,
    pub threads: usize,
    pub max_kmer_count: u32,
    pub classifier: ClassifierParams,
    /// 聚合者等待的总时长为 `timeout_per_read * reads`
    pub timeout_per_read: Duration,
}

impl Default for BuildParams {
    fn default() -> Self {
        Self {
            kmer_len: 15,
            threads: 1,
            max_kmer_count: 100,
            classifier: ClassifierParams::default(),
            timeout_per_read: Duration::from_secs(2),
        }
    }
}

/// FM 索引 + k-mer 频数表
#[derive(Debug, Clone)]
pub struct FmIndexGraphBuilder {
    pub params: BuildParams,
    pub kmer_offset: usize,
}

impl GraphBuilder for FmIndexGraphBuilder {
    fn build_assembly_graph(&self, store: &SequenceStore) -> Result<AssemblyGraph> {
        let k = self.params.kmer_len;
        info!("Extracting k-mers map");
        let counts = KmerCounts::build(store, k, true);
        info!("Extracted k-mers map. K-mers: {}", counts.len());
        let index = ReadIndex::build(store);
        info!("Created FM-index over {} sequences", index.num_sequences());

        let source = FmHitSource {
            counts: &counts,
            index: &index,
            kmer_offset: self.kmer_offset,
            max_kmer_count: self.params.max_kmer_count,
        };
        build_graph_with_source(store, &source, &self.params)
    }
}

/// (w, k) minimizer 表
#[derive(Debug, Clone)]
pub struct MinimizerGraphBuilder {
    pub params: BuildParams,
    pub window: usize,
}

impl GraphBuilder for MinimizerGraphBuilder {
    fn build_assembly_graph(&self, store: &SequenceStore) -> Result<AssemblyGraph> {
        let table = MinimizerTable::build(store, self.params.kmer_len, self.window);
        info!("Built minimizers table. Distinct minimizers: {}", table.len());
        let source = MinimizerHitSource { table: &table, max_kmer_count: self.params.max_kmer_count };
        build_graph_with_source(store, &source, &self.params)
    }
}

/// 对单条 read 的正反两条链收集命中并分类
fn process_read<S: KmerHitSource + ?Sized>(
    store: &SequenceStore,
    source: &S,
    classifier: &Classifier<'_>,
    read: usize,
) -> Result<Vec<GraphUpdate>> {
    let seq = &store.get(read).seq;
    let mut updates = classifier.classify(Query { idx: read, seq, reverse: false }, source.kmer_hits(seq)?);
    let rc = store.get(read).reverse_complement();
    updates.extend(classifier.classify(Query { idx: read, seq: &rc, reverse: true }, source.kmer_hits(&rc)?));
    Ok(updates)
}

fn apply(graph: &mut AssemblyGraph, updates: Vec<GraphUpdate>) {
    for u in updates {
        match u {
            GraphUpdate::Edge(e) => {
                graph.add_edge(e);
            }
            GraphUpdate::Embedded(e) => {
                graph.add_embedded(e);
            }
        }
    }
}

/// 共享的并行驱动：`threads` 个 worker 只读索引并把更新发往通道，
/// 当前线程作为唯一的聚合者持有图。更新按 read 顺序应用，
/// 因此结果与线程数无关。
pub fn build_graph_with_source<S: KmerHitSource + ?Sized>(
    store: &SequenceStore,
    source: &S,
    params: &BuildParams,
) -> Result<AssemblyGraph> {
    let mut graph = AssemblyGraph::new(store);
    info!("Created graph vertices. Edges: {}", graph.num_edges());
    let n = store.len();
    if n == 0 {
        return Ok(graph);
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(params.threads.max(1))
        .thread_name(|i| format!("olc-worker-{i}"))
        .build()
        .map_err(|e| AssemblyError::WorkerPool(e.to_string()))?;
    let classifier = Classifier::new(store, source.kmer_length(), params.classifier);
    let cancel = AtomicBool::new(false);
    let timeout = params.timeout_per_read.saturating_mul(u32::try_from(n).unwrap_or(u32::MAX));
    let start = Instant::now();
    let deadline = start.checked_add(timeout).unwrap_or(start + Duration::from_secs(365 * 86_400));
    let (tx, rx) = bounded::<(usize, Vec<GraphUpdate>)>(4 * params.threads.max(1));

    std::thread::scope(|scope| {
        let (pool, classifier, cancel) = (&pool, &classifier, &cancel);
        let producer = scope.spawn(move || {
            pool.install(|| {
                (0..n).into_par_iter().try_for_each(|read| {
                    if cancel.load(Ordering::Relaxed) {
                        return Ok(());
                    }
                    let updates = process_read(store, source, classifier, read)?;
                    tx.send((read, updates))
                        .map_err(|_| AssemblyError::WorkerPool("graph aggregator stopped".to_string()))
                })
            })
        });

        let mut pending: BTreeMap<usize, Vec<GraphUpdate>> = BTreeMap::new();
        let mut next = 0usize;
        let outcome = loop {
            match rx.recv_deadline(deadline) {
                Ok((read, updates)) => {
                    pending.insert(read, updates);
                    while let Some(updates) = pending.remove(&next) {
                        apply(&mut graph, updates);
                        next += 1;
                        if next % 100 == 0 {
                            info!(
                                "Processed {} sequences. Number of edges: {} Embedded: {}",
                                next,
                                graph.num_edges(),
                                graph.embedded_count()
                            );
                        }
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break Ok(()),
                Err(RecvTimeoutError::Timeout) => {
                    cancel.store(true, Ordering::Relaxed);
                    break Err(AssemblyError::Timeout(timeout));
                }
            }
        };
        // 先关闭接收端，阻塞在 send 上的 worker 才能退出
        drop(rx);
        let produced = producer
            .join()
            .map_err(|_| AssemblyError::WorkerPool("graph worker panicked".to_string()))?;
        outcome?;
        produced
    })?;
    info!(
        "Built graph. Edges: {} Embedded: {} Pruning embedded sequences",
        graph.num_edges(),
        graph.embedded_count()
    );
    graph.prune_embedded_sequences();
    info!("Pruned graph. Vertices: {} Edges: {}", graph.num_vertices(), graph.num_edges());
    Ok(graph)
}
