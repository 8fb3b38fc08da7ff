//! K-mer 命中收集：把一条查询序列的 k-mer 命中按目标 read 分组。

use std::collections::BTreeMap;

use crate::error::Result;
use crate::index::kmers::{kmer_codes, KmerCounts};
use crate::index::minimizers::{minimizers, MinimizerTable};
use crate::index::search::ReadIndex;

/// 查询 k-mer 在目标 read 上的一次精确命中
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KmerHit {
    /// k-mer 在查询上的起点
    pub query_start: usize,
    pub target_idx: usize,
    /// k-mer 在目标上的起点
    pub target_start: usize,
    /// 该 k-mer 的全局出现次数（用于加权覆盖度）
    pub count: u32,
}

/// 命中来源。实现者只读共享索引，可被多个 worker 同时使用。
pub trait KmerHitSource: Sync {
    fn kmer_length(&self) -> usize;

    /// 目标 read id -> 命中列表
    fn kmer_hits(&self, query: &[u8]) -> Result<BTreeMap<usize, Vec<KmerHit>>>;
}

/// 基于 FM 索引的命中来源：每隔 `kmer_offset` 取一个 k-mer，
/// 唯一或高度重复的 k-mer 跳过一个 k-mer 长度。
pub struct FmHitSource<'a> {
    pub counts: &'a KmerCounts,
    pub index: &'a ReadIndex,
    pub kmer_offset: usize,
    pub max_kmer_count: u32,
}

impl KmerHitSource for FmHitSource<'_> {
    fn kmer_length(&self) -> usize {
        self.counts.kmer_length()
    }

    fn kmer_hits(&self, query: &[u8]) -> Result<BTreeMap<usize, Vec<KmerHit>>> {
        let k = self.counts.kmer_length();
        let codes = kmer_codes(query, k);
        let mut hits: BTreeMap<usize, Vec<KmerHit>> = BTreeMap::new();
        let step = self.kmer_offset.max(1);

        let mut i = 0usize;
        while i < codes.len() {
            let Some(code) = codes[i] else {
                i += k;
                continue;
            };
            let count = self.counts.count_code(code);
            if count <= 1 || count > self.max_kmer_count {
                i += k;
                continue;
            }
            for h in self.index.exact_search(&query[i..i + k])? {
                hits.entry(h.sequence_idx).or_default().push(KmerHit {
                    query_start: i,
                    target_idx: h.sequence_idx,
                    target_start: h.start,
                    count,
                });
            }
            i += step;
        }
        Ok(hits)
    }
}

/// 基于 minimizer 表的命中来源
pub struct MinimizerHitSource<'a> {
    pub table: &'a MinimizerTable,
    pub max_kmer_count: u32,
}

impl KmerHitSource for MinimizerHitSource<'_> {
    fn kmer_length(&self) -> usize {
        self.table.kmer_length()
    }

    fn kmer_hits(&self, query: &[u8]) -> Result<BTreeMap<usize, Vec<KmerHit>>> {
        let mut hits: BTreeMap<usize, Vec<KmerHit>> = BTreeMap::new();
        for m in minimizers(query, self.table.kmer_length(), self.table.window_length()) {
            let entries = self.table.lookup(m.hash);
            let count = entries.len() as u32;
            if count > self.max_kmer_count {
                continue;
            }
            for &(read, pos) in entries {
                hits.entry(read as usize).or_default().push(KmerHit {
                    query_start: m.pos as usize,
                    target_idx: read as usize,
                    target_start: pos as usize,
                    count,
                });
            }
        }
        Ok(hits)
    }
}
