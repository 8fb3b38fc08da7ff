//! (w, k) minimizer 表：每个窗口内 w 个连续 k-mer 中哈希值最小者。

use ahash::AHashMap;
use rayon::prelude::*;

use crate::index::kmers::{kmer_codes, MAX_KMER_LENGTH};
use crate::io::reads::SequenceStore;

/// 可逆整数哈希（Thomas Wang），打散 2-bit 编码中的低复杂度 k-mer
#[inline]
pub fn hash64(key: u64, mask: u64) -> u64 {
    let mut key = (!key).wrapping_add(key << 21) & mask;
    key ^= key >> 24;
    key = (key.wrapping_add(key << 3)).wrapping_add(key << 8) & mask;
    key ^= key >> 14;
    key = (key.wrapping_add(key << 2)).wrapping_add(key << 4) & mask;
    key ^= key >> 28;
    key = key.wrapping_add(key << 31) & mask;
    key
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Minimizer {
    pub hash: u64,
    pub pos: u32,
}

/// 计算 `seq` 的 (w, k) minimizer，按位置升序且不重复。
/// 并列时取最左侧的 k-mer；含非 ACGT 碱基的 k-mer 不参与。
/// 序列不足一个完整窗口时，把全部有效 k-mer 视作一个窗口。
pub fn minimizers(seq: &[u8], k: usize, w: usize) -> Vec<Minimizer> {
    if k == 0 || k > MAX_KMER_LENGTH || w == 0 {
        return Vec::new();
    }
    let mask = if k >= 32 { u64::MAX } else { (1u64 << (2 * k)) - 1 };
    let hashes: Vec<Option<u64>> = kmer_codes(seq, k).into_iter().map(|c| c.map(|c| hash64(c, mask))).collect();
    if hashes.is_empty() {
        return Vec::new();
    }

    let win = w.min(hashes.len());
    let mut out: Vec<Minimizer> = Vec::new();
    for s in 0..=hashes.len() - win {
        let best = hashes[s..s + win]
            .iter()
            .enumerate()
            .filter_map(|(i, h)| h.map(|h| (h, s + i)))
            .min_by_key(|&(h, i)| (h, i));
        if let Some((hash, pos)) = best {
            if out.last().map_or(true, |m| m.pos as usize != pos) {
                out.push(Minimizer { hash, pos: pos as u32 });
            }
        }
    }
    out
}

/// 全部 read 正向链的 minimizer 表：hash -> [(read, pos)]
#[derive(Debug, Default)]
pub struct MinimizerTable {
    k: usize,
    w: usize,
    table: AHashMap<u64, Vec<(u32, u32)>>,
}

impl MinimizerTable {
    pub fn build(store: &SequenceStore, k: usize, w: usize) -> Self {
        let per_read: Vec<Vec<Minimizer>> =
            (0..store.len()).into_par_iter().map(|i| minimizers(&store.get(i).seq, k, w)).collect();

        // 按 read 顺序插入，保证同一 hash 下的条目顺序确定
        let mut table: AHashMap<u64, Vec<(u32, u32)>> = AHashMap::new();
        for (read, mins) in per_read.into_iter().enumerate() {
            for m in mins {
                table.entry(m.hash).or_default().push((read as u32, m.pos));
            }
        }
        Self { k, w, table }
    }

    pub fn kmer_length(&self) -> usize {
        self.k
    }

    pub fn window_length(&self) -> usize {
        self.w
    }

    /// 不同 minimizer 的数量
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn lookup(&self, hash: u64) -> &[(u32, u32)] {
        self.table.get(&hash).map_or(&[], Vec::as_slice)
    }
}
