use ahash::AHashMap;
use rayon::prelude::*;

use crate::io::reads::SequenceStore;
use crate::util::dna;

/// 2-bit 压缩后 k-mer 的最大长度
pub const MAX_KMER_LENGTH: usize = 32;

#[inline]
fn kmer_mask(k: usize) -> u64 {
    if k >= 32 { u64::MAX } else { (1u64 << (2 * k)) - 1 }
}

/// 编码单个 k-mer；含非 ACGT 碱基或长度超限时返回 None。
pub fn encode_kmer(kmer: &[u8]) -> Option<u64> {
    if kmer.is_empty() || kmer.len() > MAX_KMER_LENGTH {
        return None;
    }
    kmer.iter().try_fold(0u64, |acc, &b| Some((acc << 2) | dna::to_2bit(b)?))
}

/// 滚动计算每个起点的 k-mer 编码，结果长度为 len - k + 1。
/// 窗口内含非 ACGT 碱基的位置为 None。
pub fn kmer_codes(seq: &[u8], k: usize) -> Vec<Option<u64>> {
    if k == 0 || k > MAX_KMER_LENGTH || seq.len() < k {
        return Vec::new();
    }
    let mask = kmer_mask(k);
    let mut out = Vec::with_capacity(seq.len() - k + 1);
    let mut code = 0u64;
    let mut valid = 0usize;
    for (i, &b) in seq.iter().enumerate() {
        match dna::to_2bit(b) {
            Some(v) => {
                code = ((code << 2) | v) & mask;
                valid += 1;
            }
            None => {
                code = 0;
                valid = 0;
            }
        }
        if i + 1 >= k {
            out.push(if valid >= k { Some(code) } else { None });
        }
    }
    out
}

/// 全局 k-mer 频数表，构建一次，之后只读。
#[derive(Debug, Default)]
pub struct KmerCounts {
    k: usize,
    counts: AHashMap<u64, u32>,
}

impl KmerCounts {
    /// 统计所有 read 的 k-mer；`both_strands` 时同时统计反向互补链，
    /// 这样反向互补查询看到的频数与正向一致。
    pub fn build(store: &SequenceStore, k: usize, both_strands: bool) -> Self {
        let counts = (0..store.len())
            .into_par_iter()
            .fold(AHashMap::new, |mut local: AHashMap<u64, u32>, i| {
                let seq = &store.get(i).seq;
                for code in kmer_codes(seq, k).into_iter().flatten() {
                    *local.entry(code).or_insert(0) += 1;
                }
                if both_strands {
                    for code in kmer_codes(&dna::revcomp(seq), k).into_iter().flatten() {
                        *local.entry(code).or_insert(0) += 1;
                    }
                }
                local
            })
            .reduce(AHashMap::new, |a, b| if a.len() >= b.len() { merge_into(a, b) } else { merge_into(b, a) });
        Self { k, counts }
    }

    pub fn kmer_length(&self) -> usize {
        self.k
    }

    /// 不同 k-mer 的数量
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn count(&self, kmer: &[u8]) -> u32 {
        if kmer.len() != self.k {
            return 0;
        }
        encode_kmer(kmer).map_or(0, |code| self.count_code(code))
    }

    pub fn count_code(&self, code: u64) -> u32 {
        self.counts.get(&code).copied().unwrap_or(0)
    }
}

fn merge_into(mut big: AHashMap<u64, u32>, small: AHashMap<u64, u32>) -> AHashMap<u64, u32> {
    for (code, c) in small {
        *big.entry(code).or_insert(0) += c;
    }
    big
}
