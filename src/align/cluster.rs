use std::collections::BTreeMap;

use crate::align::hits::KmerHit;

/// 一条查询与一个目标之间相互一致的 k-mer 命中簇。
///
/// 每个命中都推出查询在目标坐标系中的窗口 `[first, last]`，
/// 窗口相交的命中合并到同一个簇，窗口取并集。
#[derive(Debug, Clone, PartialEq)]
pub struct KmerAlignmentCluster {
    target_idx: usize,
    query_len: usize,
    kmer_len: usize,
    first: i64,
    last: i64,
    hits: Vec<KmerHit>,
    /// 不同的查询 k-mer 起点 -> 该 k-mer 的全局频数
    kmer_starts: BTreeMap<usize, u32>,
    all_consistent: bool,
    repeated_number: bool,
    last_aln_present: bool,
}

#[inline]
fn implied_window(query_len: usize, hit: &KmerHit) -> (i64, i64) {
    let ts = hit.target_start as i64;
    let qs = hit.query_start as i64;
    (ts - qs, ts + (query_len as i64 - qs - 1))
}

impl KmerAlignmentCluster {
    pub fn new(query_len: usize, kmer_len: usize, hit: KmerHit) -> Self {
        let (first, last) = implied_window(query_len, &hit);
        let mut kmer_starts = BTreeMap::new();
        kmer_starts.insert(hit.query_start, hit.count);
        Self {
            target_idx: hit.target_idx,
            query_len,
            kmer_len,
            first,
            last,
            hits: vec![hit],
            kmer_starts,
            all_consistent: true,
            repeated_number: false,
            last_aln_present: hit.query_start + kmer_len == query_len,
        }
    }

    /// 命中窗口与当前窗口相交时并入，返回是否并入。
    pub fn try_add(&mut self, hit: KmerHit) -> bool {
        let (est_first, est_last) = implied_window(self.query_len, &hit);
        if self.first > est_last || self.last < est_first {
            return false;
        }
        if self.first != est_first || self.last != est_last {
            self.all_consistent = false;
        }
        if self.kmer_starts.contains_key(&hit.query_start) {
            self.repeated_number = true;
        } else {
            self.kmer_starts.insert(hit.query_start, hit.count);
        }
        if hit.query_start + self.kmer_len == self.query_len {
            self.last_aln_present = true;
        }
        self.first = self.first.min(est_first);
        self.last = self.last.max(est_last);
        self.hits.push(hit);
        true
    }

    pub fn target_idx(&self) -> usize {
        self.target_idx
    }

    /// 查询第一个碱基在目标上的推断位置，可以为负
    pub fn first(&self) -> i64 {
        self.first
    }

    /// 查询最后一个碱基在目标上的推断位置，可以超出目标长度
    pub fn last(&self) -> i64 {
        self.last
    }

    pub fn length(&self) -> i64 {
        self.last - self.first + 1
    }

    pub fn hits(&self) -> &[KmerHit] {
        &self.hits
    }

    pub fn num_different_kmers(&self) -> usize {
        self.kmer_starts.len()
    }

    pub fn is_all_consistent(&self) -> bool {
        self.all_consistent
    }

    pub fn is_repeated_number(&self) -> bool {
        self.repeated_number
    }

    pub fn is_first_aln_present(&self) -> bool {
        self.kmer_starts.contains_key(&0)
    }

    pub fn is_last_aln_present(&self) -> bool {
        self.last_aln_present
    }

    /// 被不同 k-mer 覆盖的查询碱基数
    pub fn coverage(&self) -> usize {
        let k = self.kmer_len;
        let mut covered = 0usize;
        let mut next_free = 0usize;
        for s in self.kmer_starts.keys() {
            let start = (*s).max(next_free);
            let end = s + k;
            if end > start {
                covered += end - start;
            }
            next_free = next_free.max(end);
        }
        covered
    }

    /// 按 k-mer 频数降权的覆盖度：每个 k-mer 贡献其独占的碱基数除以 max(1, count - 1)
    pub fn weighted_coverage(&self) -> f64 {
        let k = self.kmer_len;
        let starts: Vec<(usize, u32)> = self.kmer_starts.iter().map(|(&s, &c)| (s, c)).collect();
        starts
            .iter()
            .enumerate()
            .map(|(i, &(s, count))| {
                let span = starts.get(i + 1).map_or(k, |&(next, _)| k.min(next - s));
                span as f64 / f64::from(count.saturating_sub(1).max(1))
            })
            .sum()
    }
}

/// 按 (target_start, query_start) 排序，聚类前必须调用
pub fn sort_hits(hits: &mut [KmerHit]) {
    hits.sort_by_key(|h| (h.target_start, h.query_start));
}

/// 单次左到右扫描：命中与当前簇窗口相交则并入，否则开新簇。
/// `hits` 应已按 [`sort_hits`] 排序。
pub fn cluster_kmer_hits(query_len: usize, kmer_len: usize, hits: &[KmerHit]) -> Vec<KmerAlignmentCluster> {
    let mut clusters: Vec<KmerAlignmentCluster> = Vec::new();
    for &hit in hits {
        let merged = clusters.last_mut().map_or(false, |c| c.try_add(hit));
        if !merged {
            clusters.push(KmerAlignmentCluster::new(query_len, kmer_len, hit));
        }
    }
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(query_start: usize, target_start: usize) -> KmerHit {
        KmerHit { query_start, target_idx: 1, target_start, count: 2 }
    }

    #[test]
    fn consistent_hits_form_one_cluster() {
        // 查询长 20，整体平移 +7
        let mut hits = vec![hit(10, 17), hit(0, 7), hit(15, 22), hit(5, 12)];
        sort_hits(&mut hits);
        let clusters = cluster_kmer_hits(20, 5, &hits);
        assert_eq!(clusters.len(), 1);
        let c = &clusters[0];
        assert_eq!((c.first(), c.last()), (7, 26));
        assert_eq!(c.length(), 20);
        assert_eq!(c.num_different_kmers(), 4);
        assert!(c.is_all_consistent());
        assert!(!c.is_repeated_number());
        assert!(c.is_first_aln_present());
        assert!(c.is_last_aln_present());
        assert_eq!(c.coverage(), 20);
        assert!((c.weighted_coverage() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn shifted_hits_widen_window_and_flag_inconsistency() {
        let hits = vec![hit(2, 10), hit(6, 15), hit(2, 30)];
        let clusters = cluster_kmer_hits(20, 4, &hits);
        // 窗口 [8,27] 与 [9,28] 相交；[28,47] 与并集 [8,28] 相交
        assert_eq!(clusters.len(), 1);
        let c = &clusters[0];
        assert_eq!((c.first(), c.last()), (8, 47));
        assert!(!c.is_all_consistent());
        assert!(c.is_repeated_number());
        assert_eq!(c.num_different_kmers(), 2);
        assert!(!c.is_first_aln_present());
        assert!(!c.is_last_aln_present());
    }

    #[test]
    fn disjoint_windows_start_new_clusters() {
        let hits = vec![hit(0, 0), hit(0, 100), hit(4, 104)];
        let clusters = cluster_kmer_hits(10, 4, &hits);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].num_different_kmers(), 1);
        assert_eq!((clusters[1].first(), clusters[1].last()), (100, 109));
        assert_eq!(clusters[1].hits().len(), 2);
    }

    #[test]
    fn negative_first_for_left_overhang() {
        let clusters = cluster_kmer_hits(30, 5, &[hit(20, 3)]);
        assert_eq!(clusters[0].first(), -17);
        assert_eq!(clusters[0].last(), 12);
    }

    #[test]
    fn clustering_is_deterministic() {
        let mut a = vec![hit(3, 40), hit(0, 5), hit(9, 14), hit(12, 60), hit(6, 11), hit(3, 8)];
        let mut b = a.clone();
        b.reverse();
        sort_hits(&mut a);
        sort_hits(&mut b);
        assert_eq!(cluster_kmer_hits(25, 3, &a), cluster_kmer_hits(25, 3, &b));
    }

    #[test]
    fn weighted_coverage_discounts_frequent_kmers() {
        let hits = vec![
            KmerHit { query_start: 0, target_idx: 1, target_start: 0, count: 5 },
            KmerHit { query_start: 2, target_idx: 1, target_start: 2, count: 2 },
        ];
        let c = &cluster_kmer_hits(10, 4, &hits)[0];
        // 第一个 k-mer 独占 2 个碱基，权重 1/4；第二个 4 个碱基，权重 1
        assert!((c.weighted_coverage() - 4.5).abs() < 1e-9);
        assert_eq!(c.coverage(), 6);
    }
}
