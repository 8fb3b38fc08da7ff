/// 文本中的一段（一条 read）：起始偏移与长度。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub offset: u32,
    pub len: u32,
}

/// 朴素 FM 索引实现：
/// - 字母以 [0..sigma) 编码（0 预留为 $，同时作为 read 之间的分隔符）。
/// - 采用定长分块的 Occ 采样（块内顺扫补偿）。
/// - 保存完整 SA，区间可以直接换成文本位置。
#[derive(Debug)]
pub struct FMIndex {
    sigma: u8,
    block: u32,
    /// C[i] = 文本中字母 < i 的累计数量
    c: Vec<u32>,
    /// BWT 序列（与 SA 同长度）
    bwt: Vec<u8>,
    /// Occ 采样（按块存储，行优先展平）：occ_samples[block_id * sigma + c]
    occ_samples: Vec<u32>,
    sa: Vec<u32>,
    /// 每条 read 在拼接文本中的位置，按 offset 升序
    segments: Vec<Segment>,
}

impl FMIndex {
    pub fn build(bwt: Vec<u8>, sa: Vec<u32>, segments: Vec<Segment>, sigma: u8, block: usize) -> Self {
        let n = bwt.len();
        let sigma_us = sigma as usize;
        let block = block.max(1);

        let mut freq = vec![0u32; sigma_us];
        for &ch in &bwt {
            if let Some(f) = freq.get_mut(ch as usize) {
                *f += 1;
            }
        }
        let mut c = vec![0u32; sigma_us];
        let mut acc = 0u32;
        for (ci, f) in c.iter_mut().zip(&freq) {
            *ci = acc;
            acc += f;
        }

        // 每个块记录块起始位置之前的累计计数
        let num_blocks = (n + block - 1) / block;
        let mut occ_samples = vec![0u32; num_blocks * sigma_us];
        let mut running = vec![0u32; sigma_us];
        for (bi, chunk) in bwt.chunks(block).enumerate() {
            occ_samples[bi * sigma_us..(bi + 1) * sigma_us].copy_from_slice(&running);
            for &ch in chunk {
                if let Some(r) = running.get_mut(ch as usize) {
                    *r += 1;
                }
            }
        }

        Self { sigma, block: block as u32, c, bwt, occ_samples, sa, segments }
    }

    pub fn len(&self) -> usize {
        self.bwt.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bwt.is_empty()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// BWT[0..pos) 中 c 的出现次数
    #[inline]
    pub fn occ(&self, c: u8, pos: usize) -> u32 {
        if pos == 0 { return 0; }
        let sigma_us = self.sigma as usize;
        let block = self.block as usize;
        let bi = (pos - 1) / block;
        let base = self.occ_samples[bi * sigma_us + c as usize];
        let start = bi * block;
        let add = self.bwt[start..pos].iter().filter(|&&ch| ch == c).count() as u32;
        base + add
    }

    /// 在区间 [l, r) 上向左扩展字符 c 后的新区间
    #[inline]
    pub fn rank_range(&self, c: u8, l: usize, r: usize) -> (usize, usize) {
        let c0 = self.c[c as usize] as usize;
        let nl = c0 + self.occ(c, l) as usize;
        let nr = c0 + self.occ(c, r) as usize;
        (nl, nr)
    }

    /// 反向搜索精确匹配，pat 为编码后的字母（不应包含 0）。
    /// 返回非空 SA 区间 [l, r)，无匹配时返回 None。
    pub fn backward_search(&self, pat: &[u8]) -> Option<(usize, usize)> {
        if self.bwt.is_empty() || pat.is_empty() { return None; }
        let mut l = 0usize;
        let mut r = self.bwt.len();
        for &a in pat.iter().rev() {
            if a == 0 || a >= self.sigma { return None; }
            let (nl, nr) = self.rank_range(a, l, r);
            if nl >= nr { return None; }
            l = nl;
            r = nr;
        }
        Some((l, r))
    }

    pub fn sa_interval_positions(&self, l: usize, r: usize) -> &[u32] {
        &self.sa[l..r]
    }

    /// 将文本位置映射到 (segment_index, segment_offset)；落在分隔符上时返回 None。
    pub fn map_text_pos(&self, pos: u32) -> Option<(usize, u32)> {
        let idx = self.segments.partition_point(|s| s.offset + s.len <= pos);
        let s = self.segments.get(idx)?;
        if pos < s.offset {
            return None;
        }
        Some((idx, pos - s.offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{bwt, sa};
    use crate::util::dna;

    fn build(seqs: &[&[u8]], block: usize) -> FMIndex {
        let mut text = Vec::new();
        let mut segments = Vec::new();
        for s in seqs {
            let offset = text.len() as u32;
            text.extend(s.iter().map(|&b| dna::to_alphabet(b)));
            segments.push(Segment { offset, len: s.len() as u32 });
            text.push(0);
        }
        let sa_arr = sa::build_sa(&text);
        let bwt_arr = bwt::build_bwt(&text, &sa_arr);
        FMIndex::build(bwt_arr, sa_arr, segments, dna::SIGMA as u8, block)
    }

    fn encode(s: &[u8]) -> Vec<u8> {
        s.iter().map(|&b| dna::to_alphabet(b)).collect()
    }

    #[test]
    fn occ_matches_linear_scan() {
        let fm = build(&[b"ACGTTGCAACGT", b"GGGACT"], 3);
        for c in 0..dna::SIGMA as u8 {
            for pos in 0..=fm.len() {
                let expected = fm.bwt[..pos].iter().filter(|&&x| x == c).count() as u32;
                assert_eq!(fm.occ(c, pos), expected, "c={} pos={}", c, pos);
            }
        }
    }

    #[test]
    fn backward_search_finds_all_occurrences() {
        let fm = build(&[b"ACGTACGT", b"TTACGA"], 4);
        let (l, r) = fm.backward_search(&encode(b"ACG")).unwrap();
        let mut hits: Vec<(usize, u32)> = fm
            .sa_interval_positions(l, r)
            .iter()
            .filter_map(|&p| fm.map_text_pos(p))
            .collect();
        hits.sort_unstable();
        assert_eq!(hits, vec![(0, 0), (0, 4), (1, 2)]);
        assert!(fm.backward_search(&encode(b"GGGG")).is_none());
    }

    #[test]
    fn separator_positions_do_not_map() {
        let fm = build(&[b"ACGT", b"GG"], 2);
        assert_eq!(fm.map_text_pos(3), Some((0, 3)));
        assert_eq!(fm.map_text_pos(4), None);
        assert_eq!(fm.map_text_pos(5), Some((1, 0)));
        assert_eq!(fm.map_text_pos(7), None);
    }
}
