const NEG_INF: i32 = i32::MIN / 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwParams {
    pub match_score: i32,
    pub mismatch_penalty: i32,
    pub gap_open: i32,
    pub gap_extend: i32,
    pub band_width: usize,
}

impl Default for SwParams {
    fn default() -> Self {
        Self { match_score: 2, mismatch_penalty: 4, gap_open: 4, gap_extend: 2, band_width: 32 }
    }
}

/// 局部对齐结果，区间均为半开区间
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwResult {
    pub score: i32,
    pub query_start: usize,
    pub query_end: usize,
    pub ref_start: usize,
    pub ref_end: usize,
    /// 错配 + 插入 + 缺失碱基数
    pub nm: u32,
}

/// 带状仿射间隙 Smith-Waterman 局部对齐
pub fn banded_sw(query: &[u8], reference: &[u8], p: SwParams) -> SwResult {
    banded_sw_with_buf(query, reference, p, &mut SwBuffer::new())
}

/// DP 工作缓冲区，可跨调用复用
#[derive(Debug, Default)]
pub struct SwBuffer {
    h: Vec<i32>,
    e: Vec<i32>,
    f: Vec<i32>,
}

impl SwBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn reset(&mut self, size: usize) {
        self.h.clear();
        self.h.resize(size, 0);
        self.e.clear();
        self.e.resize(size, NEG_INF);
        self.f.clear();
        self.f.resize(size, NEG_INF);
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Op {
    Match,
    Ins,
    Del,
}

/// DP 矩阵只保存带内的对角线：第 i 行宽 `2 * band + 3`，列 j 存在 `j + band + 1 - i`，
/// 带外邻居落在从未写入的格子上（H 为 0，E/F 为负无穷）。
pub fn banded_sw_with_buf(query: &[u8], reference: &[u8], p: SwParams, buf: &mut SwBuffer) -> SwResult {
    let m = query.len();
    let n = reference.len();
    if m == 0 || n == 0 {
        return SwResult::default();
    }

    let band = p.band_width;
    let width = 2 * band + 3;
    buf.reset((m + 1) * width);
    let SwBuffer { h, e, f } = buf;

    let at = |i: usize, j: usize| i * width + j + band + 1 - i;
    let subst = |i: usize, j: usize| if query[i - 1] == reference[j - 1] { p.match_score } else { -p.mismatch_penalty };

    let (mut best_score, mut best_i, mut best_j) = (0i32, 0usize, 0usize);
    for i in 1..=m {
        let j_start = i.saturating_sub(band).max(1);
        let j_end = (i + band).min(n);
        for j in j_start..=j_end {
            let idx = at(i, j);
            let up = idx - width + 1;
            let diag = idx - width;
            let left = idx - 1;

            e[idx] = (h[up] - p.gap_open - p.gap_extend).max(e[up] - p.gap_extend);
            f[idx] = (h[left] - p.gap_open - p.gap_extend).max(f[left] - p.gap_extend);
            let val = (h[diag] + subst(i, j)).max(e[idx]).max(f[idx]).max(0);
            h[idx] = val;

            if val > best_score {
                best_score = val;
                best_i = i;
                best_j = j;
            }
        }
    }

    if best_score <= 0 {
        return SwResult::default();
    }

    let mut ops: Vec<Op> = Vec::new();
    let (mut i, mut j) = (best_i, best_j);
    while i > 0 && j > 0 {
        let idx = at(i, j);
        let here = h[idx];
        if here == 0 {
            break;
        }
        if here == h[idx - width] + subst(i, j) {
            ops.push(Op::Match);
            i -= 1;
            j -= 1;
        } else if here == e[idx] {
            ops.push(Op::Ins);
            i -= 1;
        } else if here == f[idx] {
            ops.push(Op::Del);
            j -= 1;
        } else {
            break;
        }
    }

    let (query_start, ref_start) = (i, j);
    let mut nm = 0u32;
    for op in ops.iter().rev() {
        match op {
            Op::Match => {
                if query[i] != reference[j] {
                    nm += 1;
                }
                i += 1;
                j += 1;
            }
            Op::Ins => {
                nm += 1;
                i += 1;
            }
            Op::Del => {
                nm += 1;
                j += 1;
            }
        }
    }

    SwResult { score: best_score, query_start, query_end: best_i, ref_start, ref_end: best_j, nm }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> SwParams {
        SwParams { match_score: 2, mismatch_penalty: 1, gap_open: 1, gap_extend: 0, band_width: 8 }
    }

    #[test]
    fn perfect_match() {
        let res = banded_sw(b"ACGT", b"ACGT", params());
        assert_eq!(
            res,
            SwResult { score: 8, query_start: 0, query_end: 4, ref_start: 0, ref_end: 4, nm: 0 }
        );
    }

    #[test]
    fn single_mismatch() {
        let res = banded_sw(b"AGGT", b"ACGT", params());
        assert_eq!(res.score, 3 * 2 - 1);
        assert_eq!(res.nm, 1);
        assert_eq!((res.query_end, res.ref_end), (4, 4));
    }

    #[test]
    fn single_insertion() {
        let res = banded_sw(b"ACGGT", b"ACGT", params());
        assert_eq!(res.score, 7);
        assert_eq!(res.nm, 1);
        assert_eq!((res.query_end, res.ref_end), (5, 4));
    }

    #[test]
    fn suffix_located_inside_longer_reference() {
        // 查询对齐到参考中段，ref_end 给出对齐结束位置
        let res = banded_sw(b"TTGCA", b"TTGCAGGG", params());
        assert_eq!((res.query_end, res.ref_end), (5, 5));
        assert_eq!(res.nm, 0);
    }

    #[test]
    fn empty_inputs() {
        assert_eq!(banded_sw(b"", b"ACGT", params()).score, 0);
        assert_eq!(banded_sw(b"ACGT", b"", params()).score, 0);
    }

    #[test]
    fn buffer_reuse() {
        let mut buf = SwBuffer::new();
        assert_eq!(banded_sw_with_buf(b"ACGT", b"ACGT", params(), &mut buf).score, 8);
        assert_eq!(banded_sw_with_buf(b"AGGT", b"ACGT", params(), &mut buf).nm, 1);
        assert_eq!(banded_sw_with_buf(b"ACGTACGT", b"ACGTACGT", SwParams::default(), &mut buf).score, 16);
    }

    #[test]
    fn long_alignment_keeps_only_the_band() {
        let mut x: u32 = 7;
        let query: Vec<u8> = (0..5000)
            .map(|_| {
                x = x.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                b"ACGT"[(x >> 16) as usize % 4]
            })
            .collect();
        let mut reference = query.clone();
        reference.remove(2500);

        let mut buf = SwBuffer::new();
        let res = banded_sw_with_buf(&query, &reference, SwParams::default(), &mut buf);
        assert_eq!(res.nm, 1);
        assert_eq!((res.query_start, res.query_end), (0, 5000));
        assert_eq!((res.ref_start, res.ref_end), (0, 4999));
        assert!(buf.h.len() < 5001 * (2 * 32 + 4));
    }
}
