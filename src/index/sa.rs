/// 构建后缀数组（前缀倍增 + 计数排序，O(n log n)）。
/// 输入为数值化的文本（0:$,1:A,2:C,3:G,4:T,5:N），
/// 文本中可以有多个 0，作为不同 read 之间的分隔符。
pub fn build_sa(text: &[u8]) -> Vec<u32> {
    let n = text.len();
    if n == 0 {
        return Vec::new();
    }

    // 初始 rank 就是字符本身（+1，0 预留给越界）
    let mut rank: Vec<usize> = text.iter().map(|&b| b as usize + 1).collect();
    let mut sa: Vec<usize> = (0..n).collect();
    let mut tmp_sa = vec![0usize; n];
    let mut tmp_rank = vec![0usize; n];
    let mut classes = rank.iter().copied().max().unwrap_or(0) + 1;

    let mut k = 1usize;
    loop {
        let second = |i: usize, rank: &[usize]| if i + k < n { rank[i + k] } else { 0 };

        // 先按第二关键字计数排序，再按第一关键字稳定计数排序
        counting_sort(&sa, &mut tmp_sa, classes, |i| second(i, &rank[..]));
        counting_sort(&tmp_sa, &mut sa, classes, |i| rank[i]);

        tmp_rank[sa[0]] = 1;
        for w in 1..n {
            let (a, b) = (sa[w - 1], sa[w]);
            let same = rank[a] == rank[b] && second(a, &rank[..]) == second(b, &rank[..]);
            tmp_rank[b] = tmp_rank[a] + usize::from(!same);
        }
        std::mem::swap(&mut rank, &mut tmp_rank);
        classes = rank[sa[n - 1]] + 1;

        if rank[sa[n - 1]] == n || k >= n {
            break;
        }
        k <<= 1;
    }

    sa.into_iter().map(|x| x as u32).collect()
}

fn counting_sort<F: Fn(usize) -> usize>(src: &[usize], dst: &mut [usize], classes: usize, key: F) {
    let mut count = vec![0usize; classes + 1];
    for &i in src {
        count[key(i)] += 1;
    }
    let mut acc = 0usize;
    for c in count.iter_mut() {
        let v = *c;
        *c = acc;
        acc += v;
    }
    for &i in src {
        let k = key(i);
        dst[count[k]] = i;
        count[k] += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive_sa(text: &[u8]) -> Vec<u32> {
        let n = text.len();
        let mut suffixes: Vec<(usize, &[u8])> = (0..n).map(|i| (i, &text[i..])).collect();
        suffixes.sort_by(|a, b| a.1.cmp(b.1));
        suffixes.into_iter().map(|(i, _)| i as u32).collect()
    }

    fn make_text(len: usize, seed: u32) -> Vec<u8> {
        let mut x: u32 = seed;
        let mut v = Vec::with_capacity(len);
        for _ in 0..len {
            x = x.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            v.push(((x >> 16) % 6) as u8);
        }
        v
    }

    #[test]
    fn sa_basic() {
        // A C G T $  -> 1 2 3 4 0
        let text = [1u8, 2, 3, 4, 0];
        assert_eq!(build_sa(&text), vec![4, 0, 1, 2, 3]);
    }

    #[test]
    fn sa_matches_naive_on_small_random_texts() {
        for len in 1..=40 {
            for seed in [7u32, 1_234_567] {
                let text = make_text(len, seed);
                assert_eq!(build_sa(&text), naive_sa(&text), "mismatch on len={} seed={}", len, seed);
            }
        }
    }

    #[test]
    fn sa_handles_multiple_separators_and_repeats() {
        let text = [1u8, 2, 0, 3, 0, 1, 1, 1, 1, 0];
        assert_eq!(build_sa(&text), naive_sa(&text));
    }
}
