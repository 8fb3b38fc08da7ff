/// 根据后缀数组构建 BWT：BWT[i] = text[SA[i] - 1]（循环）。
/// text 为数值化字母表（0..SIGMA），允许多个 0 分隔符。
pub fn build_bwt(text: &[u8], sa: &[u32]) -> Vec<u8> {
    let n = text.len();
    sa.iter()
        .map(|&p| {
            let i = p as usize;
            if i == 0 { text[n - 1] } else { text[i - 1] }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::sa::build_sa;

    #[test]
    fn bwt_of_small_text() {
        // A C A $ -> 1 2 1 0; SA = [3, 2, 0, 1]
        let text = [1u8, 2, 1, 0];
        let sa = build_sa(&text);
        assert_eq!(sa, vec![3, 2, 0, 1]);
        assert_eq!(build_bwt(&text, &sa), vec![1, 2, 0, 1]);
    }

    #[test]
    fn bwt_empty() {
        assert!(build_bwt(&[], &[]).is_empty());
    }
}
