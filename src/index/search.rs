//! 全部 read 的精确匹配索引：`read_0 $ read_1 $ ...` 上的 FM 索引。

use tracing::debug;

use crate::error::{AssemblyError, Result};
use crate::index::fm::{FMIndex, Segment};
use crate::index::{bwt, sa};
use crate::io::reads::SequenceStore;
use crate::util::dna;

/// Occ 采样块大小
const OCC_BLOCK: usize = 64;

/// 一次命中：read id 与其中的 0-based 起点
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SearchHit {
    pub sequence_idx: usize,
    pub start: usize,
}

#[derive(Debug)]
pub struct ReadIndex {
    fm: FMIndex,
}

impl ReadIndex {
    pub fn build(store: &SequenceStore) -> Self {
        let mut text = Vec::with_capacity(store.total_bases() + store.len());
        let mut segments = Vec::with_capacity(store.len());
        for s in store.iter() {
            let offset = text.len() as u32;
            text.extend(s.seq.iter().map(|&b| dna::to_alphabet(b)));
            segments.push(Segment { offset, len: s.len() as u32 });
            text.push(0);
        }
        let sa_arr = sa::build_sa(&text);
        let bwt_arr = bwt::build_bwt(&text, &sa_arr);
        debug!("FM index built over {} symbols in {} reads", text.len(), segments.len());
        Self { fm: FMIndex::build(bwt_arr, sa_arr, segments, dna::SIGMA as u8, OCC_BLOCK) }
    }

    pub fn num_sequences(&self) -> usize {
        self.fm.segments().len()
    }

    /// 返回 `kmer` 的全部出现位置，按 (read, 起点) 升序。
    /// 含 ACGTN 以外符号的查询返回 `InvalidInput`。
    pub fn exact_search(&self, kmer: &[u8]) -> Result<Vec<SearchHit>> {
        let pat = kmer
            .iter()
            .map(|&b| dna::to_alphabet_strict(b))
            .collect::<Option<Vec<u8>>>()
            .ok_or_else(|| {
                AssemblyError::InvalidInput(format!("unsupported symbol in query '{}'", String::from_utf8_lossy(kmer)))
            })?;

        let Some((l, r)) = self.fm.backward_search(&pat) else {
            return Ok(Vec::new());
        };
        let mut hits: Vec<SearchHit> = self
            .fm
            .sa_interval_positions(l, r)
            .iter()
            .filter_map(|&p| self.fm.map_text_pos(p))
            .map(|(idx, off)| SearchHit { sequence_idx: idx, start: off as usize })
            .collect();
        hits.sort_unstable();
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::reads::Sequence;

    fn store() -> SequenceStore {
        SequenceStore::new(vec![
            Sequence::new("r0", "ACGTACGTTT"),
            Sequence::new("r1", "GGACGTNA"),
            Sequence::new("r2", "TTTT"),
        ])
    }

    #[test]
    fn finds_every_occurrence() {
        let index = ReadIndex::build(&store());
        assert_eq!(index.num_sequences(), 3);
        let hits = index.exact_search(b"ACGT").unwrap();
        assert_eq!(
            hits,
            vec![
                SearchHit { sequence_idx: 0, start: 0 },
                SearchHit { sequence_idx: 0, start: 4 },
                SearchHit { sequence_idx: 1, start: 2 },
            ]
        );
        assert_eq!(index.exact_search(b"acgt").unwrap().len(), 3);
    }

    #[test]
    fn matches_never_span_two_reads() {
        let index = ReadIndex::build(&store());
        // r0 以 TTT 结尾，r2 为 TTTT：跨界的 TTTTT 不应出现
        assert!(index.exact_search(b"TTTTT").unwrap().is_empty());
        assert_eq!(index.exact_search(b"TTTT").unwrap(), vec![SearchHit { sequence_idx: 2, start: 0 }]);
        assert_eq!(index.exact_search(b"GTNA").unwrap(), vec![SearchHit { sequence_idx: 1, start: 4 }]);
    }

    #[test]
    fn rejects_unsupported_symbols() {
        let index = ReadIndex::build(&store());
        let err = index.exact_search(b"AC-T").unwrap_err();
        assert!(matches!(err, AssemblyError::InvalidInput(_)));
        assert!(index.exact_search(b"").unwrap().is_empty());
    }
}
