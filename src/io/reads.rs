//! Read loading: the sequence store consumed by the assembly core.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

use ahash::AHashMap;
use flate2::read::MultiGzDecoder;
use tracing::{info, warn};

use crate::error::{AssemblyError, Result};
use crate::io::fasta::FastaReader;
use crate::io::fastq::FastqReader;
use crate::util::dna;

/// A named read. Bases are normalized to uppercase `ACGTN`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    pub name: String,
    pub seq: Vec<u8>,
}

impl Sequence {
    pub fn new(name: impl Into<String>, seq: impl AsRef<[u8]>) -> Self {
        Self { name: name.into(), seq: dna::normalize_seq(seq.as_ref()) }
    }

    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }

    pub fn reverse_complement(&self) -> Vec<u8> {
        dna::revcomp(&self.seq)
    }
}

/// Ordered reads; the position of a read is its id for the whole run.
#[derive(Debug, Clone, Default)]
pub struct SequenceStore {
    seqs: Vec<Sequence>,
}

impl SequenceStore {
    pub fn new(seqs: Vec<Sequence>) -> Self {
        Self { seqs }
    }

    pub fn len(&self) -> usize {
        self.seqs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seqs.is_empty()
    }

    pub fn get(&self, idx: usize) -> &Sequence {
        &self.seqs[idx]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sequence> {
        self.seqs.iter()
    }

    pub fn total_bases(&self) -> usize {
        self.seqs.iter().map(Sequence::len).sum()
    }

    /// Name -> id. On duplicated names the first id wins.
    pub fn name_index(&self) -> AHashMap<&str, usize> {
        let mut map = AHashMap::with_capacity(self.seqs.len());
        for (i, s) in self.seqs.iter().enumerate() {
            if map.contains_key(s.name.as_str()) {
                warn!("duplicated read name: {}", s.name);
                continue;
            }
            map.insert(s.name.as_str(), i);
        }
        map
    }

    /// Stable sort by descending length; reads of equal length keep input order.
    pub fn sort_by_length_desc(&mut self) {
        self.seqs.sort_by(|a, b| b.len().cmp(&a.len()));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadsFormat {
    Fasta,
    Fastq,
}

impl ReadsFormat {
    /// Guess the format from the file extension (`.gz` is looked through).
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        let name = name.strip_suffix(".gz").unwrap_or(&name);
        if name.ends_with(".fq") || name.ends_with(".fastq") {
            Some(ReadsFormat::Fastq)
        } else if name.ends_with(".fa") || name.ends_with(".fasta") || name.ends_with(".fna") {
            Some(ReadsFormat::Fasta)
        } else {
            None
        }
    }
}

impl FromStr for ReadsFormat {
    type Err = AssemblyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fasta" | "fa" => Ok(ReadsFormat::Fasta),
            "fastq" | "fq" => Ok(ReadsFormat::Fastq),
            _ => Err(AssemblyError::config(format!("unrecognized reads format '{}'", s))),
        }
    }
}

impl fmt::Display for ReadsFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadsFormat::Fasta => write!(f, "FASTA"),
            ReadsFormat::Fastq => write!(f, "FASTQ"),
        }
    }
}

fn open_maybe_gz(path: &Path) -> std::io::Result<Box<dyn BufRead>> {
    let file = File::open(path)?;
    let is_gz = path.extension().map(|e| e.eq_ignore_ascii_case("gz")).unwrap_or(false);
    if is_gz {
        Ok(Box::new(BufReader::with_capacity(1 << 20, MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::with_capacity(1 << 20, file)))
    }
}

/// Load reads of at least `min_len` bases, sorted by descending length.
/// Any read or parse failure discards everything loaded so far.
pub fn load_reads(path: &Path, format: ReadsFormat, min_len: usize) -> Result<SequenceStore> {
    let reader = open_maybe_gz(path)
        .map_err(|e| AssemblyError::Input(format!("cannot open '{}': {}", path.display(), e)))?;
    let mut store = read_records(reader, format, min_len)
        .map_err(|e| AssemblyError::Input(format!("'{}': {:#}", path.display(), e)))?;
    store.sort_by_length_desc();
    info!("Loaded {} sequences from {}. Total basepairs: {}", store.len(), path.display(), store.total_bases());
    Ok(store)
}

/// Parse records from any buffered reader, keeping reads of at least `min_len` bases.
pub fn read_records<R: BufRead>(reader: R, format: ReadsFormat, min_len: usize) -> anyhow::Result<SequenceStore> {
    let mut seqs = Vec::new();
    match format {
        ReadsFormat::Fasta => {
            let mut r = FastaReader::new(reader);
            while let Some(rec) = r.next_record()? {
                if rec.seq.len() >= min_len {
                    seqs.push(Sequence::new(rec.name, rec.seq));
                }
            }
        }
        ReadsFormat::Fastq => {
            let mut r = FastqReader::new(reader);
            while let Some(rec) = r.next_record()? {
                if rec.seq.len() >= min_len {
                    seqs.push(Sequence::new(rec.name, rec.seq));
                }
            }
        }
    }
    Ok(SequenceStore::new(seqs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    #[test]
    fn filters_and_sorts_stably() {
        let data = b">a\nACGT\n>b\nACGTACGT\n>c\nAC\n>d\nTTTT\n>e\nGGGGGGGG\n";
        let mut store = read_records(Cursor::new(&data[..]), ReadsFormat::Fasta, 3).unwrap();
        store.sort_by_length_desc();
        let names: Vec<&str> = store.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["b", "e", "a", "d"]);
        assert_eq!(store.total_bases(), 24);
    }

    #[test]
    fn fastq_records_are_normalized() {
        let data = b"@r1\nacgu\n+\nIIII\n";
        let store = read_records(Cursor::new(&data[..]), ReadsFormat::Fastq, 0).unwrap();
        assert_eq!(store.get(0).seq, b"ACGT");
        assert_eq!(store.get(0).reverse_complement(), b"ACGT");
    }

    #[test]
    fn malformed_fastq_is_an_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.fastq");
        std::fs::File::create(&path).unwrap().write_all(b"r1\nACGT\n+\nIIII\n").unwrap();
        let err = load_reads(&path, ReadsFormat::Fastq, 0).unwrap_err();
        assert!(matches!(err, AssemblyError::Input(_)));
    }

    #[test]
    fn gz_input_is_decoded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reads.fa.gz");
        let f = std::fs::File::create(&path).unwrap();
        let mut enc = flate2::write::GzEncoder::new(f, flate2::Compression::default());
        enc.write_all(b">x\nACGTACGT\n").unwrap();
        enc.finish().unwrap();
        assert_eq!(ReadsFormat::from_path(&path), Some(ReadsFormat::Fasta));
        let store = load_reads(&path, ReadsFormat::Fasta, 1).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(0).name, "x");
    }

    #[test]
    fn name_index_keeps_first_duplicate() {
        let store = SequenceStore::new(vec![
            Sequence::new("a", "AC"),
            Sequence::new("b", "GG"),
            Sequence::new("a", "TT"),
        ]);
        let idx = store.name_index();
        assert_eq!(idx.get("a"), Some(&0));
        assert_eq!(idx.get("b"), Some(&1));
    }
}
