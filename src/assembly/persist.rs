//! 组装图的持久化：gzip 压缩的 bincode 文档，read 以名称引用。

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::assembly::graph::{AssemblyEdge, AssemblyEmbedded, AssemblyGraph, AssemblyVertex};
use crate::error::{AssemblyError, Result};
use crate::io::reads::SequenceStore;

pub const GRAPH_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EdgeRecord {
    read1: String,
    start1: bool,
    read2: String,
    start2: bool,
    overlap: usize,
    mismatches: usize,
    num_shared_kmers: usize,
    coverage_shared_kmers: usize,
    weighted_coverage_shared_kmers: f64,
    overlap_sd: f64,
    evidence: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EmbeddedRecord {
    seq: String,
    host: String,
    reverse: bool,
    host_start: usize,
    host_end: usize,
    num_shared_kmers: usize,
    weighted_coverage: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct GraphFile {
    format_version: u32,
    /// RFC 3339
    created: String,
    /// (名称, 长度)，按 read id 顺序
    sequences: Vec<(String, usize)>,
    edges: Vec<EdgeRecord>,
    embedded: Vec<EmbeddedRecord>,
}

fn graph_file_error(path: &Path, e: impl std::fmt::Display) -> AssemblyError {
    AssemblyError::GraphFile(format!("{}: {}", path.display(), e))
}

/// 写出图中的重叠边与包含关系。同序列边由 read 列表隐式给出，不写入。
pub fn save(graph: &AssemblyGraph, store: &SequenceStore, path: &Path) -> Result<()> {
    let name = |read: usize| store.get(read).name.clone();
    let doc = GraphFile {
        format_version: GRAPH_FORMAT_VERSION,
        created: chrono::Utc::now().to_rfc3339(),
        sequences: store.iter().map(|s| (s.name.clone(), s.len())).collect(),
        edges: graph
            .edges()
            .filter(|e| !e.is_same_sequence_edge())
            .map(|e| EdgeRecord {
                read1: name(e.vertex1.read),
                start1: e.vertex1.is_start,
                read2: name(e.vertex2.read),
                start2: e.vertex2.is_start,
                overlap: e.overlap,
                mismatches: e.mismatches,
                num_shared_kmers: e.num_shared_kmers,
                coverage_shared_kmers: e.coverage_shared_kmers,
                weighted_coverage_shared_kmers: e.weighted_coverage_shared_kmers,
                overlap_sd: e.overlap_sd,
                evidence: e.evidence,
            })
            .collect(),
        embedded: graph
            .embedded_records()
            .map(|e| EmbeddedRecord {
                seq: name(e.seq_idx),
                host: name(e.host_idx),
                reverse: e.reverse,
                host_start: e.host_start,
                host_end: e.host_end,
                num_shared_kmers: e.num_shared_kmers,
                weighted_coverage: e.weighted_coverage,
            })
            .collect(),
    };

    let tmp = temp_path(path);
    let written = write_document(&doc, &tmp).and_then(|()| fs::rename(&tmp, path).map_err(AssemblyError::from));
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    info!(
        "Saved graph to {}: {} edges, {} embedded records",
        path.display(),
        doc.edges.len(),
        doc.embedded.len()
    );
    Ok(())
}

/// 图文件先写到同目录下的 `<path>.tmp`，成功后再改名
fn temp_path(path: &Path) -> PathBuf {
    let mut s: OsString = path.as_os_str().to_owned();
    s.push(".tmp");
    PathBuf::from(s)
}

fn write_document(doc: &GraphFile, path: &Path) -> Result<()> {
    let mut gz = GzEncoder::new(BufWriter::new(File::create(path)?), Compression::default());
    bincode::serialize_into(&mut gz, doc).map_err(|e| graph_file_error(path, e))?;
    let file = gz.finish()?.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(())
}

fn read_document(path: &Path) -> Result<GraphFile> {
    let file = File::open(path)?;
    let doc: GraphFile =
        bincode::deserialize_from(GzDecoder::new(BufReader::new(file))).map_err(|e| graph_file_error(path, e))?;
    if doc.format_version != GRAPH_FORMAT_VERSION {
        return Err(graph_file_error(path, format!("unsupported format version {}", doc.format_version)));
    }
    Ok(doc)
}

/// 读取图文件中记录的 (名称, 长度)，不需要 read 本身
pub fn load_sequence_names(path: &Path) -> Result<Vec<(String, usize)>> {
    Ok(read_document(path)?.sequences)
}

/// 按名称把图文件解析到给定的 read 上，并剪除被包含的 read。
pub fn load(store: &SequenceStore, path: &Path) -> Result<AssemblyGraph> {
    let doc = read_document(path)?;
    let names = store.name_index();
    let resolve = |name: &str| {
        names
            .get(name)
            .copied()
            .ok_or_else(|| AssemblyError::Input(format!("graph file {} refers to unknown read {}", path.display(), name)))
    };

    for (name, len) in &doc.sequences {
        if let Some(&idx) = names.get(name.as_str()) {
            if store.get(idx).len() != *len {
                warn!("Read {} has length {} but the graph file recorded {}", name, store.get(idx).len(), len);
            }
        }
    }

    let mut graph = AssemblyGraph::new(store);
    for rec in &doc.edges {
        let v1 = AssemblyVertex::new(resolve(&rec.read1)?, rec.start1);
        let v2 = AssemblyVertex::new(resolve(&rec.read2)?, rec.start2);
        let mut edge = AssemblyEdge::new(v1, v2, rec.overlap);
        edge.mismatches = rec.mismatches;
        edge.num_shared_kmers = rec.num_shared_kmers;
        edge.coverage_shared_kmers = rec.coverage_shared_kmers;
        edge.weighted_coverage_shared_kmers = rec.weighted_coverage_shared_kmers;
        edge.overlap_sd = rec.overlap_sd;
        edge.evidence = rec.evidence;
        graph.add_edge(edge);
    }
    for rec in &doc.embedded {
        graph.add_embedded(AssemblyEmbedded {
            seq_idx: resolve(&rec.seq)?,
            host_idx: resolve(&rec.host)?,
            reverse: rec.reverse,
            host_start: rec.host_start,
            host_end: rec.host_end,
            num_shared_kmers: rec.num_shared_kmers,
            weighted_coverage: rec.weighted_coverage,
        });
    }
    graph.prune_embedded_sequences();
    info!(
        "Loaded graph created {} from {}: {} vertices, {} edges, {} embedded reads",
        doc.created,
        path.display(),
        graph.num_vertices(),
        graph.num_edges(),
        graph.embedded_count()
    );
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use crate::assembly::graph::vertex_id;
    use crate::io::reads::Sequence;

    fn store() -> SequenceStore {
        SequenceStore::new(vec![
            Sequence::new("a", vec![b'A'; 300]),
            Sequence::new("b", vec![b'C'; 250]),
            Sequence::new("c", vec![b'G'; 100]),
        ])
    }

    fn sample_graph(store: &SequenceStore) -> AssemblyGraph {
        let mut g = AssemblyGraph::new(store);
        let mut e = AssemblyEdge::new(AssemblyVertex::new(0, false), AssemblyVertex::new(1, true), 120);
        e.num_shared_kmers = 17;
        e.coverage_shared_kmers = 110;
        e.weighted_coverage_shared_kmers = 98.5;
        e.overlap_sd = 1.5;
        e.evidence = 2;
        e.mismatches = 3;
        g.add_edge(e);
        let mut e = AssemblyEdge::new(AssemblyVertex::new(2, true), AssemblyVertex::new(1, false), 60);
        e.num_shared_kmers = 8;
        e.coverage_shared_kmers = 50;
        g.add_edge(e);
        g.add_embedded(AssemblyEmbedded {
            seq_idx: 2,
            host_idx: 0,
            reverse: true,
            host_start: 20,
            host_end: 119,
            num_shared_kmers: 12,
            weighted_coverage: 60.0,
        });
        g
    }

    #[test]
    fn saved_graph_loads_with_same_evidence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reads.graph.gz");
        let s = store();
        let g = sample_graph(&s);
        save(&g, &s, &path).unwrap();

        let loaded = load(&s, &path).unwrap();
        let e = loaded.edge(vertex_id(0, false), vertex_id(1, true)).unwrap();
        let orig = g.edge(vertex_id(0, false), vertex_id(1, true)).unwrap();
        assert_eq!(e, orig);
        assert_eq!(loaded.embedded_by_seq(2), g.embedded_by_seq(2));
        // 被包含的 c 在加载后被剪除
        assert!(loaded.vertex(vertex_id(2, true)).is_none());
        assert!(loaded.edge(vertex_id(2, true), vertex_id(1, false)).is_none());
        assert_eq!(loaded.num_edges(), 3);
    }

    #[test]
    fn save_replaces_the_file_without_leaving_temporaries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reads.graph.gz");
        let s = store();
        fs::write(&path, b"stale").unwrap();
        save(&sample_graph(&s), &s, &path).unwrap();
        assert!(!temp_path(&path).exists());
        assert_eq!(load(&s, &path).unwrap().num_edges(), 3);

        // 目标是目录时改名失败，临时文件也被清理
        let blocked = dir.path().join("blocked.graph.gz");
        fs::create_dir(&blocked).unwrap();
        assert!(save(&sample_graph(&s), &s, &blocked).is_err());
        assert!(!temp_path(&blocked).exists());
        assert!(blocked.is_dir());
    }

    #[test]
    fn names_resolve_regardless_of_read_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g.gz");
        let s = store();
        save(&sample_graph(&s), &s, &path).unwrap();

        let reordered = SequenceStore::new(vec![s.get(1).clone(), s.get(0).clone(), s.get(2).clone()]);
        let loaded = load(&reordered, &path).unwrap();
        // a 现在是 read 1，b 是 read 0
        let e = loaded.edge(vertex_id(1, false), vertex_id(0, true)).unwrap();
        assert_eq!(e.overlap, 120);
        assert_eq!(loaded.embedded_by_seq(2)[0].host_idx, 1);
    }

    #[test]
    fn unknown_read_name_is_an_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g.gz");
        let s = store();
        save(&sample_graph(&s), &s, &path).unwrap();

        let partial = SequenceStore::new(vec![s.get(0).clone(), s.get(2).clone()]);
        let err = load(&partial, &path).unwrap_err();
        assert!(matches!(err, AssemblyError::Input(_)), "{}", err);
    }

    #[test]
    fn sequence_list_is_readable_without_reads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g.gz");
        let s = store();
        save(&sample_graph(&s), &s, &path).unwrap();
        let names = load_sequence_names(&path).unwrap();
        assert_eq!(names, vec![("a".to_string(), 300), ("b".to_string(), 250), ("c".to_string(), 100)]);
    }

    #[test]
    fn corrupt_file_is_a_graph_file_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.gz");
        let mut gz = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        gz.write_all(b"not a graph").unwrap();
        gz.finish().unwrap();
        assert!(matches!(load(&store(), &path), Err(AssemblyError::GraphFile(_))));
        assert!(matches!(load(&store(), &dir.path().join("missing.gz")), Err(AssemblyError::Io(_))));
    }
}
