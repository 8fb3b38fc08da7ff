use anyhow::{bail, Result};
use std::io::{BufRead, Write};

/// 一条 FASTA 记录；名称取 `>` 后第一个空白之前的部分。
#[derive(Debug, Clone)]
pub struct FastaRecord {
    pub name: String,
    pub seq: Vec<u8>,
}

/// 按字节读取的 FASTA 解析器，允许多行序列、CRLF 与行内空白。
pub struct FastaReader<R: BufRead> {
    reader: R,
    line: Vec<u8>,
    /// 已读到但尚未消费的下一条记录头
    pending_name: Option<String>,
    line_no: usize,
}

fn header_name(line: &[u8]) -> String {
    let text = String::from_utf8_lossy(&line[1..]);
    text.split_whitespace().next().unwrap_or("").to_string()
}

impl<R: BufRead> FastaReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, line: Vec::new(), pending_name: None, line_no: 0 }
    }

    /// 读一行到 `self.line`，返回 false 表示已到文件末尾
    fn fill_line(&mut self) -> Result<bool> {
        self.line.clear();
        let n = self.reader.read_until(b'\n', &mut self.line)?;
        self.line_no += 1;
        Ok(n > 0)
    }

    pub fn next_record(&mut self) -> Result<Option<FastaRecord>> {
        let name = match self.pending_name.take() {
            Some(name) => name,
            None => loop {
                if !self.fill_line()? {
                    return Ok(None);
                }
                match self.line.first() {
                    Some(b'>') => break header_name(&self.line),
                    _ if self.line.iter().all(u8::is_ascii_whitespace) => continue,
                    _ => bail!("line {}: sequence data before the first FASTA header", self.line_no),
                }
            },
        };

        let mut seq: Vec<u8> = Vec::new();
        while self.fill_line()? {
            if self.line.first() == Some(&b'>') {
                self.pending_name = Some(header_name(&self.line));
                break;
            }
            seq.extend(self.line.iter().filter(|b| !b.is_ascii_whitespace()).map(u8::to_ascii_uppercase));
        }
        Ok(Some(FastaRecord { name, seq }))
    }
}

/// FASTA 输出，序列按固定宽度折行（0 表示不折行）。
pub struct FastaWriter<W: Write> {
    writer: W,
    line_width: usize,
}

impl<W: Write> FastaWriter<W> {
    pub fn new(writer: W, line_width: usize) -> Self {
        Self { writer, line_width }
    }

    pub fn write_record(&mut self, name: &str, seq: &[u8]) -> Result<()> {
        writeln!(self.writer, ">{}", name)?;
        let width = if self.line_width == 0 { seq.len().max(1) } else { self.line_width };
        for line in seq.chunks(width) {
            self.writer.write_all(line)?;
            self.writer.write_all(b"\n")?;
        }
        Ok(())
    }

    pub fn into_inner(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn records(data: &[u8]) -> Vec<FastaRecord> {
        let mut r = FastaReader::new(Cursor::new(data));
        let mut out = Vec::new();
        while let Some(rec) = r.next_record().unwrap() {
            out.push(rec);
        }
        out
    }

    #[test]
    fn multi_line_records_with_descriptions() {
        let recs = records(b">read1 len=6\nACgT\nNN\n>read2\nAAA\n");
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].name, "read1");
        assert_eq!(recs[0].seq, b"ACGTNN");
        assert_eq!(recs[1].name, "read2");
        assert_eq!(recs[1].seq, b"AAA");
    }

    #[test]
    fn crlf_blank_lines_and_inline_whitespace() {
        let recs = records(b"\n\r\n>r1 desc\r\nAC g t n\r\n acgt\r\n>r2 \r\n N N N \r\n");
        assert_eq!(recs[0].name, "r1");
        assert_eq!(recs[0].seq, b"ACGTNACGT");
        assert_eq!(recs[1].name, "r2");
        assert_eq!(recs[1].seq, b"NNN");
    }

    #[test]
    fn empty_record_before_next_header() {
        let recs = records(b">a\n>b\nTT\n");
        assert_eq!(recs.len(), 2);
        assert!(recs[0].seq.is_empty());
        assert_eq!(recs[1].seq, b"TT");
    }

    #[test]
    fn data_before_header_is_rejected() {
        let mut r = FastaReader::new(Cursor::new(&b"ACGT\n>a\nAC\n"[..]));
        let err = r.next_record().unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn writer_wraps_lines() {
        let mut w = FastaWriter::new(Vec::new(), 4);
        w.write_record("Contig_1", b"ACGTACGTAC").unwrap();
        w.write_record("empty", b"").unwrap();
        let out = w.into_inner().unwrap();
        assert_eq!(out, b">Contig_1\nACGT\nACGT\nAC\n>empty\n".to_vec());

        let recs = records(&out);
        assert_eq!(recs[0].seq, b"ACGTACGTAC");
        assert!(recs[1].seq.is_empty());
    }

    #[test]
    fn zero_width_writes_one_line() {
        let mut w = FastaWriter::new(Vec::new(), 0);
        w.write_record("x", b"ACGTACGT").unwrap();
        assert_eq!(w.into_inner().unwrap(), b">x\nACGTACGT\n".to_vec());
    }
}
