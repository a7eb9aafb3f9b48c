//! FASTQ reading and writing with transparent gzip support.

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Lines, Write};
use std::path::Path;

/// One FASTQ record. `sequence` and `quality` have the same length at every
/// observable boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastqRecord {
    pub header: String,
    pub sequence: String,
    pub plus: String,
    pub quality: String,
}

fn is_gz(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "gz")
}

/// Opens a FASTQ file, decompressing on the fly when the path ends in `.gz`.
pub fn open_fastq(path: &Path) -> io::Result<Box<dyn BufRead>> {
    let file = File::open(path)?;
    if is_gz(path) {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Streaming FASTQ parser over any buffered reader.
pub struct FastqReader<B: BufRead> {
    lines: Lines<B>,
}

impl<B: BufRead> FastqReader<B> {
    pub fn new(reader: B) -> Self {
        Self {
            lines: reader.lines(),
        }
    }

    fn field(&mut self) -> io::Result<String> {
        match self.lines.next() {
            Some(line) => line,
            None => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "truncated FASTQ record",
            )),
        }
    }
}

impl<B: BufRead> Iterator for FastqReader<B> {
    type Item = io::Result<FastqRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let header = match self.lines.next()? {
            Ok(line) => line,
            Err(e) => return Some(Err(e)),
        };

        let record = (|| {
            Ok(FastqRecord {
                header,
                sequence: self.field()?,
                plus: self.field()?,
                quality: self.field()?,
            })
        })();
        Some(record)
    }
}

/// Reads a whole FASTQ(.gz) file into memory.
pub fn read_fastq(path: &Path) -> io::Result<Vec<FastqRecord>> {
    let reader = open_fastq(path)?;
    FastqReader::new(reader).collect()
}

/// Plain or gzip FASTQ writer, chosen from the output path.
pub enum FastqWriter {
    Plain(BufWriter<File>),
    Compressed(BufWriter<GzEncoder<File>>),
}

impl FastqWriter {
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        if is_gz(path) {
            let encoder = GzEncoder::new(file, Compression::default());
            Ok(FastqWriter::Compressed(BufWriter::new(encoder)))
        } else {
            Ok(FastqWriter::Plain(BufWriter::new(file)))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            FastqWriter::Plain(w) => w,
            FastqWriter::Compressed(w) => w,
        }
    }

    pub fn write_record(&mut self, record: &FastqRecord) -> io::Result<()> {
        let w = self.writer();
        writeln!(w, "{}", record.header)?;
        writeln!(w, "{}", record.sequence)?;
        writeln!(w, "{}", record.plus)?;
        writeln!(w, "{}", record.quality)?;
        Ok(())
    }

    pub fn write_all(&mut self, records: &[FastqRecord]) -> io::Result<()> {
        for record in records {
            self.write_record(record)?;
        }
        Ok(())
    }

    /// Flushes buffered output and finishes the gzip stream if there is one.
    pub fn finish(self) -> io::Result<()> {
        match self {
            FastqWriter::Plain(mut w) => w.flush(),
            FastqWriter::Compressed(w) => {
                let encoder = w.into_inner()?;
                encoder.finish()?.flush()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_records() {
        let data = "@r1\nACGT\n+\nIIII\n@r2\nGGTT\n+\nKKKK\n";
        let records: Vec<FastqRecord> = FastqReader::new(data.as_bytes())
            .collect::<io::Result<_>>()
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].header, "@r1");
        assert_eq!(records[1].sequence, "GGTT");
        assert_eq!(records[1].quality, "KKKK");
    }

    #[test]
    fn test_truncated_record_is_an_error() {
        let data = "@r1\nACGT\n+\n";
        let result: io::Result<Vec<FastqRecord>> = FastqReader::new(data.as_bytes()).collect();
        assert!(result.is_err());
    }

    #[test]
    fn test_write_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.fq");

        let records = vec![FastqRecord {
            header: "@r1".into(),
            sequence: "ACGTACGT".into(),
            plus: "+".into(),
            quality: "IIIIIIII".into(),
        }];

        let mut writer = FastqWriter::create(&path).unwrap();
        writer.write_all(&records).unwrap();
        writer.finish().unwrap();

        assert_eq!(read_fastq(&path).unwrap(), records);
    }
}
