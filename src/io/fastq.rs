use anyhow::{bail, Result};
use std::io::BufRead;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastqRecord {
    pub id: String,
    pub seq: Vec<u8>,
    pub qual: Vec<u8>,
}

/// Four-line FASTQ reader. Any malformed record is an error; records are
/// never skipped, so paired files stay in step.
pub struct FastqReader<R: BufRead> {
    reader: R,
    buf: String,
    line_no: usize,
}

impl<R: BufRead> FastqReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, buf: String::new(), line_no: 0 }
    }

    /// Read one line into `buf` without its line ending; false at EOF.
    fn read_line(&mut self) -> Result<bool> {
        self.buf.clear();
        if self.reader.read_line(&mut self.buf)? == 0 {
            return Ok(false);
        }
        self.line_no += 1;
        let trimmed = self.buf.trim_end_matches(['\n', '\r']).len();
        self.buf.truncate(trimmed);
        Ok(true)
    }

    pub fn next_record(&mut self) -> Result<Option<FastqRecord>> {
        // tolerate blank lines between records
        loop {
            if !self.read_line()? {
                return Ok(None);
            }
            if !self.buf.trim().is_empty() {
                break;
            }
        }
        let Some(header) = self.buf.strip_prefix('@') else {
            bail!("line {}: FASTQ header not starting with '@'", self.line_no);
        };
        let id = header.split_whitespace().next().unwrap_or("").to_string();

        if !self.read_line()? {
            bail!("line {}: unexpected EOF after header of '{}'", self.line_no, id);
        }
        let seq = self.buf.as_bytes().to_vec();

        if !self.read_line()? || !self.buf.starts_with('+') {
            bail!("line {}: missing '+' line for '{}'", self.line_no, id);
        }

        if !self.read_line()? {
            bail!("line {}: missing quality line for '{}'", self.line_no, id);
        }
        let qual = self.buf.as_bytes().to_vec();
        if qual.len() != seq.len() {
            bail!(
                "line {}: '{}' has {} bases but {} quality values",
                self.line_no,
                id,
                seq.len(),
                qual.len()
            );
        }

        Ok(Some(FastqRecord { id, seq, qual }))
    }

    /// Up to `max` records; an empty batch means end of input.
    pub fn read_batch(&mut self, max: usize) -> Result<Vec<FastqRecord>> {
        let mut batch = Vec::with_capacity(max);
        while batch.len() < max {
            match self.next_record()? {
                Some(rec) => batch.push(rec),
                None => break,
            }
        }
        Ok(batch)
    }
}
