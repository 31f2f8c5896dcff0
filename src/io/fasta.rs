//! FASTA records borrowed straight out of a byte range (usually a mapped
//! file). Sequence bytes keep their line breaks; appenders skip whitespace.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FastaRecord<'a> {
    /// Whole header line without '>', trimmed.
    pub header: &'a [u8],
    pub id: &'a [u8],
    pub desc: Option<&'a [u8]>,
    pub seq: &'a [u8],
}

pub struct FastaReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> FastaReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn line_end(&self, from: usize) -> usize {
        self.data[from..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(self.data.len(), |i| from + i)
    }

    pub fn next_record(&mut self) -> Option<FastaRecord<'a>> {
        // skip to the next header
        while self.pos < self.data.len() && self.data[self.pos] != b'>' {
            self.pos = self.line_end(self.pos) + 1;
        }
        if self.pos >= self.data.len() {
            return None;
        }

        let header_end = self.line_end(self.pos);
        let header = self.data[self.pos + 1..header_end].trim_ascii();
        let (id, desc) = match header.iter().position(|b| b.is_ascii_whitespace()) {
            Some(i) => {
                let d = header[i..].trim_ascii();
                (&header[..i], (!d.is_empty()).then_some(d))
            }
            None => (header, None),
        };

        // sequence runs until the next line that starts with '>'
        let seq_start = (header_end + 1).min(self.data.len());
        let mut end = seq_start;
        while end < self.data.len() && self.data[end] != b'>' {
            end = self.line_end(end) + 1;
        }
        let end = end.min(self.data.len());
        self.pos = end;

        Some(FastaRecord { header, id, desc, seq: &self.data[seq_start..end] })
    }
}

impl<'a> Iterator for FastaReader<'a> {
    type Item = FastaRecord<'a>;

    fn next(&mut self) -> Option<FastaRecord<'a>> {
        self.next_record()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bases(seq: &[u8]) -> Vec<u8> {
        seq.iter().filter(|b| !b.is_ascii_whitespace()).map(u8::to_ascii_uppercase).collect()
    }

    #[test]
    fn parse_simple_fasta() {
        let data = b">chr1 first\nACgTNN\n>chr2\nAAA\n";
        let mut r = FastaReader::new(data);

        let r1 = r.next_record().unwrap();
        assert_eq!(r1.header, b"chr1 first");
        assert_eq!(r1.id, b"chr1");
        assert_eq!(r1.desc, Some(&b"first"[..]));
        assert_eq!(bases(r1.seq), b"ACGTNN");

        let r2 = r.next_record().unwrap();
        assert_eq!(r2.id, b"chr2");
        assert_eq!(r2.header, b"chr2");
        assert_eq!(r2.desc, None);
        assert_eq!(r2.seq, b"AAA\n");

        assert!(r.next_record().is_none());
    }

    #[test]
    fn parse_fasta_with_crlf_and_whitespace() {
        let data = b">chr1 desc\r\nAC g t n\r\n acgt\r\n>chr2 \r\n N N N \r\n";
        let records: Vec<_> = FastaReader::new(data).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, b"chr1");
        assert_eq!(records[0].desc, Some(&b"desc"[..]));
        assert_eq!(records[1].header, b"chr2");
        assert_eq!(bases(records[0].seq), b"ACGTNACGT");
        assert_eq!(records[1].id, b"chr2");
        assert_eq!(records[1].desc, None);
        assert_eq!(bases(records[1].seq), b"NNN");
    }

    #[test]
    fn skips_leading_junk_and_handles_missing_newline() {
        let data = b"\n\nstray\n>chr1\nACGT";
        let mut r = FastaReader::new(data);
        let r1 = r.next_record().unwrap();
        assert_eq!(r1.id, b"chr1");
        assert_eq!(r1.seq, b"ACGT");
        assert!(r.next_record().is_none());

        let empty: Vec<_> = FastaReader::new(b">only-header").collect();
        assert_eq!(empty.len(), 1);
        assert!(empty[0].seq.is_empty());
    }
}
