use std::borrow::Cow;
use std::fmt;

use bytemuck::{Pod, Zeroable};

pub const NAME_LEN: usize = 80;

/// Fixed-width chromosome record. The layout is part of the binary index
/// format, so an array of these maps without parsing.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct Chromosome {
    pub name: [u8; NAME_LEN],
    /// Full FASTA header line, truncated like `name`.
    pub info: [u8; NAME_LEN],
    /// Linear offset of the first stored base.
    pub start: u64,
    /// Linear offset one past the last stored base.
    pub end: u64,
    pub num_leading_n: u64,
    pub num_trailing_n: u64,
}

/// Copy into a NUL-terminated fixed field, truncating if needed.
fn fixed_field(src: &[u8]) -> [u8; NAME_LEN] {
    let mut out = [0u8; NAME_LEN];
    let n = src.len().min(NAME_LEN - 1);
    out[..n].copy_from_slice(&src[..n]);
    out
}

fn field_str(field: &[u8; NAME_LEN]) -> Cow<'_, str> {
    let end = field.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
    String::from_utf8_lossy(&field[..end])
}

impl Chromosome {
    pub fn new(name: &[u8], info: &[u8], start: u64, end: u64) -> Self {
        Self {
            name: fixed_field(name),
            info: fixed_field(info),
            start,
            end,
            num_leading_n: 0,
            num_trailing_n: 0,
        }
    }

    pub fn name(&self) -> Cow<'_, str> {
        field_str(&self.name)
    }

    pub fn info(&self) -> Cow<'_, str> {
        field_str(&self.info)
    }

    /// Stored bases, without the stripped N runs.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    pub fn contains(&self, pos: u64) -> bool {
        (self.start..self.end).contains(&pos)
    }
}

impl Default for Chromosome {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl fmt::Debug for Chromosome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chromosome")
            .field("name", &self.name())
            .field("info", &self.info())
            .field("start", &self.start)
            .field("end", &self.end)
            .field("num_leading_n", &self.num_leading_n)
            .field("num_trailing_n", &self.num_trailing_n)
            .finish()
    }
}
