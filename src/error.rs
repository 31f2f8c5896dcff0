use thiserror::Error;

/// Errors raised while building, writing or mapping an index.
///
/// Search-time outcomes such as "no match" or "too few seeds" are not errors;
/// they show up as an empty result.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("num_indexed_chars must be in [2, 32], got {0}")]
    InvalidKmerLength(usize),

    #[error("sequence of {len} bases is shorter than k = {k}")]
    SequenceTooShort { len: usize, k: usize },

    #[error("sequence of {0} bases exceeds the 32-bit address range")]
    AddressOverflow(usize),

    #[error("a bucket table for k = {0} does not fit in memory")]
    TableTooLarge(usize),

    #[error("reference contains no sequence data")]
    EmptyReference,

    #[error("element size mismatch at byte {offset}: expected {expected}, found {found}")]
    FormatMismatch { offset: usize, expected: usize, found: u64 },

    #[error("read of {len} bytes at offset {offset} runs past the {size}-byte region")]
    BoundsOverflow { offset: usize, len: u64, size: usize },

    #[error("expected {expected} entries, found {found}")]
    LengthMismatch { expected: usize, found: usize },

    #[error("seed index entry {entry} is corrupt: {reason}")]
    CorruptIndex { entry: usize, reason: &'static str },

    #[error("data at byte {0} is not aligned for its element type")]
    Misaligned(usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IndexError>;
