//! Packed DNA containers.
//!
//! [`PackedSequence`] holds 2-bit bases and does all the word-level work;
//! [`AugmentedSequence`] layers run-length annotations (N runs, IUPAC codes)
//! over one so the original text can be recovered.

pub mod augmented;
pub mod packed;

pub use augmented::{AugmentedSequence, MappedAugmentedSequence, BLOCK_SIZE};
pub use packed::{MappedPackedSequence, PackedSequence, BASES_PER_WORD};
