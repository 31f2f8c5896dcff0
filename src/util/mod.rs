pub mod bits;
pub mod dna;
