pub mod binary;
pub mod fasta;
pub mod fastq;
