/// Number of distinct packed codes {0:A, 1:C, 2:G, 3:T}.
pub const SIGMA: usize = 4;

/// Bytes at or below ASCII space are skipped by every appender.
#[inline]
pub fn is_whitespace(b: u8) -> bool {
    b <= b' '
}

#[inline]
pub fn is_base(b: u8) -> bool {
    matches!(b.to_ascii_uppercase(), b'A' | b'C' | b'G' | b'T')
}

/// Map an ASCII base to its 2-bit code. Anything that is not ACGT packs as 0.
#[inline]
pub fn to_code(b: u8) -> u8 {
    match b.to_ascii_uppercase() {
        b'C' => 1,
        b'G' => 2,
        b'T' => 3,
        _ => 0,
    }
}

#[inline]
pub fn from_code(code: u8) -> u8 {
    b"ACGT"[(code & 3) as usize]
}

/// Complement a pure base; annotation bytes (N, IUPAC codes) pass through.
#[inline]
pub fn complement(base: u8) -> u8 {
    if is_base(base) {
        from_code(3 - to_code(base))
    } else {
        base
    }
}

pub fn revcomp(seq: &[u8]) -> Vec<u8> {
    seq.iter().rev().map(|&b| complement(b)).collect()
}

/// k-mer value of `seq[pos..pos + k]`, most significant base first.
pub fn kmer_value(seq: &[u8], pos: usize, k: usize) -> u64 {
    seq[pos..pos + k]
        .iter()
        .fold(0u64, |acc, &b| (acc << 2) | to_code(b) as u64)
}

/// Render a right-justified k-mer value as ASCII.
pub fn kmer_to_string(value: u64, k: usize) -> String {
    (0..k)
        .map(|i| from_code(((value >> ((k - 1 - i) * 2)) & 3) as u8) as char)
        .collect()
}
