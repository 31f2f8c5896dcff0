use crate::error::Result;
use crate::index::sa;
use crate::seq::PackedSequence;
use crate::util::dna;

/// Burrows-Wheeler transform of `seq` with a virtual `$` terminator.
///
/// Returns the n+1 BWT symbols packed as bases and the row holding `$`
/// (`inverse_sa0`). That row is packed as 'A' and must be masked by callers.
pub fn bwt<W: AsRef<[u64]>>(seq: &PackedSequence<W>) -> Result<(PackedSequence, usize)> {
    let sa = sa::build_sa(seq)?;
    Ok(bwt_from_sa(seq, &sa))
}

/// Same as [`bwt`], reusing a suffix array already built by
/// [`sa::build_sa`].
pub fn bwt_from_sa<W: AsRef<[u64]>>(seq: &PackedSequence<W>, sa: &[u32]) -> (PackedSequence, usize) {
    let mut inverse_sa0 = 0;
    let mut codes = Vec::with_capacity(sa.len());
    for (row, &p) in sa.iter().enumerate() {
        if p == 0 {
            inverse_sa0 = row;
            codes.push(0);
        } else {
            codes.push(seq.code(p as usize - 1));
        }
    }
    let mut out = PackedSequence::new();
    out.append_codes(codes);
    (out, inverse_sa0)
}

/// Invert [`bwt`]. A stable counting sort of the last column gives the first
/// column; following it from the `$` row spells the text front to back.
pub fn ibwt<W: AsRef<[u64]>>(bwt: &PackedSequence<W>, inverse_sa0: usize) -> PackedSequence {
    let rows = bwt.len();
    if rows == 0 {
        return PackedSequence::new();
    }
    // $ sorts first as symbol 0, bases shift up by one
    let symbol = |row: usize| -> usize {
        if row == inverse_sa0 {
            0
        } else {
            bwt.code(row) as usize + 1
        }
    };
    let mut starts = [0usize; dna::SIGMA + 1];
    for row in 0..rows {
        starts[symbol(row)] += 1;
    }
    let mut acc = 0;
    for s in starts.iter_mut() {
        let count = *s;
        *s = acc;
        acc += count;
    }
    // first[r] = (symbol, last-column row it came from)
    let mut first = vec![(0u8, 0usize); rows];
    for row in 0..rows {
        let s = symbol(row);
        first[starts[s]] = (s as u8, row);
        starts[s] += 1;
    }

    let mut out = PackedSequence::new();
    let mut row = inverse_sa0;
    out.append_codes((0..rows - 1).map(|_| {
        let (s, next) = first[row];
        row = next;
        s.saturating_sub(1)
    }));
    out
}

/// Render a BWT with its `$`.
pub fn render<W: AsRef<[u64]>>(bwt: &PackedSequence<W>, inverse_sa0: usize) -> String {
    (0..bwt.len())
        .map(|row| if row == inverse_sa0 { '$' } else { bwt.get(row) })
        .collect()
}
