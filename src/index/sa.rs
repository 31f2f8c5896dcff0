use std::cmp::Ordering;

use log::debug;

use crate::error::{IndexError, Result};
use crate::seq::PackedSequence;
use crate::util::bits;

/// 初始键覆盖的碱基数（取 window 的高 32 位）。
const KEY_CHARS: usize = 16;

/// 比较 `seq` 的两个后缀，末尾视为带 `$`（比任何碱基都小）。
pub fn suffix_cmp<W: AsRef<[u64]>>(seq: &PackedSequence<W>, a: usize, b: usize) -> Ordering {
    let n = seq.len();
    let (a, b) = (a.min(n), b.min(n));
    let mut off = 0;
    loop {
        let la = n - a - off.min(n - a);
        let lb = n - b - off.min(n - b);
        if la == 0 || lb == 0 {
            return la.cmp(&lb);
        }
        let take = la.min(lb).min(32);
        let mask = bits::prefix_mask(take);
        let wa = seq.window((a + off) as i64) & mask;
        let wb = seq.window((b + off) as i64) & mask;
        if wa != wb {
            return wa.cmp(&wb);
        }
        off += take;
    }
}

/// 对 packed 序列构建后缀数组（倍增法，O(n log n) 次排序）。
///
/// 返回 n+1 个位置：位置 n 是虚拟的 `$` 后缀，总排在第一位。
/// 初始键取每个后缀的前 16 个碱基加上截断长度，之后每轮把比较的前缀长度翻倍，
/// 直到所有 rank 互不相同。
pub fn build_sa<W: AsRef<[u64]>>(seq: &PackedSequence<W>) -> Result<Vec<u32>> {
    let n = seq.len();
    let total = n + 1;
    if u32::try_from(total).is_err() {
        return Err(IndexError::AddressOverflow(n));
    }

    // 键 = 16 碱基前缀 << 5 | 剩余长度；$ 的键为 0
    let key = |i: usize| -> u64 {
        if i == n {
            0
        } else {
            let prefix = seq.window(i as i64) >> 32;
            let len = (n - i).min(KEY_CHARS) as u64;
            (prefix << 5) | len
        }
    };
    let mut sa: Vec<u32> = (0..total as u32).collect();
    sa.sort_unstable_by_key(|&i| key(i as usize));

    let mut rank: Vec<u32> = vec![0; total];
    let mut distinct = assign_ranks(&sa, &mut rank, |i| key(i as usize));

    let mut h = KEY_CHARS;
    let mut round = 0;
    while distinct < total {
        let next_of = |r: &[u32], i: usize| -> u64 {
            if i + h <= n {
                r[i + h] as u64 + 1
            } else {
                0
            }
        };
        {
            let r = &rank;
            sa.sort_unstable_by_key(|&i| (r[i as usize], next_of(r, i as usize)));
        }
        let snapshot = rank.clone();
        distinct = assign_ranks(&sa, &mut rank, |i| {
            ((snapshot[i as usize] as u64) << 33) | next_of(&snapshot, i as usize)
        });
        round += 1;
        debug!("suffix sort round {round}: h = {h}, {distinct} of {total} ranks distinct");
        h <<= 1;
    }
    Ok(sa)
}

/// 按排序后的顺序给出稠密 rank，相同键共享 rank；返回不同 rank 的数量。
fn assign_ranks(sa: &[u32], rank: &mut [u32], key: impl Fn(u32) -> u64) -> usize {
    let mut current = 0u32;
    let mut prev = None;
    for &i in sa {
        let k = key(i);
        if let Some(p) = prev {
            if p != k {
                current += 1;
            }
        }
        rank[i as usize] = current;
        prev = Some(k);
    }
    if sa.is_empty() {
        0
    } else {
        current as usize + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive_sa(text: &str) -> Vec<u32> {
        // '$' 在 ASCII 中小于 ACGT
        let t = format!("{text}$");
        let mut idx: Vec<u32> = (0..t.len() as u32).collect();
        idx.sort_by(|&a, &b| t[a as usize..].cmp(&t[b as usize..]));
        idx
    }

    fn make_text(len: usize, seed: u32) -> String {
        let mut x = seed;
        (0..len)
            .map(|_| {
                x = x.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                b"ACGT"[(x >> 16) as usize % 4] as char
            })
            .collect()
    }

    #[test]
    fn sa_basic() {
        let seq = PackedSequence::from("ACGT");
        // $, ACGT$, CGT$, GT$, T$
        assert_eq!(build_sa(&seq).unwrap(), vec![4, 0, 1, 2, 3]);
        assert_eq!(build_sa(&PackedSequence::new()).unwrap(), vec![0]);
    }

    #[test]
    fn sa_matches_naive_on_small_random_texts() {
        for len in 1..=40 {
            let text = make_text(len, len as u32 * 31);
            let seq = PackedSequence::from(text.as_str());
            assert_eq!(build_sa(&seq).unwrap(), naive_sa(&text), "mismatch on len={len}");
        }
    }

    #[test]
    fn sa_handles_repeats_and_homopolymers() {
        for text in ["AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA", "ACACACACACACACACACACACACACACACACACAC", "TTTTTTTTTTTTTTTTTA"] {
            let seq = PackedSequence::from(text);
            assert_eq!(build_sa(&seq).unwrap(), naive_sa(text), "{text}");
        }
        let long = make_text(600, 17).repeat(3);
        let seq = PackedSequence::from(long.as_str());
        assert_eq!(build_sa(&seq).unwrap(), naive_sa(&long));
    }

    #[test]
    fn suffix_cmp_treats_end_as_smallest() {
        let seq = PackedSequence::from("ACAAC");
        assert_eq!(suffix_cmp(&seq, 3, 0), Ordering::Less); // AC$ vs ACAAC$
        assert_eq!(suffix_cmp(&seq, 2, 3), Ordering::Less); // AAC$ vs AC$
        assert_eq!(suffix_cmp(&seq, 5, 4), Ordering::Less); // $ vs C$
        assert_eq!(suffix_cmp(&seq, 1, 1), Ordering::Equal);
    }
}
