use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};

use crate::index::{bwt, sa};
use crate::seq::PackedSequence;
use crate::util::dna;

/// FM 索引的字母表：0 为 `$`，1..=4 对应 A/C/G/T。
pub const FM_SIGMA: u8 = 5;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Contig {
    pub name: String,
    pub len: u32,
    pub offset: u32,
}

/// 构建信息，随索引一起保存。
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct IndexMeta {
    pub reference_file: Option<String>,
    pub build_args: Option<String>,
    pub build_timestamp: Option<String>,
}

/// 基于 packed 序列 BWT 的 FM 索引：
/// - C 表 + 定长分块的 Occ 采样（块内顺扫补偿）。
/// - 保存完整 SA，便于从区间直接取出位置。
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FmIndex {
    pub block: u32,
    /// C[i] = BWT 中符号 < i 的数量
    pub c: Vec<u32>,
    /// BWT 符号序列（长度 n+1，含一个 `$`）
    pub bwt: Vec<u8>,
    /// `$` 所在的行
    pub inverse_sa0: u32,
    /// occ_samples[block_id * sigma + c] = 块起点之前 c 的出现次数
    pub occ_samples: Vec<u32>,
    pub sa: Vec<u32>,
    pub contigs: Vec<Contig>,
    pub meta: IndexMeta,
}

impl FmIndex {
    pub fn build<W: AsRef<[u64]>>(
        seq: &PackedSequence<W>,
        contigs: Vec<Contig>,
        block: usize,
    ) -> crate::error::Result<Self> {
        let start = std::time::Instant::now();
        let sa = sa::build_sa(seq)?;
        let (packed, row) = bwt::bwt_from_sa(seq, &sa);
        // 0 留给 `$`，碱基整体后移一位
        let bwt: Vec<u8> = (0..packed.len())
            .map(|i| if i == row { 0 } else { packed.code(i) + 1 })
            .collect();
        let inverse_sa0 = row as u32;

        let sigma = FM_SIGMA as usize;
        let n = bwt.len();
        let block = block.max(1);
        let mut freq = vec![0u32; sigma];
        for &ch in &bwt {
            freq[ch as usize] += 1;
        }
        let mut c = vec![0u32; sigma];
        let mut acc = 0u32;
        for i in 0..sigma {
            c[i] = acc;
            acc += freq[i];
        }

        // 采样 Occ
        let num_blocks = n.div_ceil(block);
        let mut occ_samples = vec![0u32; num_blocks * sigma];
        let mut running = vec![0u32; sigma];
        for bi in 0..num_blocks {
            occ_samples[bi * sigma..(bi + 1) * sigma].copy_from_slice(&running);
            let end = ((bi + 1) * block).min(n);
            for &ch in &bwt[bi * block..end] {
                running[ch as usize] += 1;
            }
        }

        info!("fm index: {} rows, block {}, {:.2?}", n, block, start.elapsed());
        Ok(Self {
            block: block as u32,
            c,
            bwt,
            inverse_sa0,
            occ_samples,
            sa,
            contigs,
            meta: IndexMeta::default(),
        })
    }

    pub fn set_meta(&mut self, meta: IndexMeta) {
        self.meta = meta;
    }

    /// BWT 重新打包为碱基序列（`$` 行填 A），供 ibwt 使用。
    pub fn packed_bwt(&self) -> (PackedSequence, usize) {
        let mut out = PackedSequence::new();
        out.append_codes(self.bwt.iter().map(|&s| s.saturating_sub(1)));
        (out, self.inverse_sa0 as usize)
    }

    /// 自检：ibwt 还原出 `text`，且 SA 相邻行严格递增。
    pub fn verify<W: AsRef<[u64]>>(&self, text: &PackedSequence<W>) -> bool {
        let (packed, inverse_sa0) = self.packed_bwt();
        if bwt::ibwt(&packed, inverse_sa0) != *text {
            return false;
        }
        self.sa
            .windows(2)
            .all(|w| sa::suffix_cmp(text, w[0] as usize, w[1] as usize).is_lt())
    }

    /// BWT[0..pos) 中 c 的出现次数
    #[inline]
    pub fn occ(&self, c: u8, pos: usize) -> u32 {
        if pos == 0 {
            return 0;
        }
        let sigma = FM_SIGMA as usize;
        let block = self.block as usize;
        let bi = (pos - 1) / block;
        let base = self.occ_samples[bi * sigma + c as usize];
        let add = self.bwt[bi * block..pos].iter().filter(|&&ch| ch == c).count() as u32;
        base + add
    }

    /// 在区间 [l, r) 上向左扩展字符 c 后的新区间
    #[inline]
    pub fn rank_range(&self, c: u8, l: usize, r: usize) -> (usize, usize) {
        let c0 = self.c[c as usize] as usize;
        (c0 + self.occ(c, l) as usize, c0 + self.occ(c, r) as usize)
    }

    /// 反向搜索精确匹配，pat 为 1..=4 编码（不含 0）
    pub fn backward_search(&self, pat: &[u8]) -> Option<(usize, usize)> {
        if self.bwt.is_empty() {
            return None;
        }
        let mut l = 0usize;
        let mut r = self.bwt.len();
        for &a in pat.iter().rev() {
            if a == 0 || a >= FM_SIGMA {
                return None;
            }
            let (nl, nr) = self.rank_range(a, l, r);
            if nl >= nr {
                return None;
            }
            l = nl;
            r = nr;
        }
        Some((l, r))
    }

    /// ASCII 模式串转为 FM 字母表；含非 ACGT 字符时返回 None。
    fn encode(pattern: &[u8]) -> Option<Vec<u8>> {
        pattern
            .iter()
            .map(|&b| dna::is_base(b).then(|| dna::to_code(b) + 1))
            .collect()
    }

    /// 模式串精确出现次数。
    pub fn count(&self, pattern: &[u8]) -> usize {
        Self::encode(pattern)
            .and_then(|p| self.backward_search(&p))
            .map_or(0, |(l, r)| r - l)
    }

    /// 模式串所有出现位置（升序）。
    pub fn locate(&self, pattern: &[u8]) -> Vec<u32> {
        let mut hits = Self::encode(pattern)
            .and_then(|p| self.backward_search(&p))
            .map(|(l, r)| self.sa[l..r].to_vec())
            .unwrap_or_default();
        hits.sort_unstable();
        hits
    }

    /// 将文本位置映射到 (contig_index, contig_offset)；不在任何 contig 内时返回 None。
    pub fn map_text_pos(&self, pos: u32) -> Option<(usize, u32)> {
        let i = self.contigs.partition_point(|c| c.offset + c.len <= pos);
        let c = self.contigs.get(i)?;
        (pos >= c.offset).then(|| (i, pos - c.offset))
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let f = std::fs::File::create(path)
            .with_context(|| format!("cannot create '{}'", path.display()))?;
        let mut w = std::io::BufWriter::new(f);
        bincode::serialize_into(&mut w, self)?;
        w.flush()?;
        Ok(())
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let f = std::fs::File::open(path)
            .with_context(|| format!("cannot open '{}'", path.display()))?;
        let idx: Self = bincode::deserialize_from(std::io::BufReader::new(f))?;
        Ok(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(text: &str) -> (PackedSequence, FmIndex) {
        let seq = PackedSequence::from(text);
        let contigs = vec![Contig { name: "chr1".into(), len: seq.len() as u32, offset: 0 }];
        let fm = FmIndex::build(&seq, contigs, 4).unwrap();
        (seq, fm)
    }

    #[test]
    fn counts_and_locates_exact_matches() {
        let text = "ACGTACGTAGCTGATCGTAGACGT";
        let (seq, fm) = build(text);
        assert!(fm.verify(&seq));
        assert_eq!(fm.count(b"ACGT"), 3);
        assert_eq!(fm.locate(b"ACGT"), vec![0, 4, 20]);
        assert_eq!(fm.count(b"GATC"), 1);
        assert_eq!(fm.count(b"TTTT"), 0);
        assert_eq!(fm.count(b"ANGT"), 0);
        for i in 0..text.len() - 5 {
            let pat = &text.as_bytes()[i..i + 5];
            let naive = text.as_bytes().windows(5).filter(|w| *w == pat).count();
            assert_eq!(fm.count(pat), naive);
        }
    }

    #[test]
    fn shares_the_plain_bwt() {
        let (seq, fm) = build("GATTACAGATTACACCGT");
        let (plain, row) = bwt::bwt(&seq).unwrap();
        assert_eq!(fm.inverse_sa0 as usize, row);
        assert_eq!(fm.packed_bwt(), (plain, row));
    }

    #[test]
    fn verify_rejects_wrong_text() {
        let (_, fm) = build("GATTACAGATTACA");
        assert!(!fm.verify(&PackedSequence::from("GATTACAGATTACC")));
    }

    #[test]
    fn maps_positions_to_contigs() {
        let seq = PackedSequence::from("ACGTACGTAC");
        let contigs = vec![
            Contig { name: "a".into(), len: 4, offset: 0 },
            Contig { name: "b".into(), len: 6, offset: 4 },
        ];
        let fm = FmIndex::build(&seq, contigs, 8).unwrap();
        assert_eq!(fm.map_text_pos(3), Some((0, 3)));
        assert_eq!(fm.map_text_pos(4), Some((1, 0)));
        assert_eq!(fm.map_text_pos(10), None);
    }

    #[test]
    fn survives_save_and_load() {
        let (seq, mut fm) = build("GATTACAGATTACA");
        fm.set_meta(IndexMeta {
            reference_file: Some("ref.fa".into()),
            build_args: None,
            build_timestamp: Some(chrono::Utc::now().to_rfc3339()),
        });
        let path = std::env::temp_dir().join(format!("genidx-fm-{}.fm", std::process::id()));
        fm.save_to_file(&path).unwrap();
        let loaded = FmIndex::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded.meta, fm.meta);
        assert_eq!(loaded.bwt, fm.bwt);
        assert!(loaded.verify(&seq));
        assert_eq!(loaded.count(b"GATTACA"), 2);
    }
}
