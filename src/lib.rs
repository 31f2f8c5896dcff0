//! # genidx
//!
//! 2-bit packed DNA 参考序列索引与不精确（Hamming 距离）搜索。
//!
//! 本 crate 提供：
//!
//! - **Packed 序列**：每个 `u64` 存 32 个碱基，按字窗口比较、暴力查找
//! - **注释层**：N 与简并碱基以 run-length 形式叠加在 packed 层之上
//! - **种子索引**：k-mer 计数排序建表，多种子 min-heap 归并求候选起点
//! - **BWT / FM 索引**：前缀倍增后缀排序、BWT 与逆变换、精确计数
//! - **参考库**：多染色体参考的扁平二进制格式，可直接 mmap 使用
//!
//! ## 快速示例
//!
//! ```rust
//! use genidx::index::{IndexConfig, SearchParams, SearchStats};
//! use genidx::reference::ReferenceStore;
//!
//! let mut store = ReferenceStore::new();
//! store.append(b">chr1\nNNNNACGTTGCAAGGCTTACCGATAGGCTAAC\n");
//! store
//!     .make_index(&IndexConfig { num_indexed_chars: 4, exclude_polymers: true })
//!     .unwrap();
//!
//! let params = SearchParams { max_distance: 1, ..SearchParams::default() };
//! let mut stats = SearchStats::default();
//! let hits = store.find_inexact(b"AGGCTTACCGAT", &params, &mut stats);
//! let (chrom, pos) = store.locate(hits[0].location).unwrap();
//! assert_eq!(chrom.name(), "chr1");
//! assert_eq!(pos, 12);
//! ```
//!
//! ## 模块说明
//!
//! - [`seq`]：packed 序列与带注释序列
//! - [`index`]：种子索引、不精确搜索、后缀数组 / BWT / FM 索引
//! - [`reference`]：多染色体参考库与二进制读写
//! - [`io`]：FASTA / FASTQ 解析，二进制格式读写
//! - [`align`]：多线程 FASTQ 批量比对
//! - [`util`]：DNA 编码与位运算工具

pub mod align;
pub mod error;
pub mod index;
pub mod io;
pub mod reference;
pub mod seq;
pub mod storage;
pub mod util;

pub use error::{IndexError, Result};
