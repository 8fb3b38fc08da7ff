//! # olc-rust
//!
//! 面向长读段的重叠-布局-共识（OLC）从头组装器。
//!
//! 流程：
//!
//! - **建图**：k-mer 频数表 + FM 索引（或 minimizer 表）查找读段间的共享 k-mer，
//!   聚类后判定为重叠边或包含关系
//! - **剪除**：被其它读段完全包含的读段从图中移除
//! - **布局**：贪心最大重叠 / Kruskal 最小开销，选出互不相交的简单路径
//! - **共识**：沿路径拼接读段，可选在接缝处用带状 Smith-Waterman 打磨
//!
//! ## 快速示例
//!
//! ```rust,no_run
//! use std::path::Path;
//! use olc_rust::config::{AssemblerConfig, GraphConstruction};
//! use olc_rust::pipeline::{Assembler, Outcome};
//!
//! let config = AssemblerConfig {
//!     graph_construction: GraphConstruction::FmIndex,
//!     threads: 4,
//!     ..AssemblerConfig::default()
//! };
//! let outcome = Assembler::new(config)
//!     .with_progress(|p: u8| { println!("{}%", p); true })
//!     .run(Path::new("reads.fq.gz"), Path::new("asm"))
//!     .unwrap();
//! if let Outcome::Completed(summary) = outcome {
//!     println!("{} contigs in {}", summary.contigs, summary.contigs_file.display());
//! }
//! ```
//!
//! ## 模块说明
//!
//! - [`io`]：FASTA / FASTQ 解析与读段存储
//! - [`index`]：后缀数组、BWT、FM 索引、k-mer 计数与 minimizer 表
//! - [`align`]：k-mer 命中、命中聚类、Smith-Waterman
//! - [`assembly`]：组装图、建图策略、布局、共识、图文件
//! - [`config`] / [`pipeline`]：参数与端到端流程
//! - [`util`]：DNA 编码与统计工具

pub mod align;
pub mod assembly;
pub mod config;
pub mod error;
pub mod index;
pub mod io;
pub mod pipeline;
pub mod util;

pub use error::{AssemblyError, Result};
