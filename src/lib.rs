//! # MiniDB Storage Kernel
//!
//! The storage kernel of a single-node relational database: everything
//! between a flat file on disk and a catalog that can answer "what is table
//! `users` and where does it live?". SQL parsing, planning, and execution
//! are external collaborators that sit on top of this crate.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Catalog (sys_tables / sys_columns)     │
//! ├─────────────────────────────────────────┤
//! │  Per-object allocation (sparse IAM)     │
//! ├─────────────────────────────────────────┤
//! │  Extent allocation (chained GAM)        │
//! ├─────────────────────────────────────────┤
//! │  Slotted record pages                   │
//! ├─────────────────────────────────────────┤
//! │  Page-granular file I/O                 │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## File Layout
//!
//! A database is one file of 4KB pages. The first extent (pages 0..8) is
//! reserved for system metadata:
//!
//! ```text
//! page 0   database header (signature, page counts, well-known page ids)
//! page 1   first GAM page (global extent bitmap)
//! page 2   IAM chain head of sys_tables
//! page 3   IAM chain head of sys_columns
//! pages 4+ claimed by GAM chain growth, then data extents
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use minidb::catalog::{CatalogManager, Column, DataType, Schema};
//! use minidb::storage::{DiskManager, ExtentManager, IamManager};
//!
//! let disk = DiskManager::open("./mini.db")?;
//! let extents = ExtentManager::new(&disk)?;
//! let iam = IamManager::new(&disk, &extents);
//! let catalog = CatalogManager::new(&disk, &iam);
//! catalog.init()?;
//!
//! let schema = Schema::new(vec![
//!     Column::fixed("id", DataType::Integer, 0),
//!     Column::new("username", DataType::Varchar, 32, 4),
//! ]);
//! catalog.create_table("users", &schema)?;
//!
//! let users = catalog.get_table("users")?.expect("just created");
//! ```
//!
//! ## Concurrency
//!
//! Operations are synchronous and blocking. The extent allocator serializes
//! behind one process-wide mutex; each IAM chain has its own. The lock order
//! is fixed: IAM chain before extent allocator. The slotted-page layer takes
//! no locks; callers own their page buffers.
//!
//! ## Module Overview
//!
//! - [`config`]: page geometry, reserved page ids, derived capacities
//! - [`storage`]: disk I/O, bitmaps, extent and IAM allocation, slotted pages
//! - [`catalog`]: the self-describing system tables

pub mod catalog;
pub mod config;
pub mod storage;

pub use catalog::{CatalogManager, Column, DataType, Schema, TableMetadata};
pub use config::{PageId, EXTENT_SIZE, INVALID_PAGE_ID, PAGE_SIZE};
pub use storage::{DiskManager, ExtentManager, IamManager, SlottedPage};
