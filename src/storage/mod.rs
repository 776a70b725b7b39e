//! # Storage Module
//!
//! The layered storage kernel: a flat file becomes a space of fixed-size
//! pages, pages are grouped into extents, extents are allocated globally and
//! tracked per object, and individual data pages hold variable-length
//! records behind a slot directory.
//!
//! ## Layer Stack
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │  Catalog (crate::catalog)                     │
//! ├───────────────────────────────────────────────┤
//! │  IamManager    per-object extent bookkeeping  │
//! ├───────────────────────────────────────────────┤
//! │  ExtentManager global allocation, bootstrap   │
//! ├───────────────────────────────────────────────┤
//! │  SlottedPage   records inside one page buffer │
//! ├───────────────────────────────────────────────┤
//! │  DiskManager   read/write/flush whole pages   │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! Each layer talks only to the layer below it. The disk manager owns the
//! file handle; every other component borrows it. The slotted-page layer is
//! the odd one out: it never touches the disk and operates on buffers the
//! caller moves through the disk layer.
//!
//! ## On-Disk Geometry
//!
//! All I/O is in 4096-byte pages. Eight consecutive pages form an extent,
//! the unit of allocation. Extent 0 is reserved: page 0 is the database
//! header, page 1 the first GAM, pages 2 and 3 the IAM chain heads of the
//! system catalog, and pages 4..7 are claimed by GAM chain growth before the
//! file is extended.
//!
//! ## Module Organization
//!
//! - `disk`: page-granular file I/O (`DiskManager`)
//! - `bitmap`: LSB-first bit views over page payloads
//! - `headers`: zerocopy header structs for header/GAM/IAM pages
//! - `page`: page-type tags and the slotted record page
//! - `extent`: global extent allocation over the GAM chain
//! - `iam`: per-object sparse IAM chains

pub mod bitmap;
pub mod disk;
pub mod extent;
pub mod headers;
pub mod iam;
pub mod page;

pub use bitmap::{Bitmap, BitmapMut};
pub use disk::DiskManager;
pub use extent::ExtentManager;
pub use headers::{DatabaseHeader, GamPageHeader, SparseIamHeader};
pub use iam::IamManager;
pub use page::{validate_slotted_page, PageKind, Slot, SlottedPage, SlottedPageHeader};
