//! # MiniDB Configuration Constants
//!
//! This module centralizes the compile-time constants of the storage kernel.
//! Constants that depend on each other are co-located and guarded by
//! compile-time assertions so that a change to one cannot silently invalidate
//! another.
//!
//! ## Dependency Graph
//!
//! ```text
//! PAGE_SIZE (4096 bytes)
//!       │
//!       ├─> GAM_MAX_BITS        (derived: 8 * (PAGE_SIZE - GAM_HEADER_SIZE))
//!       │     Extent capacity of one GAM page. One bit per global extent.
//!       │
//!       ├─> SPARSE_IAM_MAX_BITS (derived: 8 * (PAGE_SIZE - SPARSE_IAM_HEADER_SIZE))
//!       │     Extent-index range covered by one sparse IAM page.
//!       │
//!       └─> SLOTTED_HEADER_SIZE / SLOT_SIZE
//!             Together they bound how many tuples fit in a data page.
//!
//! EXTENT_SIZE (8 pages)
//!       │
//!       └─> Extent 0 (pages 0..8) is the system extent: header page,
//!           first GAM, and the two system-catalog IAM heads live there.
//! ```
//!
//! ## Critical Invariants
//!
//! 1. `GAM_MAX_BITS == 8 * (PAGE_SIZE - GAM_HEADER_SIZE)`: every byte of a
//!    GAM page after the header is bitmap payload.
//! 2. `SPARSE_IAM_MAX_BITS == 8 * (PAGE_SIZE - SPARSE_IAM_HEADER_SIZE)`:
//!    likewise for sparse IAM pages.
//! 3. The header-size constants equal `size_of` of the corresponding structs;
//!    the struct modules pin this with their own assertions.
//!
//! Tests must reference these named constants rather than re-deriving magic
//! numbers.

/// Identifies a page by its index in the database file. Physical offset is
/// `page_id * PAGE_SIZE`. Negative values are invalid; `INVALID_PAGE_ID` is
/// the "no page" sentinel that also appears on disk in chain links.
pub type PageId = i32;

/// Sentinel for "no page" (end of a chain, failed lookup).
pub const INVALID_PAGE_ID: PageId = -1;

/// Size of a database page in bytes. All disk I/O happens in units of this.
pub const PAGE_SIZE: usize = 4096;

/// Number of contiguous pages in one extent, the unit of allocation.
pub const EXTENT_SIZE: usize = 8;

/// Page 0 holds the database header.
pub const HEADER_PAGE_ID: PageId = 0;

/// The first GAM page immediately follows the header.
pub const FIRST_GAM_PAGE_ID: PageId = 1;

/// IAM chain head for the `sys_tables` system table.
pub const SYS_TABLES_IAM_PAGE_ID: PageId = 2;

/// IAM chain head for the `sys_columns` system table.
pub const SYS_COLUMNS_IAM_PAGE_ID: PageId = 3;

/// Eight-byte file signature at offset 0 of the header page.
pub const DB_SIGNATURE: &[u8; 8] = b"MINIDB\0\0";

/// On-disk format version stored in the header page.
pub const DB_FORMAT_VERSION: u32 = 1;

/// Size of the database header struct (the rest of page 0 is zero padding).
pub const DB_HEADER_SIZE: usize = 36;

/// Size of the GAM page header (page-type tag + next-page link).
pub const GAM_HEADER_SIZE: usize = 8;

/// Extents tracked by a single GAM page. Bit `i` of chain element `c` covers
/// global extent index `c * GAM_MAX_BITS + i`.
pub const GAM_MAX_BITS: usize = 8 * (PAGE_SIZE - GAM_HEADER_SIZE);

/// Size of the sparse IAM page header (next-page link + range start).
pub const SPARSE_IAM_HEADER_SIZE: usize = 12;

/// Extent-index range covered by one sparse IAM page. A page with
/// `extent_range_start = R` covers global extents `[R, R + SPARSE_IAM_MAX_BITS)`.
pub const SPARSE_IAM_MAX_BITS: usize = 8 * (PAGE_SIZE - SPARSE_IAM_HEADER_SIZE);

/// Size of the slotted page header.
pub const SLOTTED_HEADER_SIZE: usize = 26;

/// Size of one slot directory entry (offset + length).
pub const SLOT_SIZE: usize = 4;

/// Hard limit on table and column names, including the space for NUL padding.
pub const MAX_NAME_LENGTH: usize = 32;

const _: () = assert!(
    GAM_MAX_BITS == 8 * (PAGE_SIZE - GAM_HEADER_SIZE),
    "GAM_MAX_BITS derivation mismatch"
);

const _: () = assert!(
    SPARSE_IAM_MAX_BITS == 8 * (PAGE_SIZE - SPARSE_IAM_HEADER_SIZE),
    "SPARSE_IAM_MAX_BITS derivation mismatch"
);

const _: () = assert!(
    PAGE_SIZE % EXTENT_SIZE == 0,
    "PAGE_SIZE must be a multiple of EXTENT_SIZE for offset arithmetic"
);

const _: () = assert!(
    DB_HEADER_SIZE <= PAGE_SIZE && GAM_HEADER_SIZE < PAGE_SIZE && SPARSE_IAM_HEADER_SIZE < PAGE_SIZE,
    "header structs must fit inside a page"
);
