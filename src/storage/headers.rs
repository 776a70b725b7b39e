//! # On-Disk Header Definitions
//!
//! Type-safe, zerocopy-based header structs for the three page layouts that
//! carry structural metadata: the database header (page 0), GAM pages, and
//! sparse IAM pages. Each struct occupies a fixed prefix of its page; the
//! remainder is zero padding (header page) or bitmap payload (GAM/IAM).
//!
//! ## Header Layouts
//!
//! ### Database header (page 0, 36-byte struct)
//! ```text
//! Offset  Size  Description
//! 0       8     Signature: "MINIDB\0\0"
//! 8       4     Format version (u32 = 1)
//! 12      4     Page size (u32 = 4096, redundant with the constant)
//! 16      8     Total allocated page count (u64)
//! 24      4     First GAM page id (i32 = 1)
//! 28      4     sys_tables IAM head page id (i32 = 2)
//! 32      4     sys_columns IAM head page id (i32 = 3)
//! 36      4060  Zero padding to fill the page
//! ```
//!
//! ### GAM page (8-byte header)
//! ```text
//! Offset  Size  Description
//! 0       4     Page-type tag (u32 = Gam)
//! 4       4     Next GAM page id (i32, -1 at the chain tail)
//! 8       4088  Bitmap payload (GAM_MAX_BITS bits)
//! ```
//!
//! ### Sparse IAM page (12-byte header)
//! ```text
//! Offset  Size  Description
//! 0       4     Next IAM page id (i32, -1 at the chain tail)
//! 4       8     First global extent index covered by this page (u64)
//! 12      4084  Bitmap payload (SPARSE_IAM_MAX_BITS bits)
//! ```
//!
//! ## Zerocopy Safety
//!
//! All structs derive `FromBytes`, `IntoBytes`, `Immutable`, `KnownLayout`
//! and `Unaligned`, so they can be read in place from any page buffer without
//! copies or alignment constraints. Multi-byte fields use the little-endian
//! wrapper types; the on-disk bytes are the contract, the structs are a view.

use eyre::{ensure, Result};
use zerocopy::little_endian::{I32, U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{
    PageId, DB_FORMAT_VERSION, DB_HEADER_SIZE, DB_SIGNATURE, EXTENT_SIZE, FIRST_GAM_PAGE_ID,
    GAM_HEADER_SIZE, INVALID_PAGE_ID, PAGE_SIZE, SPARSE_IAM_HEADER_SIZE, SPARSE_IAM_MAX_BITS,
    SYS_COLUMNS_IAM_PAGE_ID, SYS_TABLES_IAM_PAGE_ID,
};
use crate::storage::page::PageKind;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct DatabaseHeader {
    signature: [u8; 8],
    version: U32,
    page_size: U32,
    total_pages: U64,
    gam_page_id: I32,
    sys_tables_iam_page: I32,
    sys_columns_iam_page: I32,
}

const _: () = assert!(std::mem::size_of::<DatabaseHeader>() == DB_HEADER_SIZE);

impl DatabaseHeader {
    /// Header for a freshly bootstrapped file: the system extent is the only
    /// allocated storage, and the well-known page ids point into it.
    pub fn new() -> Self {
        Self {
            signature: *DB_SIGNATURE,
            version: U32::new(DB_FORMAT_VERSION),
            page_size: U32::new(PAGE_SIZE as u32),
            total_pages: U64::new(EXTENT_SIZE as u64),
            gam_page_id: I32::new(FIRST_GAM_PAGE_ID),
            sys_tables_iam_page: I32::new(SYS_TABLES_IAM_PAGE_ID),
            sys_columns_iam_page: I32::new(SYS_COLUMNS_IAM_PAGE_ID),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        ensure!(
            bytes.len() >= DB_HEADER_SIZE,
            "buffer too small for DatabaseHeader: {} < {}",
            bytes.len(),
            DB_HEADER_SIZE
        );

        let header = Self::ref_from_bytes(&bytes[..DB_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to parse DatabaseHeader: {:?}", e))?;

        ensure!(
            &header.signature == DB_SIGNATURE,
            "invalid database signature: not a MiniDB file"
        );

        ensure!(
            header.version.get() == DB_FORMAT_VERSION,
            "unsupported format version: {} (expected {})",
            header.version.get(),
            DB_FORMAT_VERSION
        );

        ensure!(
            header.page_size.get() == PAGE_SIZE as u32,
            "page size mismatch: file says {}, build uses {}",
            header.page_size.get(),
            PAGE_SIZE
        );

        Ok(header)
    }

    pub fn from_bytes_mut(bytes: &mut [u8]) -> Result<&mut Self> {
        ensure!(
            bytes.len() >= DB_HEADER_SIZE,
            "buffer too small for DatabaseHeader: {} < {}",
            bytes.len(),
            DB_HEADER_SIZE
        );

        let header = Self::mut_from_bytes(&mut bytes[..DB_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to parse DatabaseHeader: {:?}", e))?;

        ensure!(
            &header.signature == DB_SIGNATURE,
            "invalid database signature: not a MiniDB file"
        );

        Ok(header)
    }

    pub fn write_to(&self, page: &mut [u8]) -> Result<()> {
        ensure!(
            page.len() >= DB_HEADER_SIZE,
            "buffer too small for DatabaseHeader: {} < {}",
            page.len(),
            DB_HEADER_SIZE
        );

        page[..DB_HEADER_SIZE].copy_from_slice(self.as_bytes());
        Ok(())
    }

    pub fn version(&self) -> u32 {
        self.version.get()
    }

    pub fn page_size(&self) -> u32 {
        self.page_size.get()
    }

    pub fn total_pages(&self) -> u64 {
        self.total_pages.get()
    }

    pub fn set_total_pages(&mut self, pages: u64) {
        self.total_pages = U64::new(pages);
    }

    pub fn gam_page_id(&self) -> PageId {
        self.gam_page_id.get()
    }

    pub fn sys_tables_iam_page(&self) -> PageId {
        self.sys_tables_iam_page.get()
    }

    pub fn sys_columns_iam_page(&self) -> PageId {
        self.sys_columns_iam_page.get()
    }
}

impl Default for DatabaseHeader {
    fn default() -> Self {
        Self::new()
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct GamPageHeader {
    page_type: U32,
    next_bitmap_page_id: I32,
}

const _: () = assert!(std::mem::size_of::<GamPageHeader>() == GAM_HEADER_SIZE);

impl GamPageHeader {
    pub fn new() -> Self {
        Self {
            page_type: U32::new(PageKind::Gam as u32),
            next_bitmap_page_id: I32::new(INVALID_PAGE_ID),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        ensure!(
            bytes.len() >= GAM_HEADER_SIZE,
            "buffer too small for GamPageHeader: {} < {}",
            bytes.len(),
            GAM_HEADER_SIZE
        );

        let header = Self::ref_from_bytes(&bytes[..GAM_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to parse GamPageHeader: {:?}", e))?;

        ensure!(
            header.page_type.get() == PageKind::Gam as u32,
            "page is not a GAM page (type tag {:#x})",
            header.page_type.get()
        );

        Ok(header)
    }

    pub fn from_bytes_mut(bytes: &mut [u8]) -> Result<&mut Self> {
        ensure!(
            bytes.len() >= GAM_HEADER_SIZE,
            "buffer too small for GamPageHeader: {} < {}",
            bytes.len(),
            GAM_HEADER_SIZE
        );

        let header = Self::mut_from_bytes(&mut bytes[..GAM_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to parse GamPageHeader: {:?}", e))?;

        ensure!(
            header.page_type.get() == PageKind::Gam as u32,
            "page is not a GAM page (type tag {:#x})",
            header.page_type.get()
        );

        Ok(header)
    }

    pub fn write_to(&self, page: &mut [u8]) -> Result<()> {
        ensure!(
            page.len() >= GAM_HEADER_SIZE,
            "buffer too small for GamPageHeader: {} < {}",
            page.len(),
            GAM_HEADER_SIZE
        );

        page[..GAM_HEADER_SIZE].copy_from_slice(self.as_bytes());
        Ok(())
    }

    pub fn next_bitmap_page_id(&self) -> PageId {
        self.next_bitmap_page_id.get()
    }

    pub fn set_next_bitmap_page_id(&mut self, page_id: PageId) {
        self.next_bitmap_page_id = I32::new(page_id);
    }
}

impl Default for GamPageHeader {
    fn default() -> Self {
        Self::new()
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct SparseIamHeader {
    next_bitmap_page_id: I32,
    extent_range_start: U64,
}

const _: () = assert!(std::mem::size_of::<SparseIamHeader>() == SPARSE_IAM_HEADER_SIZE);

impl SparseIamHeader {
    pub fn new(extent_range_start: u64) -> Self {
        Self {
            next_bitmap_page_id: I32::new(INVALID_PAGE_ID),
            extent_range_start: U64::new(extent_range_start),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        ensure!(
            bytes.len() >= SPARSE_IAM_HEADER_SIZE,
            "buffer too small for SparseIamHeader: {} < {}",
            bytes.len(),
            SPARSE_IAM_HEADER_SIZE
        );

        Self::ref_from_bytes(&bytes[..SPARSE_IAM_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to parse SparseIamHeader: {:?}", e))
    }

    pub fn from_bytes_mut(bytes: &mut [u8]) -> Result<&mut Self> {
        ensure!(
            bytes.len() >= SPARSE_IAM_HEADER_SIZE,
            "buffer too small for SparseIamHeader: {} < {}",
            bytes.len(),
            SPARSE_IAM_HEADER_SIZE
        );

        Self::mut_from_bytes(&mut bytes[..SPARSE_IAM_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to parse SparseIamHeader: {:?}", e))
    }

    pub fn write_to(&self, page: &mut [u8]) -> Result<()> {
        ensure!(
            page.len() >= SPARSE_IAM_HEADER_SIZE,
            "buffer too small for SparseIamHeader: {} < {}",
            page.len(),
            SPARSE_IAM_HEADER_SIZE
        );

        page[..SPARSE_IAM_HEADER_SIZE].copy_from_slice(self.as_bytes());
        Ok(())
    }

    pub fn next_bitmap_page_id(&self) -> PageId {
        self.next_bitmap_page_id.get()
    }

    pub fn set_next_bitmap_page_id(&mut self, page_id: PageId) {
        self.next_bitmap_page_id = I32::new(page_id);
    }

    pub fn extent_range_start(&self) -> u64 {
        self.extent_range_start.get()
    }

    /// True when `extent_index` falls inside this page's covered range.
    pub fn covers_extent(&self, extent_index: u64) -> bool {
        let start = self.extent_range_start.get();
        extent_index >= start && extent_index < start + SPARSE_IAM_MAX_BITS as u64
    }

    /// Position of `extent_index` inside this page's bitmap. The caller must
    /// have checked `covers_extent` first.
    pub fn bit_offset(&self, extent_index: u64) -> usize {
        debug_assert!(self.covers_extent(extent_index));
        (extent_index - self.extent_range_start.get()) as usize
    }
}
