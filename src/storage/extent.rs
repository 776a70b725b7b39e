//! # Extent Manager (Global Allocation Map)
//!
//! Allocates and frees extents (runs of `EXTENT_SIZE` contiguous pages)
//! across the whole database file, and bootstraps a fresh file.
//!
//! ## GAM Chain
//!
//! Allocation state lives in a singly-linked chain of GAM pages. Bit `i` of
//! chain element `c` covers global extent index `c * GAM_MAX_BITS + i`; a set
//! bit means the extent is allocated. The chain starts at page 1 and grows
//! only when every existing GAM is full:
//!
//! 1. unused pages of the system extent (candidates 4, 5, 6, 7 in order)
//!    are claimed first, so small databases never burn an extent on
//!    allocation metadata;
//! 2. once the system extent is exhausted, the file grows by one extent and
//!    the new GAM takes its first page, with bit 0 of the new GAM set so the
//!    extent holding the map is never handed out as data.
//!
//! ## Allocation Cursor
//!
//! A cursor remembers the last chain element that may still have a free bit,
//! so repeated allocations do not rescan full GAM pages. Freeing an extent
//! tracked by an earlier element rewinds the cursor, which is what makes
//! free-then-allocate return the same extent. The cursor is rebuilt from the
//! chain head on every construction; it is an optimization, never state the
//! on-disk format depends on.
//!
//! ## Locking
//!
//! One mutex serializes everything: the cursor, every GAM read/write, and the
//! header rewrite during chain extension. `allocate_extent` and `free_extent`
//! hold it for their full duration and release it on all exit paths. Coarse,
//! but correctness comes first; per-GAM-page locks are a later refinement.

use eyre::{ensure, Result, WrapErr};
use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use crate::config::{
    PageId, EXTENT_SIZE, FIRST_GAM_PAGE_ID, GAM_HEADER_SIZE, GAM_MAX_BITS, HEADER_PAGE_ID,
    INVALID_PAGE_ID, PAGE_SIZE, SYS_COLUMNS_IAM_PAGE_ID, SYS_TABLES_IAM_PAGE_ID,
};
use crate::storage::bitmap::{Bitmap, BitmapMut};
use crate::storage::disk::DiskManager;
use crate::storage::headers::{DatabaseHeader, GamPageHeader, SparseIamHeader};

/// Last chain element known to possibly contain a free bit.
#[derive(Debug, Clone, Copy)]
struct GamCursor {
    page_id: PageId,
    chain_index: u64,
}

#[derive(Debug)]
pub struct ExtentManager<'d> {
    disk: &'d DiskManager,
    cursor: Mutex<GamCursor>,
}

impl<'d> ExtentManager<'d> {
    /// Opens the allocator over an existing file, bootstrapping the on-disk
    /// structures if the file is empty. A non-empty file whose header does
    /// not carry the MiniDB signature is rejected.
    pub fn new(disk: &'d DiskManager) -> Result<Self> {
        if disk.page_count()? == 0 {
            Self::initialize_new_db(disk)?;
        } else {
            let mut buffer = [0u8; PAGE_SIZE];
            disk.read_page(HEADER_PAGE_ID, &mut buffer)
                .wrap_err("failed to read database header page")?;
            DatabaseHeader::from_bytes(&buffer)?;
        }

        Ok(Self {
            disk,
            cursor: Mutex::new(GamCursor {
                page_id: FIRST_GAM_PAGE_ID,
                chain_index: 0,
            }),
        })
    }

    /// Writes the header page, the first GAM (with the system extent marked
    /// allocated), and the two empty system-catalog IAM heads.
    fn initialize_new_db(disk: &DiskManager) -> Result<()> {
        debug!("bootstrapping empty database file");

        let mut buffer = [0u8; PAGE_SIZE];
        DatabaseHeader::new().write_to(&mut buffer)?;
        disk.write_page(HEADER_PAGE_ID, &buffer)?;

        buffer.fill(0);
        GamPageHeader::new().write_to(&mut buffer)?;
        BitmapMut::new(&mut buffer[GAM_HEADER_SIZE..]).set(0);
        disk.write_page(FIRST_GAM_PAGE_ID, &buffer)?;

        for iam_page_id in [SYS_TABLES_IAM_PAGE_ID, SYS_COLUMNS_IAM_PAGE_ID] {
            buffer.fill(0);
            SparseIamHeader::new(0).write_to(&mut buffer)?;
            disk.write_page(iam_page_id, &buffer)?;
        }

        Ok(())
    }

    /// Reserves a free extent and returns the page id of its first page.
    ///
    /// Deterministic: the GAM chain is scanned low-to-high starting from the
    /// cached cursor, and the lowest clear bit wins.
    pub fn allocate_extent(&self) -> Result<PageId> {
        let mut cursor = self.cursor.lock();
        let mut buffer = [0u8; PAGE_SIZE];

        loop {
            self.disk
                .read_page(cursor.page_id, &mut buffer)
                .wrap_err_with(|| format!("failed to read GAM page {}", cursor.page_id))?;
            GamPageHeader::from_bytes(&buffer)?;

            if let Some(bit) = Bitmap::new(&buffer[GAM_HEADER_SIZE..]).first_clear() {
                BitmapMut::new(&mut buffer[GAM_HEADER_SIZE..]).set(bit);
                self.disk.write_page(cursor.page_id, &buffer)?;

                let extent_index = cursor.chain_index * GAM_MAX_BITS as u64 + bit as u64;
                let first_page = extent_index * EXTENT_SIZE as u64;
                ensure!(
                    first_page <= i32::MAX as u64,
                    "out of space: extent {} exceeds the page id range",
                    extent_index
                );

                trace!(extent_index, first_page, "allocated extent");
                return Ok(first_page as PageId);
            }

            // This GAM is full; it is not revisited within this call.
            let next = GamPageHeader::from_bytes(&buffer)?.next_bitmap_page_id();
            let next = if next != INVALID_PAGE_ID {
                next
            } else {
                self.extend_gam_chain(cursor.page_id, &mut buffer)?
            };

            cursor.page_id = next;
            cursor.chain_index += 1;
        }
    }

    /// Creates a new tail GAM and links `tail_page_id` to it. `tail_buffer`
    /// holds the current tail's contents and is clobbered.
    fn extend_gam_chain(
        &self,
        tail_page_id: PageId,
        tail_buffer: &mut [u8; PAGE_SIZE],
    ) -> Result<PageId> {
        let chain_pages = self.chain_page_ids()?;

        let packed_slot = (0..EXTENT_SIZE as PageId)
            .filter(|p| {
                *p != HEADER_PAGE_ID
                    && *p != SYS_TABLES_IAM_PAGE_ID
                    && *p != SYS_COLUMNS_IAM_PAGE_ID
            })
            .find(|p| !chain_pages.contains(p));

        let mut new_gam = [0u8; PAGE_SIZE];
        GamPageHeader::new().write_to(&mut new_gam)?;

        let new_page_id = match packed_slot {
            Some(page_id) => {
                // Pack into the system extent; its allocation is already
                // tracked by bit 0 of the first GAM.
                debug!(page_id, "packing new GAM into system extent");
                self.disk.write_page(page_id, &new_gam)?;
                page_id
            }
            None => {
                let mut header_buffer = [0u8; PAGE_SIZE];
                self.disk.read_page(HEADER_PAGE_ID, &mut header_buffer)?;
                let total_pages = DatabaseHeader::from_bytes(&header_buffer)?.total_pages();
                ensure!(
                    total_pages <= i32::MAX as u64,
                    "out of space: file cannot grow past the page id range"
                );

                let page_id = total_pages as PageId;
                debug!(page_id, "appending new GAM in a fresh extent");

                // The extent that carries the GAM is not available for data.
                BitmapMut::new(&mut new_gam[GAM_HEADER_SIZE..]).set(0);
                self.disk.write_page(page_id, &new_gam)?;

                let header = DatabaseHeader::from_bytes_mut(&mut header_buffer)?;
                header.set_total_pages(total_pages + EXTENT_SIZE as u64);
                self.disk.write_page(HEADER_PAGE_ID, &header_buffer)?;

                page_id
            }
        };

        GamPageHeader::from_bytes_mut(tail_buffer)?.set_next_bitmap_page_id(new_page_id);
        self.disk.write_page(tail_page_id, tail_buffer)?;

        Ok(new_page_id)
    }

    /// Page ids of every element of the GAM chain, head first.
    fn chain_page_ids(&self) -> Result<SmallVec<[PageId; 8]>> {
        let mut pages: SmallVec<[PageId; 8]> = SmallVec::new();
        let mut buffer = [0u8; PAGE_SIZE];

        let mut current = FIRST_GAM_PAGE_ID;
        while current != INVALID_PAGE_ID {
            ensure!(
                !pages.contains(&current),
                "GAM chain contains a cycle through page {}",
                current
            );
            pages.push(current);

            self.disk.read_page(current, &mut buffer)?;
            current = GamPageHeader::from_bytes(&buffer)?.next_bitmap_page_id();
        }

        Ok(pages)
    }

    /// Returns an extent to the free pool.
    ///
    /// Misaligned ids, ids outside the tracked range, the system extent, and
    /// extents that are already free are ignored without touching the chain.
    pub fn free_extent(&self, start_page_id: PageId) -> Result<()> {
        if start_page_id <= 0 || start_page_id as usize % EXTENT_SIZE != 0 {
            warn!(start_page_id, "ignoring free of invalid extent id");
            return Ok(());
        }

        let extent_index = start_page_id as u64 / EXTENT_SIZE as u64;
        let target_element = extent_index / GAM_MAX_BITS as u64;
        let bit = (extent_index % GAM_MAX_BITS as u64) as usize;

        let mut cursor = self.cursor.lock();
        let mut buffer = [0u8; PAGE_SIZE];

        let mut page_id = FIRST_GAM_PAGE_ID;
        let mut chain_index = 0u64;
        while chain_index < target_element {
            self.disk.read_page(page_id, &mut buffer)?;
            let next = GamPageHeader::from_bytes(&buffer)?.next_bitmap_page_id();
            if next == INVALID_PAGE_ID {
                warn!(start_page_id, "ignoring free of extent beyond the GAM chain");
                return Ok(());
            }
            page_id = next;
            chain_index += 1;
        }

        self.disk.read_page(page_id, &mut buffer)?;
        GamPageHeader::from_bytes(&buffer)?;

        let mut bitmap = BitmapMut::new(&mut buffer[GAM_HEADER_SIZE..]);
        if !bitmap.is_set(bit) {
            trace!(start_page_id, "extent already free");
            return Ok(());
        }
        bitmap.clear(bit);
        self.disk.write_page(page_id, &buffer)?;

        if target_element < cursor.chain_index {
            cursor.page_id = page_id;
            cursor.chain_index = target_element;
        }

        trace!(extent_index, "freed extent");
        Ok(())
    }
}
