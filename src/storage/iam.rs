//! # IAM Manager (Per-Object Allocation Chains)
//!
//! The GAM answers "which extents are in use anywhere?"; the IAM (Index
//! Allocation Map) answers "which extents belong to *this* table or index?".
//! Every object owns a chain of sparse IAM pages; bit `j` of a page with
//! `extent_range_start = R` means global extent `R + j` belongs to the
//! object.
//!
//! ## Sparse Chains
//!
//! A chain stores only the ranges it actually touches. Pages are kept sorted
//! by `extent_range_start`; the head always covers range 0, so an insertion
//! never displaces the head. When an object's extents jump to a distant
//! range, one page is inserted for that range and the gap costs nothing.
//!
//! ## Page Placement
//!
//! An IAM page is itself stored in an extent requested from the extent
//! layer; only the first page of that extent is used and the remaining seven
//! are left idle. Those extents are tracked by the GAM but never appear in
//! any object's bitmap, so object scans see data extents only.
//!
//! ## Locking
//!
//! Each chain gets its own mutex, handed out by head page id. A chain's
//! traversal and mutation happen under that mutex, and the extent layer is
//! called while it is held: the lock order is always IAM chain before the
//! extent allocator, never the reverse.

use std::sync::Arc;

use eyre::{bail, ensure, Result, WrapErr};
use hashbrown::HashMap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::config::{
    PageId, EXTENT_SIZE, INVALID_PAGE_ID, PAGE_SIZE, SPARSE_IAM_HEADER_SIZE, SPARSE_IAM_MAX_BITS,
};
use crate::storage::bitmap::{Bitmap, BitmapMut};
use crate::storage::disk::DiskManager;
use crate::storage::extent::ExtentManager;
use crate::storage::headers::SparseIamHeader;

#[derive(Debug)]
pub struct IamManager<'d> {
    disk: &'d DiskManager,
    extents: &'d ExtentManager<'d>,
    chain_locks: Mutex<HashMap<PageId, Arc<Mutex<()>>>>,
}

impl<'d> IamManager<'d> {
    pub fn new(disk: &'d DiskManager, extents: &'d ExtentManager<'d>) -> Self {
        Self {
            disk,
            extents,
            chain_locks: Mutex::new(HashMap::new()),
        }
    }

    fn chain_lock(&self, head_page_id: PageId) -> Arc<Mutex<()>> {
        let mut locks = self.chain_locks.lock();
        Arc::clone(
            locks
                .entry(head_page_id)
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Starts a fresh IAM chain for a new object and returns its head page.
    ///
    /// The head consumes a whole extent even though only its first page is
    /// used.
    pub fn create_chain(&self) -> Result<PageId> {
        let extent_start = self.extents.allocate_extent()?;
        self.write_iam_page(extent_start, 0, INVALID_PAGE_ID)?;

        debug!(head = extent_start, "created IAM chain");
        Ok(extent_start)
    }

    fn write_iam_page(&self, page_id: PageId, range_start: u64, next: PageId) -> Result<()> {
        let mut buffer = [0u8; PAGE_SIZE];
        let mut header = SparseIamHeader::new(range_start);
        header.set_next_bitmap_page_id(next);
        header.write_to(&mut buffer)?;
        self.disk
            .write_page(page_id, &buffer)
            .wrap_err_with(|| format!("failed to write IAM page {}", page_id))
    }

    /// Allocates a physical extent and records it as belonging to the chain
    /// at `head_page_id`. Returns the first page of the new extent.
    pub fn allocate_for(&self, head_page_id: PageId) -> Result<PageId> {
        ensure!(
            head_page_id >= 0,
            "invalid IAM head page id {}",
            head_page_id
        );

        let lock = self.chain_lock(head_page_id);
        let _guard = lock.lock();

        // Holding the chain lock across the extent-layer call is the fixed
        // lock order.
        let extent_start = self.extents.allocate_extent()?;
        let extent_index = extent_start as u64 / EXTENT_SIZE as u64;

        let range_start = (extent_index / SPARSE_IAM_MAX_BITS as u64) * SPARSE_IAM_MAX_BITS as u64;
        let bit = (extent_index - range_start) as usize;

        let iam_page_id = self.find_or_create_page(head_page_id, range_start)?;

        let mut buffer = [0u8; PAGE_SIZE];
        self.disk.read_page(iam_page_id, &mut buffer)?;
        SparseIamHeader::from_bytes(&buffer)?;

        let mut bitmap = BitmapMut::new(&mut buffer[SPARSE_IAM_HEADER_SIZE..]);
        if bitmap.is_set(bit) {
            bail!(
                "corruption: extent {} already marked in IAM page {}; the extent allocator handed out a live extent",
                extent_index,
                iam_page_id
            );
        }
        bitmap.set(bit);
        self.disk.write_page(iam_page_id, &buffer)?;

        trace!(
            head = head_page_id,
            extent_index,
            first_page = extent_start,
            "allocated extent for object"
        );
        Ok(extent_start)
    }

    /// Walks the chain for the page covering `range_start`, creating and
    /// splicing in a new page when no element covers it. The chain stays
    /// sorted by `extent_range_start`.
    fn find_or_create_page(&self, head_page_id: PageId, range_start: u64) -> Result<PageId> {
        let mut buffer = [0u8; PAGE_SIZE];
        let mut prev: Option<PageId> = None;
        let mut current = head_page_id;

        while current != INVALID_PAGE_ID {
            self.disk
                .read_page(current, &mut buffer)
                .wrap_err_with(|| format!("failed to read IAM page {}", current))?;
            let header = SparseIamHeader::from_bytes(&buffer)?;
            let current_range = header.extent_range_start();
            let next = header.next_bitmap_page_id();

            if current_range == range_start {
                return Ok(current);
            }

            if current_range > range_start {
                // The head covers range 0, so a predecessor must exist.
                let Some(prev_page) = prev else {
                    bail!(
                        "corruption: IAM chain head {} covers range {} instead of 0",
                        head_page_id,
                        current_range
                    );
                };

                let new_page = self.create_linked_page(range_start, current)?;
                self.relink(prev_page, new_page)?;

                debug!(
                    head = head_page_id,
                    range_start, new_page, "inserted IAM page mid-chain"
                );
                return Ok(new_page);
            }

            prev = Some(current);
            current = next;
        }

        // Ran off the tail; the walk guarantees prev is the tail element.
        let Some(tail) = prev else {
            bail!("invalid IAM chain head {}", head_page_id);
        };

        let new_page = self.create_linked_page(range_start, INVALID_PAGE_ID)?;
        self.relink(tail, new_page)?;

        debug!(
            head = head_page_id,
            range_start, new_page, "appended IAM page at chain tail"
        );
        Ok(new_page)
    }

    /// Allocates an extent for a fresh IAM page covering `range_start` and
    /// writes it with `next` as its successor.
    fn create_linked_page(&self, range_start: u64, next: PageId) -> Result<PageId> {
        let extent_start = self.extents.allocate_extent()?;
        self.write_iam_page(extent_start, range_start, next)?;
        Ok(extent_start)
    }

    fn relink(&self, page_id: PageId, next: PageId) -> Result<()> {
        let mut buffer = [0u8; PAGE_SIZE];
        self.disk.read_page(page_id, &mut buffer)?;
        SparseIamHeader::from_bytes_mut(&mut buffer)?.set_next_bitmap_page_id(next);
        self.disk.write_page(page_id, &buffer)
    }

    /// First pages of every extent owned by the chain, in ascending extent
    /// order.
    pub fn extents(&self, head_page_id: PageId) -> Result<Vec<PageId>> {
        ensure!(
            head_page_id >= 0,
            "invalid IAM head page id {}",
            head_page_id
        );

        let lock = self.chain_lock(head_page_id);
        let _guard = lock.lock();

        let mut result = Vec::new();
        let mut buffer = [0u8; PAGE_SIZE];
        let mut current = head_page_id;

        while current != INVALID_PAGE_ID {
            self.disk
                .read_page(current, &mut buffer)
                .wrap_err_with(|| format!("failed to read IAM page {}", current))?;
            let header = SparseIamHeader::from_bytes(&buffer)?;
            let range_start = header.extent_range_start();

            for bit in Bitmap::new(&buffer[SPARSE_IAM_HEADER_SIZE..]).iter_set() {
                let extent_index = range_start + bit as u64;
                result.push((extent_index * EXTENT_SIZE as u64) as PageId);
            }

            current = header.next_bitmap_page_id();
        }

        Ok(result)
    }

    /// Every page owned by the chain: each extent expanded to its
    /// `EXTENT_SIZE` pages.
    pub fn pages(&self, head_page_id: PageId) -> Result<Vec<PageId>> {
        let extents = self.extents(head_page_id)?;

        let mut pages = Vec::with_capacity(extents.len() * EXTENT_SIZE);
        for extent_start in extents {
            for offset in 0..EXTENT_SIZE as PageId {
                pages.push(extent_start + offset);
            }
        }
        Ok(pages)
    }

    /// Number of IAM pages in the chain.
    pub fn chain_length(&self, head_page_id: PageId) -> Result<usize> {
        let mut count = 0;
        let mut buffer = [0u8; PAGE_SIZE];
        let mut current = head_page_id;

        while current != INVALID_PAGE_ID {
            count += 1;
            self.disk.read_page(current, &mut buffer)?;
            current = SparseIamHeader::from_bytes(&buffer)?.next_bitmap_page_id();
        }

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FIRST_GAM_PAGE_ID, GAM_HEADER_SIZE, GAM_MAX_BITS};
    use crate::storage::headers::GamPageHeader;
    use tempfile::tempdir;

    struct Fixture {
        _dir: tempfile::TempDir,
        disk: DiskManager,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let disk = DiskManager::open(dir.path().join("test.db")).unwrap();
        Fixture { _dir: dir, disk }
    }

    /// Marks GAM bits by hand so the next allocation lands on a chosen
    /// global extent index.
    fn write_gam(disk: &DiskManager, page_id: PageId, next: PageId, set_bits: usize) {
        let mut buffer = [0u8; PAGE_SIZE];
        let mut header = GamPageHeader::new();
        header.set_next_bitmap_page_id(next);
        header.write_to(&mut buffer).unwrap();
        let mut bitmap = BitmapMut::new(&mut buffer[GAM_HEADER_SIZE..]);
        for bit in 0..set_bits {
            bitmap.set(bit);
        }
        disk.write_page(page_id, &buffer).unwrap();
    }

    fn chain_ranges(disk: &DiskManager, head: PageId) -> Vec<u64> {
        let mut ranges = Vec::new();
        let mut buffer = [0u8; PAGE_SIZE];
        let mut current = head;
        while current != INVALID_PAGE_ID {
            disk.read_page(current, &mut buffer).unwrap();
            let header = SparseIamHeader::from_bytes(&buffer).unwrap();
            ranges.push(header.extent_range_start());
            current = header.next_bitmap_page_id();
        }
        ranges
    }

    #[test]
    fn create_chain_yields_single_page_covering_range_zero() {
        let f = fixture();
        let extents = ExtentManager::new(&f.disk).unwrap();
        let iam = IamManager::new(&f.disk, &extents);

        let head = iam.create_chain().unwrap();
        assert!(head > 0);
        assert_eq!(head as usize % EXTENT_SIZE, 0);
        assert_eq!(iam.chain_length(head).unwrap(), 1);
        assert_eq!(chain_ranges(&f.disk, head), vec![0]);
        assert!(iam.extents(head).unwrap().is_empty());
    }

    #[test]
    fn allocate_in_first_range_reuses_the_head_page() {
        let f = fixture();
        let extents = ExtentManager::new(&f.disk).unwrap();
        let iam = IamManager::new(&f.disk, &extents);

        let head = iam.create_chain().unwrap();
        let e1 = iam.allocate_for(head).unwrap();
        let e2 = iam.allocate_for(head).unwrap();

        assert_eq!(iam.chain_length(head).unwrap(), 1);
        assert_eq!(iam.extents(head).unwrap(), vec![e1, e2]);
        assert_eq!(iam.pages(head).unwrap().len(), 2 * EXTENT_SIZE);
    }

    #[test]
    fn pages_expands_each_extent() {
        let f = fixture();
        let extents = ExtentManager::new(&f.disk).unwrap();
        let iam = IamManager::new(&f.disk, &extents);

        let head = iam.create_chain().unwrap();
        let e1 = iam.allocate_for(head).unwrap();

        let pages = iam.pages(head).unwrap();
        let expected: Vec<PageId> = (0..EXTENT_SIZE as PageId).map(|i| e1 + i).collect();
        assert_eq!(pages, expected);
    }

    #[test]
    fn distant_extent_appends_a_sorted_page() {
        let f = fixture();
        // Chain head + its first data extent live in low extents; then the
        // first GAM is filled so the next allocation crosses into the second
        // sparse range.
        let extents = ExtentManager::new(&f.disk).unwrap();
        let iam = IamManager::new(&f.disk, &extents);
        let head = iam.create_chain().unwrap();

        write_gam(&f.disk, FIRST_GAM_PAGE_ID, INVALID_PAGE_ID, GAM_MAX_BITS);

        // Next global extent index is GAM_MAX_BITS, which falls in sparse
        // range [SPARSE_IAM_MAX_BITS, 2 * SPARSE_IAM_MAX_BITS).
        let e = iam.allocate_for(head).unwrap();
        assert_eq!(e as u64, GAM_MAX_BITS as u64 * EXTENT_SIZE as u64);

        assert_eq!(iam.chain_length(head).unwrap(), 2);
        assert_eq!(
            chain_ranges(&f.disk, head),
            vec![0, SPARSE_IAM_MAX_BITS as u64]
        );
        assert_eq!(iam.extents(head).unwrap(), vec![e]);
    }

    #[test]
    fn gap_range_inserts_mid_chain_keeping_sort_order() {
        let f = fixture();
        let extents = ExtentManager::new(&f.disk).unwrap();
        let iam = IamManager::new(&f.disk, &extents);
        let head = iam.create_chain().unwrap();

        // Force the allocator to extent index 2 * SPARSE_IAM_MAX_BITS first:
        // element 0 full, element 1 filled up to that index.
        let second_range_bit = 2 * SPARSE_IAM_MAX_BITS - GAM_MAX_BITS;
        write_gam(&f.disk, FIRST_GAM_PAGE_ID, 4, GAM_MAX_BITS);
        write_gam(&f.disk, 4, INVALID_PAGE_ID, second_range_bit);

        let far = iam.allocate_for(head).unwrap();
        assert_eq!(
            far as u64,
            2 * SPARSE_IAM_MAX_BITS as u64 * EXTENT_SIZE as u64
        );
        assert_eq!(
            chain_ranges(&f.disk, head),
            vec![0, 2 * SPARSE_IAM_MAX_BITS as u64]
        );

        // Free an extent in the middle range and allocate again: the new
        // page must land between the existing two.
        extents
            .free_extent((GAM_MAX_BITS * EXTENT_SIZE) as PageId)
            .unwrap();
        let mid = iam.allocate_for(head).unwrap();
        assert_eq!(mid as u64, GAM_MAX_BITS as u64 * EXTENT_SIZE as u64);

        assert_eq!(
            chain_ranges(&f.disk, head),
            vec![
                0,
                SPARSE_IAM_MAX_BITS as u64,
                2 * SPARSE_IAM_MAX_BITS as u64
            ]
        );

        // Extent enumeration is globally ascending across chain pages.
        let owned = iam.extents(head).unwrap();
        let mut sorted = owned.clone();
        sorted.sort_unstable();
        assert_eq!(owned, sorted);
    }

    #[test]
    fn double_marked_bit_is_reported_as_corruption() {
        let f = fixture();
        let extents = ExtentManager::new(&f.disk).unwrap();
        let iam = IamManager::new(&f.disk, &extents);
        let head = iam.create_chain().unwrap();

        // Pre-mark the bit that the extent layer will hand out next.
        let head_extent_index = head as u64 / EXTENT_SIZE as u64;
        let next_index = (head_extent_index + 1) as usize;
        let mut buffer = [0u8; PAGE_SIZE];
        f.disk.read_page(head, &mut buffer).unwrap();
        BitmapMut::new(&mut buffer[SPARSE_IAM_HEADER_SIZE..]).set(next_index);
        f.disk.write_page(head, &buffer).unwrap();

        let err = iam.allocate_for(head).unwrap_err();
        assert!(err.to_string().contains("already marked"));
    }

    #[test]
    fn invalid_head_is_rejected() {
        let f = fixture();
        let extents = ExtentManager::new(&f.disk).unwrap();
        let iam = IamManager::new(&f.disk, &extents);

        assert!(iam.allocate_for(INVALID_PAGE_ID).is_err());
        assert!(iam.extents(INVALID_PAGE_ID).is_err());
    }

    #[test]
    fn separate_chains_do_not_share_extents() {
        let f = fixture();
        let extents = ExtentManager::new(&f.disk).unwrap();
        let iam = IamManager::new(&f.disk, &extents);

        let table_a = iam.create_chain().unwrap();
        let table_b = iam.create_chain().unwrap();

        let a1 = iam.allocate_for(table_a).unwrap();
        let b1 = iam.allocate_for(table_b).unwrap();
        let a2 = iam.allocate_for(table_a).unwrap();

        assert_eq!(iam.extents(table_a).unwrap(), vec![a1, a2]);
        assert_eq!(iam.extents(table_b).unwrap(), vec![b1]);
    }

    #[test]
    fn concurrent_allocation_on_one_chain_is_serialized() {
        let f = fixture();
        let extents = ExtentManager::new(&f.disk).unwrap();
        let iam = IamManager::new(&f.disk, &extents);
        let head = iam.create_chain().unwrap();

        let mut all = Vec::new();
        std::thread::scope(|scope| {
            let mut handles = Vec::new();
            for _ in 0..4 {
                let iam = &iam;
                handles.push(scope.spawn(move || {
                    let mut local = Vec::new();
                    for _ in 0..5 {
                        local.push(iam.allocate_for(head).unwrap());
                    }
                    local
                }));
            }
            for handle in handles {
                all.extend(handle.join().unwrap());
            }
        });

        let unique: std::collections::HashSet<PageId> = all.iter().copied().collect();
        assert_eq!(unique.len(), all.len());

        let mut owned = iam.extents(head).unwrap();
        owned.sort_unstable();
        let mut expected = all.clone();
        expected.sort_unstable();
        assert_eq!(owned, expected);
    }
}
