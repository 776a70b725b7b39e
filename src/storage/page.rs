//! # Page Types and the Slotted Record Page
//!
//! Defines the page-type tags shared by every page layout and the slotted
//! page: a 4KB data page holding variable-length records behind a slot
//! directory.
//!
//! ## Slotted Page Layout
//!
//! ```text
//! +--------------------------------------------------------------+ 0
//! | SlottedPageHeader (26 bytes)                                 |
//! |  - page_type / lsn (reserved)                                |
//! |  - next_page_id / prev_page_id (reserved for chaining)       |
//! |  - num_slots       (# slot entries, tombstones included)     |
//! |  - free_space_pointer (offset where tuple data begins)       |
//! |  - tuple_count     (# live tuples, tombstones excluded)      |
//! +--------------------------------------------------------------+ 26
//! | Slot directory (grows upward)                                |
//! |  slot[0] -> (offset, length)                                 |
//! |  slot[1] -> (offset, length)        length == 0 => tombstone |
//! +------------------------- free space -------------------------+
//! +--------------------------------------------------------------+ free_space_pointer
//! | Tuple data (grows downward from the end of the page)         |
//! +--------------------------------------------------------------+ PAGE_SIZE
//! ```
//!
//! ## Invariants
//!
//! - `num_slots >= tuple_count`; `num_slots` never shrinks.
//! - `free_space_pointer` only moves downward; deletion is logical (the
//!   tombstone slot may be reused, the old bytes are not reclaimed).
//! - Every live slot points into `[free_space_pointer, PAGE_SIZE)`.
//!
//! ## Ownership
//!
//! [`SlottedPage`] borrows a page buffer exclusively; it performs no I/O.
//! Callers read a page through the disk layer, mutate it through this view,
//! and write it back.

use eyre::{ensure, Result};
use zerocopy::little_endian::{I32, U16, U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{PageId, INVALID_PAGE_ID, PAGE_SIZE, SLOTTED_HEADER_SIZE, SLOT_SIZE};

/// On-disk page-type tag. Stored as a u32 at the start of GAM and slotted
/// pages. A zeroed page decodes as `Header` (tag 0); callers that need to
/// distinguish "never initialized" check for a tag other than the one they
/// expect.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Header = 0,
    Iam = 1,
    Gam = 2,
    Data = 3,
    Index = 4,
}

impl PageKind {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(PageKind::Header),
            1 => Some(PageKind::Iam),
            2 => Some(PageKind::Gam),
            3 => Some(PageKind::Data),
            4 => Some(PageKind::Index),
            _ => None,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct SlottedPageHeader {
    page_type: U32,
    lsn: U64,
    next_page_id: I32,
    prev_page_id: I32,
    num_slots: U16,
    free_space_pointer: U16,
    tuple_count: U16,
}

const _: () = assert!(std::mem::size_of::<SlottedPageHeader>() == SLOTTED_HEADER_SIZE);

impl SlottedPageHeader {
    pub fn new() -> Self {
        Self {
            page_type: U32::new(PageKind::Data as u32),
            lsn: U64::new(0),
            next_page_id: I32::new(INVALID_PAGE_ID),
            prev_page_id: I32::new(INVALID_PAGE_ID),
            num_slots: U16::new(0),
            free_space_pointer: U16::new(PAGE_SIZE as u16),
            tuple_count: U16::new(0),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        ensure!(
            bytes.len() >= SLOTTED_HEADER_SIZE,
            "buffer too small for SlottedPageHeader: {} < {}",
            bytes.len(),
            SLOTTED_HEADER_SIZE
        );

        Self::ref_from_bytes(&bytes[..SLOTTED_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to parse SlottedPageHeader: {:?}", e))
    }

    pub fn from_bytes_mut(bytes: &mut [u8]) -> Result<&mut Self> {
        ensure!(
            bytes.len() >= SLOTTED_HEADER_SIZE,
            "buffer too small for SlottedPageHeader: {} < {}",
            bytes.len(),
            SLOTTED_HEADER_SIZE
        );

        Self::mut_from_bytes(&mut bytes[..SLOTTED_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to parse SlottedPageHeader: {:?}", e))
    }

    pub fn page_type_tag(&self) -> u32 {
        self.page_type.get()
    }

    pub fn lsn(&self) -> u64 {
        self.lsn.get()
    }

    pub fn next_page_id(&self) -> PageId {
        self.next_page_id.get()
    }

    pub fn prev_page_id(&self) -> PageId {
        self.prev_page_id.get()
    }

    pub fn num_slots(&self) -> u16 {
        self.num_slots.get()
    }

    pub fn set_num_slots(&mut self, count: u16) {
        self.num_slots = U16::new(count);
    }

    pub fn free_space_pointer(&self) -> u16 {
        self.free_space_pointer.get()
    }

    pub fn set_free_space_pointer(&mut self, offset: u16) {
        self.free_space_pointer = U16::new(offset);
    }

    pub fn tuple_count(&self) -> u16 {
        self.tuple_count.get()
    }

    pub fn set_tuple_count(&mut self, count: u16) {
        self.tuple_count = U16::new(count);
    }
}

impl Default for SlottedPageHeader {
    fn default() -> Self {
        Self::new()
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct Slot {
    offset: U16,
    length: U16,
}

const _: () = assert!(std::mem::size_of::<Slot>() == SLOT_SIZE);

impl Slot {
    pub fn offset(&self) -> u16 {
        self.offset.get()
    }

    pub fn length(&self) -> u16 {
        self.length.get()
    }

    pub fn is_tombstone(&self) -> bool {
        self.length.get() == 0
    }

    pub fn set(&mut self, offset: u16, length: u16) {
        self.offset = U16::new(offset);
        self.length = U16::new(length);
    }

    pub fn mark_deleted(&mut self) {
        self.length = U16::new(0);
    }
}

/// Exclusive view of a page buffer as a slotted record container.
#[derive(Debug)]
pub struct SlottedPage<'a> {
    data: &'a mut [u8],
}

impl<'a> SlottedPage<'a> {
    /// Wraps an existing page buffer without touching its contents.
    pub fn attach(buffer: &'a mut [u8]) -> Result<Self> {
        ensure!(
            buffer.len() == PAGE_SIZE,
            "slotted page buffer must be exactly {} bytes, got {}",
            PAGE_SIZE,
            buffer.len()
        );
        Ok(Self { data: buffer })
    }

    /// Zeroes the buffer and writes an empty slotted-page header.
    pub fn init(buffer: &'a mut [u8]) -> Result<Self> {
        ensure!(
            buffer.len() == PAGE_SIZE,
            "slotted page buffer must be exactly {} bytes, got {}",
            PAGE_SIZE,
            buffer.len()
        );

        buffer.fill(0);
        let header = SlottedPageHeader::new();
        buffer[..SLOTTED_HEADER_SIZE].copy_from_slice(header.as_bytes());

        Ok(Self { data: buffer })
    }

    fn header(&self) -> Result<&SlottedPageHeader> {
        SlottedPageHeader::from_bytes(self.data)
    }

    fn header_mut(&mut self) -> Result<&mut SlottedPageHeader> {
        SlottedPageHeader::from_bytes_mut(self.data)
    }

    fn slot(&self, slot_id: u16) -> Result<&Slot> {
        let start = SLOTTED_HEADER_SIZE + slot_id as usize * SLOT_SIZE;
        ensure!(
            start + SLOT_SIZE <= PAGE_SIZE,
            "slot {} lies outside the page",
            slot_id
        );
        Slot::ref_from_bytes(&self.data[start..start + SLOT_SIZE])
            .map_err(|e| eyre::eyre!("failed to parse slot {}: {:?}", slot_id, e))
    }

    fn slot_mut(&mut self, slot_id: u16) -> Result<&mut Slot> {
        let start = SLOTTED_HEADER_SIZE + slot_id as usize * SLOT_SIZE;
        ensure!(
            start + SLOT_SIZE <= PAGE_SIZE,
            "slot {} lies outside the page",
            slot_id
        );
        Slot::mut_from_bytes(&mut self.data[start..start + SLOT_SIZE])
            .map_err(|e| eyre::eyre!("failed to parse slot {}: {:?}", slot_id, e))
    }

    pub fn num_slots(&self) -> Result<u16> {
        Ok(self.header()?.num_slots())
    }

    pub fn tuple_count(&self) -> Result<u16> {
        Ok(self.header()?.tuple_count())
    }

    /// Bytes available between the slot directory and the tuple data region.
    pub fn free_space(&self) -> Result<usize> {
        let header = self.header()?;
        let directory_end = SLOTTED_HEADER_SIZE + header.num_slots() as usize * SLOT_SIZE;
        Ok((header.free_space_pointer() as usize).saturating_sub(directory_end))
    }

    /// Inserts a tuple, preferring a tombstone slot over growing the
    /// directory. Returns the slot id, or `None` when the page cannot fit
    /// the tuple.
    pub fn insert(&mut self, tuple: &[u8]) -> Result<Option<u16>> {
        ensure!(!tuple.is_empty(), "cannot insert an empty tuple");
        ensure!(
            tuple.len() <= PAGE_SIZE - SLOTTED_HEADER_SIZE - SLOT_SIZE,
            "tuple of {} bytes can never fit in a page",
            tuple.len()
        );

        let (num_slots, free_space_pointer) = {
            let header = self.header()?;
            (header.num_slots(), header.free_space_pointer())
        };

        let mut reuse_slot = None;
        for slot_id in 0..num_slots {
            if self.slot(slot_id)?.is_tombstone() {
                reuse_slot = Some(slot_id);
                break;
            }
        }

        let needed = if reuse_slot.is_some() {
            tuple.len()
        } else {
            tuple.len() + SLOT_SIZE
        };
        if self.free_space()? < needed {
            return Ok(None);
        }

        // Space always comes from the downward-growing region; a reused
        // tombstone's old bytes stay where they were.
        let new_offset = free_space_pointer as usize - tuple.len();
        self.data[new_offset..new_offset + tuple.len()].copy_from_slice(tuple);

        let slot_id = match reuse_slot {
            Some(slot_id) => {
                self.slot_mut(slot_id)?
                    .set(new_offset as u16, tuple.len() as u16);
                slot_id
            }
            None => {
                self.slot_mut(num_slots)?
                    .set(new_offset as u16, tuple.len() as u16);
                let header = self.header_mut()?;
                header.set_num_slots(num_slots + 1);
                num_slots
            }
        };

        let header = self.header_mut()?;
        header.set_free_space_pointer(new_offset as u16);
        header.set_tuple_count(header.tuple_count() + 1);

        Ok(Some(slot_id))
    }

    /// Returns the tuple bytes at `slot_id`, or `None` for an out-of-range
    /// slot or a tombstone.
    pub fn tuple(&self, slot_id: u16) -> Result<Option<&[u8]>> {
        if slot_id >= self.header()?.num_slots() {
            return Ok(None);
        }

        let slot = self.slot(slot_id)?;
        if slot.is_tombstone() {
            return Ok(None);
        }

        let start = slot.offset() as usize;
        let end = start + slot.length() as usize;
        ensure!(
            end <= PAGE_SIZE,
            "slot {} points outside the page ({}..{})",
            slot_id,
            start,
            end
        );

        Ok(Some(&self.data[start..end]))
    }

    /// Logically deletes the tuple at `slot_id`. The slot becomes a
    /// tombstone; no space is reclaimed. Returns `false` for an out-of-range
    /// or already-deleted slot.
    pub fn delete(&mut self, slot_id: u16) -> Result<bool> {
        if slot_id >= self.header()?.num_slots() {
            return Ok(false);
        }
        if self.slot(slot_id)?.is_tombstone() {
            return Ok(false);
        }

        self.slot_mut(slot_id)?.mark_deleted();
        let header = self.header_mut()?;
        header.set_tuple_count(header.tuple_count() - 1);

        Ok(true)
    }
}

/// Checks the structural invariants of a slotted page buffer. An all-zero
/// buffer (never initialized) passes.
pub fn validate_slotted_page(data: &[u8]) -> Result<()> {
    ensure!(
        data.len() == PAGE_SIZE,
        "invalid page size: {} != {}",
        data.len(),
        PAGE_SIZE
    );

    let header = SlottedPageHeader::from_bytes(data)?;

    let is_zeroed = header.page_type_tag() == 0
        && header.num_slots() == 0
        && header.tuple_count() == 0
        && header.free_space_pointer() == 0;
    if is_zeroed {
        return Ok(());
    }

    ensure!(
        header.page_type_tag() == PageKind::Data as u32,
        "not a data page (type tag {:#x})",
        header.page_type_tag()
    );

    ensure!(
        header.tuple_count() <= header.num_slots(),
        "tuple_count {} exceeds num_slots {}",
        header.tuple_count(),
        header.num_slots()
    );

    let directory_end = SLOTTED_HEADER_SIZE + header.num_slots() as usize * SLOT_SIZE;
    ensure!(
        directory_end <= PAGE_SIZE,
        "slot directory for {} slots extends past the page end",
        header.num_slots()
    );
    ensure!(
        header.free_space_pointer() as usize <= PAGE_SIZE,
        "free_space_pointer {} is outside the page",
        header.free_space_pointer()
    );
    ensure!(
        header.free_space_pointer() as usize >= directory_end,
        "free_space_pointer {} overlaps the slot directory (ends at {})",
        header.free_space_pointer(),
        directory_end
    );

    let mut live = 0u16;
    for slot_id in 0..header.num_slots() {
        let start = SLOTTED_HEADER_SIZE + slot_id as usize * SLOT_SIZE;
        let slot = Slot::ref_from_bytes(&data[start..start + SLOT_SIZE])
            .map_err(|e| eyre::eyre!("failed to parse slot {}: {:?}", slot_id, e))?;
        if slot.is_tombstone() {
            continue;
        }
        live += 1;

        ensure!(
            slot.offset() >= header.free_space_pointer(),
            "slot {} offset {} is above free_space_pointer {}",
            slot_id,
            slot.offset(),
            header.free_space_pointer()
        );
        ensure!(
            slot.offset() as usize + slot.length() as usize <= PAGE_SIZE,
            "slot {} extends past the page end",
            slot_id
        );
    }

    ensure!(
        live == header.tuple_count(),
        "tuple_count {} does not match {} live slots",
        header.tuple_count(),
        live
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_kind_round_trips_through_u32() {
        for kind in [
            PageKind::Header,
            PageKind::Iam,
            PageKind::Gam,
            PageKind::Data,
            PageKind::Index,
        ] {
            assert_eq!(PageKind::from_u32(kind as u32), Some(kind));
        }
        assert_eq!(PageKind::from_u32(99), None);
    }

    #[test]
    fn header_size_is_pinned() {
        assert_eq!(std::mem::size_of::<SlottedPageHeader>(), SLOTTED_HEADER_SIZE);
        assert_eq!(std::mem::size_of::<Slot>(), SLOT_SIZE);
    }

    #[test]
    fn init_produces_empty_page() {
        let mut buffer = [0xFFu8; PAGE_SIZE];
        let page = SlottedPage::init(&mut buffer).unwrap();

        assert_eq!(page.num_slots().unwrap(), 0);
        assert_eq!(page.tuple_count().unwrap(), 0);
        assert_eq!(
            page.free_space().unwrap(),
            PAGE_SIZE - SLOTTED_HEADER_SIZE
        );

        let header = SlottedPageHeader::from_bytes(&buffer).unwrap();
        assert_eq!(header.page_type_tag(), PageKind::Data as u32);
        assert_eq!(header.free_space_pointer(), PAGE_SIZE as u16);
        assert_eq!(header.next_page_id(), INVALID_PAGE_ID);
        assert_eq!(header.prev_page_id(), INVALID_PAGE_ID);
    }

    #[test]
    fn insert_and_get_round_trip() {
        let mut buffer = [0u8; PAGE_SIZE];
        let mut page = SlottedPage::init(&mut buffer).unwrap();

        let data = b"Hello World\0";
        let slot_id = page.insert(data).unwrap().unwrap();

        assert_eq!(slot_id, 0);
        assert_eq!(page.num_slots().unwrap(), 1);
        assert_eq!(page.tuple_count().unwrap(), 1);
        assert_eq!(page.tuple(slot_id).unwrap().unwrap(), data);
    }

    #[test]
    fn multiple_inserts_get_sequential_slots() {
        let mut buffer = [0u8; PAGE_SIZE];
        let mut page = SlottedPage::init(&mut buffer).unwrap();

        let tuples: [&[u8]; 4] = [b"One\0", b"Two\0", b"Three\0", b"Four\0"];
        for (expected_id, tuple) in tuples.iter().enumerate() {
            let slot_id = page.insert(tuple).unwrap().unwrap();
            assert_eq!(slot_id as usize, expected_id);
        }

        assert_eq!(page.num_slots().unwrap(), 4);
        for (slot_id, tuple) in tuples.iter().enumerate() {
            assert_eq!(page.tuple(slot_id as u16).unwrap().unwrap(), *tuple);
        }
    }

    #[test]
    fn tuples_grow_downward_from_page_end() {
        let mut buffer = [0u8; PAGE_SIZE];
        let mut page = SlottedPage::init(&mut buffer).unwrap();

        page.insert(&[1u8; 10]).unwrap().unwrap();
        page.insert(&[2u8; 20]).unwrap().unwrap();

        let first = page.slot(0).unwrap();
        let second = page.slot(1).unwrap();
        assert_eq!(first.offset() as usize, PAGE_SIZE - 10);
        assert_eq!(second.offset() as usize, PAGE_SIZE - 30);
    }

    #[test]
    fn delete_is_logical() {
        let mut buffer = [0u8; PAGE_SIZE];
        let mut page = SlottedPage::init(&mut buffer).unwrap();

        let slot_id = page.insert(b"To Be Deleted\0").unwrap().unwrap();
        let fsp_before = page.header().unwrap().free_space_pointer();

        assert!(page.delete(slot_id).unwrap());

        assert!(page.tuple(slot_id).unwrap().is_none());
        assert_eq!(page.num_slots().unwrap(), 1);
        assert_eq!(page.tuple_count().unwrap(), 0);
        assert_eq!(page.header().unwrap().free_space_pointer(), fsp_before);
    }

    #[test]
    fn delete_out_of_range_or_twice_returns_false() {
        let mut buffer = [0u8; PAGE_SIZE];
        let mut page = SlottedPage::init(&mut buffer).unwrap();

        assert!(!page.delete(0).unwrap());

        let slot_id = page.insert(b"x\0").unwrap().unwrap();
        assert!(page.delete(slot_id).unwrap());
        assert!(!page.delete(slot_id).unwrap());
        assert_eq!(page.tuple_count().unwrap(), 0);
    }

    #[test]
    fn get_out_of_range_returns_none() {
        let mut buffer = [0u8; PAGE_SIZE];
        let page = SlottedPage::init(&mut buffer).unwrap();

        assert!(page.tuple(0).unwrap().is_none());
        assert!(page.tuple(500).unwrap().is_none());
    }

    #[test]
    fn insert_reuses_tombstone_slot() {
        let mut buffer = [0u8; PAGE_SIZE];
        let mut page = SlottedPage::init(&mut buffer).unwrap();

        assert_eq!(page.insert(b"Tuple 1\0").unwrap(), Some(0));
        assert_eq!(page.insert(b"Tuple 2\0").unwrap(), Some(1));
        assert_eq!(page.insert(b"Tuple 3\0").unwrap(), Some(2));

        assert!(page.delete(1).unwrap());
        assert_eq!(page.tuple_count().unwrap(), 2);
        assert_eq!(page.num_slots().unwrap(), 3);

        assert_eq!(page.insert(b"Tuple 4\0").unwrap(), Some(1));
        assert_eq!(page.num_slots().unwrap(), 3);
        assert_eq!(page.tuple_count().unwrap(), 3);
        assert_eq!(page.tuple(1).unwrap().unwrap(), b"Tuple 4\0");
    }

    #[test]
    fn insert_returns_none_when_page_is_full() {
        let mut buffer = [0u8; PAGE_SIZE];
        let mut page = SlottedPage::init(&mut buffer).unwrap();

        assert!(page.insert(&[0xAA; 4000]).unwrap().is_some());
        assert!(page.insert(&[0xBB; 100]).unwrap().is_none());
        assert_eq!(page.num_slots().unwrap(), 1);
    }

    #[test]
    fn fill_with_small_tuples_then_overflow() {
        let mut buffer = [0u8; PAGE_SIZE];
        let mut page = SlottedPage::init(&mut buffer).unwrap();

        let tuple = [7u8; 60];
        let capacity = (PAGE_SIZE - SLOTTED_HEADER_SIZE) / (tuple.len() + SLOT_SIZE);

        for _ in 0..capacity {
            assert!(page.insert(&tuple).unwrap().is_some());
        }
        assert!(page.insert(&tuple).unwrap().is_none());
        assert_eq!(page.tuple_count().unwrap() as usize, capacity);
    }

    #[test]
    fn free_space_shrinks_monotonically() {
        let mut buffer = [0u8; PAGE_SIZE];
        let mut page = SlottedPage::init(&mut buffer).unwrap();

        let mut previous = page.free_space().unwrap();
        for _ in 0..10 {
            page.insert(&[1u8; 32]).unwrap().unwrap();
            let current = page.free_space().unwrap();
            assert!(current < previous);
            previous = current;
        }

        // Deletion reclaims nothing.
        page.delete(0).unwrap();
        assert_eq!(page.free_space().unwrap(), previous);
    }

    #[test]
    fn empty_tuple_is_rejected() {
        let mut buffer = [0u8; PAGE_SIZE];
        let mut page = SlottedPage::init(&mut buffer).unwrap();

        assert!(page.insert(&[]).is_err());
    }

    #[test]
    fn validate_accepts_zeroed_and_initialized_pages() {
        let zeroed = [0u8; PAGE_SIZE];
        validate_slotted_page(&zeroed).unwrap();

        let mut buffer = [0u8; PAGE_SIZE];
        let mut page = SlottedPage::init(&mut buffer).unwrap();
        page.insert(b"record\0").unwrap().unwrap();
        validate_slotted_page(&buffer).unwrap();
    }

    #[test]
    fn validate_rejects_corrupt_free_space_pointer() {
        let mut buffer = [0u8; PAGE_SIZE];
        {
            let mut page = SlottedPage::init(&mut buffer).unwrap();
            page.insert(b"record\0").unwrap().unwrap();
        }

        let header = SlottedPageHeader::from_bytes_mut(&mut buffer).unwrap();
        header.set_free_space_pointer(4);

        assert!(validate_slotted_page(&buffer).is_err());
    }

    #[test]
    fn validate_rejects_slot_past_page_end() {
        let mut buffer = [0u8; PAGE_SIZE];
        {
            let mut page = SlottedPage::init(&mut buffer).unwrap();
            page.insert(b"record\0").unwrap().unwrap();
        }

        let start = SLOTTED_HEADER_SIZE;
        let slot = Slot::mut_from_bytes(&mut buffer[start..start + SLOT_SIZE]).unwrap();
        slot.set((PAGE_SIZE - 2) as u16, 16);

        assert!(validate_slotted_page(&buffer).is_err());
    }
}
