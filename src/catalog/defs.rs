//! # System Catalog Row Definitions
//!
//! Fixed-width binary layouts for the rows of the two self-describing system
//! tables. Rows are written byte-for-byte into slotted-page tuples, with no
//! delimiters or varint framing, so the structs below are the on-disk
//! format.
//!
//! ## Row Layouts
//!
//! ### `sys_tables` (42 bytes)
//! ```text
//! Offset  Size  Field
//! 0       4     oid            (u32)
//! 4       32    name           (NUL-padded)
//! 36      4     first_page_id  (i32, ALWAYS the table's IAM chain head)
//! 40      2     column_count   (u16)
//! ```
//!
//! ### `sys_columns` (41 bytes)
//! ```text
//! Offset  Size  Field
//! 0       4     table_oid      (u32)
//! 4       32    name           (NUL-padded)
//! 36      1     type           (DataType tag)
//! 37      2     length         (u16)
//! 39      2     offset         (u16, position inside the user tuple)
//! ```
//!
//! The nine bootstrap rows in `sys_columns` describe exactly these two
//! layouts, which is what makes the catalog self-describing.

use eyre::{ensure, Result};
use zerocopy::little_endian::{I32, U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{PageId, MAX_NAME_LENGTH};

/// OID of the `sys_tables` system table.
pub const SYS_TABLES_OID: u32 = 1;

/// OID of the `sys_columns` system table.
pub const SYS_COLUMNS_OID: u32 = 2;

/// User tables receive OIDs from here upward.
pub const FIRST_USER_OID: u32 = 100;

pub const SYS_TABLES_ROW_SIZE: usize = 42;
pub const SYS_COLUMNS_ROW_SIZE: usize = 41;

/// Column type tags as stored in `sys_columns`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Integer = 0,
    Double = 1,
    Varchar = 2,
    Boolean = 3,
    Date = 4,
    Timestamp = 5,
}

impl DataType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(DataType::Integer),
            1 => Some(DataType::Double),
            2 => Some(DataType::Varchar),
            3 => Some(DataType::Boolean),
            4 => Some(DataType::Date),
            5 => Some(DataType::Timestamp),
            _ => None,
        }
    }

    /// Storage size of a fixed-width value; 0 for variable-length types.
    pub fn fixed_size(&self) -> u16 {
        match self {
            DataType::Integer => 4,
            DataType::Double => 8,
            DataType::Varchar => 0,
            DataType::Boolean => 1,
            DataType::Date => 12,
            DataType::Timestamp => 24,
        }
    }
}

/// Copies `name` into a NUL-padded fixed buffer, rejecting oversized names.
pub(crate) fn encode_name(name: &str) -> Result<[u8; MAX_NAME_LENGTH]> {
    ensure!(!name.is_empty(), "name must not be empty");
    ensure!(
        name.len() < MAX_NAME_LENGTH,
        "name '{}' exceeds {} bytes",
        name,
        MAX_NAME_LENGTH - 1
    );

    let mut buffer = [0u8; MAX_NAME_LENGTH];
    buffer[..name.len()].copy_from_slice(name.as_bytes());
    Ok(buffer)
}

/// Reads a NUL-padded name back as UTF-8.
pub(crate) fn decode_name(buffer: &[u8; MAX_NAME_LENGTH]) -> Result<&str> {
    let end = buffer
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(MAX_NAME_LENGTH);
    std::str::from_utf8(&buffer[..end])
        .map_err(|e| eyre::eyre!("catalog name is not valid UTF-8: {}", e))
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct SysTablesRow {
    oid: U32,
    name: [u8; MAX_NAME_LENGTH],
    first_page_id: I32,
    column_count: U16,
}

const _: () = assert!(std::mem::size_of::<SysTablesRow>() == SYS_TABLES_ROW_SIZE);

impl SysTablesRow {
    pub fn new(oid: u32, name: &str, first_page_id: PageId, column_count: u16) -> Result<Self> {
        Ok(Self {
            oid: U32::new(oid),
            name: encode_name(name)?,
            first_page_id: I32::new(first_page_id),
            column_count: U16::new(column_count),
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        ensure!(
            bytes.len() == SYS_TABLES_ROW_SIZE,
            "sys_tables row must be {} bytes, got {}",
            SYS_TABLES_ROW_SIZE,
            bytes.len()
        );

        Self::ref_from_bytes(bytes)
            .map_err(|e| eyre::eyre!("failed to parse sys_tables row: {:?}", e))
    }

    pub fn oid(&self) -> u32 {
        self.oid.get()
    }

    pub fn name(&self) -> Result<&str> {
        decode_name(&self.name)
    }

    /// The table's IAM chain head. Scans always go through the IAM.
    pub fn first_page_id(&self) -> PageId {
        self.first_page_id.get()
    }

    pub fn column_count(&self) -> u16 {
        self.column_count.get()
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct SysColumnsRow {
    table_oid: U32,
    name: [u8; MAX_NAME_LENGTH],
    data_type: u8,
    length: U16,
    offset: U16,
}

const _: () = assert!(std::mem::size_of::<SysColumnsRow>() == SYS_COLUMNS_ROW_SIZE);

impl SysColumnsRow {
    pub fn new(
        table_oid: u32,
        name: &str,
        data_type: DataType,
        length: u16,
        offset: u16,
    ) -> Result<Self> {
        Ok(Self {
            table_oid: U32::new(table_oid),
            name: encode_name(name)?,
            data_type: data_type as u8,
            length: U16::new(length),
            offset: U16::new(offset),
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        ensure!(
            bytes.len() == SYS_COLUMNS_ROW_SIZE,
            "sys_columns row must be {} bytes, got {}",
            SYS_COLUMNS_ROW_SIZE,
            bytes.len()
        );

        Self::ref_from_bytes(bytes)
            .map_err(|e| eyre::eyre!("failed to parse sys_columns row: {:?}", e))
    }

    pub fn table_oid(&self) -> u32 {
        self.table_oid.get()
    }

    pub fn name(&self) -> Result<&str> {
        decode_name(&self.name)
    }

    pub fn data_type(&self) -> Option<DataType> {
        DataType::from_u8(self.data_type)
    }

    pub fn data_type_tag(&self) -> u8 {
        self.data_type
    }

    pub fn length(&self) -> u16 {
        self.length.get()
    }

    pub fn offset(&self) -> u16 {
        self.offset.get()
    }
}
