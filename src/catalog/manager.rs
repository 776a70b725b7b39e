//! # Catalog Manager
//!
//! The authoritative owner of table metadata. Two self-describing system
//! tables record every table in the database:
//!
//! - `sys_tables` (OID 1): one row per table (OID, name, IAM chain head,
//!   column count);
//! - `sys_columns` (OID 2): one row per column (owning OID, name, type,
//!   length, tuple offset).
//!
//! Both system tables are themselves described by rows in these tables,
//! written once by [`CatalogManager::init`] on a fresh database. The header
//! page pins their IAM chain heads at pages 2 and 3, which is the fixed
//! point that makes the self-description resolvable.
//!
//! ## Scans
//!
//! Every lookup goes through the IAM layer: walk the table's IAM chain,
//! visit each owned extent's pages as slotted pages, decode live tuples as
//! fixed-width catalog rows. `first_page_id` in `sys_tables` is always the
//! IAM head, never a data page, so there is exactly one way to reach a
//! table's storage.
//!
//! ## Row Placement
//!
//! Inserting a catalog row probes the owning table's pages in IAM order and
//! takes the first one with room, initializing not-yet-used pages of an
//! owned extent on the way. Only when every owned page is full does the
//! table grow by one extent.
//!
//! ## Concurrency
//!
//! The catalog holds no lock of its own; structural safety comes from the
//! IAM layer's per-chain locks. A reader may observe a `sys_tables` row
//! whose column rows are still being inserted; callers that need atomic
//! visibility serialize at a higher level.

use eyre::{bail, ensure, Result};
use tracing::{debug, trace};
use zerocopy::IntoBytes;

use crate::catalog::defs::{
    DataType, SysColumnsRow, SysTablesRow, FIRST_USER_OID, SYS_COLUMNS_OID, SYS_TABLES_OID,
};
use crate::catalog::schema::{Column, Schema};
use crate::config::{PageId, HEADER_PAGE_ID, PAGE_SIZE};
use crate::storage::disk::DiskManager;
use crate::storage::headers::DatabaseHeader;
use crate::storage::iam::IamManager;
use crate::storage::page::{PageKind, SlottedPage, SlottedPageHeader};

/// In-memory description of one table: identity, physical entry point, and
/// schema. Carries no tuple data.
#[derive(Debug, Clone)]
pub struct TableMetadata {
    oid: u32,
    name: String,
    first_page_id: PageId,
    schema: Schema,
}

impl TableMetadata {
    pub fn oid(&self) -> u32 {
        self.oid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Head of the table's IAM chain.
    pub fn first_page_id(&self) -> PageId {
        self.first_page_id
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}

#[derive(Debug)]
pub struct CatalogManager<'d> {
    disk: &'d DiskManager,
    iam: &'d IamManager<'d>,
}

impl<'d> CatalogManager<'d> {
    pub fn new(disk: &'d DiskManager, iam: &'d IamManager<'d>) -> Self {
        Self { disk, iam }
    }

    /// Bootstraps the system tables unless they already exist.
    pub fn init(&self) -> Result<()> {
        if self.get_table("sys_tables")?.is_none() {
            self.bootstrap()?;
        }
        Ok(())
    }

    /// IAM chain heads of the two system tables, read from the header page.
    fn read_iam_heads(&self) -> Result<(PageId, PageId)> {
        let mut buffer = [0u8; PAGE_SIZE];
        self.disk.read_page(HEADER_PAGE_ID, &mut buffer)?;
        let header = DatabaseHeader::from_bytes(&buffer)?;
        Ok((header.sys_tables_iam_page(), header.sys_columns_iam_page()))
    }

    /// Visits every live tuple reachable through `iam_head`, in IAM order.
    /// The visitor returns `false` to stop early. Pages of an owned extent
    /// that were never written are skipped.
    fn scan_rows<F>(&self, iam_head: PageId, mut visit: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<bool>,
    {
        for page_id in self.iam.pages(iam_head)? {
            let mut buffer = [0u8; PAGE_SIZE];
            if self.disk.read_page(page_id, &mut buffer).is_err() {
                continue;
            }

            let page = SlottedPage::attach(&mut buffer)?;
            for slot_id in 0..page.num_slots()? {
                if let Some(tuple) = page.tuple(slot_id)? {
                    if !visit(tuple)? {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }

    /// Inserts a catalog row into the first page of the owning table with
    /// enough room, growing the table by an extent when all pages are full.
    fn insert_row(&self, iam_head: PageId, row: &[u8]) -> Result<()> {
        for page_id in self.iam.pages(iam_head)? {
            let mut buffer = [0u8; PAGE_SIZE];

            if self.disk.read_page(page_id, &mut buffer).is_err() {
                // Inside an owned extent but never written: claim it.
                return self.init_page_and_insert(page_id, row);
            }

            let tag = SlottedPageHeader::from_bytes(&buffer)?.page_type_tag();
            if tag == PageKind::Data as u32 {
                let inserted = {
                    let mut page = SlottedPage::attach(&mut buffer)?;
                    page.insert(row)?.is_some()
                };
                if inserted {
                    return self.disk.write_page(page_id, &buffer);
                }
            } else if tag == PageKind::Header as u32 {
                // A zeroed page of an owned extent: initialize and use it.
                return self.init_page_and_insert(page_id, row);
            }
            // Any other tag does not belong to this table's data; skip it.
        }

        let new_extent = self.iam.allocate_for(iam_head)?;
        debug!(iam_head, new_extent, "catalog table grew by one extent");
        self.init_page_and_insert(new_extent, row)
    }

    fn init_page_and_insert(&self, page_id: PageId, row: &[u8]) -> Result<()> {
        let mut buffer = [0u8; PAGE_SIZE];
        let inserted = {
            let mut page = SlottedPage::init(&mut buffer)?;
            page.insert(row)?.is_some()
        };
        ensure!(
            inserted,
            "catalog row of {} bytes does not fit an empty page",
            row.len()
        );
        self.disk.write_page(page_id, &buffer)
    }

    /// Writes the self-description: the first extents of both system tables
    /// and the eleven rows that make the catalog resolvable.
    fn bootstrap(&self) -> Result<()> {
        debug!("bootstrapping system catalog");

        let (sys_tables_iam, sys_columns_iam) = self.read_iam_heads()?;

        let sys_tables_first = self.iam.allocate_for(sys_tables_iam)?;
        let sys_columns_first = self.iam.allocate_for(sys_columns_iam)?;

        let mut buffer = [0u8; PAGE_SIZE];
        SlottedPage::init(&mut buffer)?;
        self.disk.write_page(sys_tables_first, &buffer)?;

        buffer.fill(0);
        SlottedPage::init(&mut buffer)?;
        self.disk.write_page(sys_columns_first, &buffer)?;

        // first_page_id stores the IAM head, for the system tables included.
        let table_rows = [
            SysTablesRow::new(SYS_TABLES_OID, "sys_tables", sys_tables_iam, 4)?,
            SysTablesRow::new(SYS_COLUMNS_OID, "sys_columns", sys_columns_iam, 5)?,
        ];
        for row in &table_rows {
            self.insert_row(sys_tables_iam, row.as_bytes())?;
        }

        let column_rows = [
            SysColumnsRow::new(SYS_TABLES_OID, "oid", DataType::Integer, 4, 0)?,
            SysColumnsRow::new(SYS_TABLES_OID, "name", DataType::Varchar, 32, 4)?,
            SysColumnsRow::new(SYS_TABLES_OID, "first_page_id", DataType::Integer, 4, 36)?,
            SysColumnsRow::new(SYS_TABLES_OID, "column_count", DataType::Integer, 2, 40)?,
            SysColumnsRow::new(SYS_COLUMNS_OID, "table_oid", DataType::Integer, 4, 0)?,
            SysColumnsRow::new(SYS_COLUMNS_OID, "name", DataType::Varchar, 32, 4)?,
            SysColumnsRow::new(SYS_COLUMNS_OID, "type", DataType::Integer, 1, 36)?,
            SysColumnsRow::new(SYS_COLUMNS_OID, "length", DataType::Integer, 2, 37)?,
            SysColumnsRow::new(SYS_COLUMNS_OID, "offset", DataType::Integer, 2, 39)?,
        ];
        for row in &column_rows {
            self.insert_row(sys_columns_iam, row.as_bytes())?;
        }

        Ok(())
    }

    /// Looks a table up by name and assembles its metadata, or returns
    /// `None` when no such table exists.
    pub fn get_table(&self, name: &str) -> Result<Option<TableMetadata>> {
        let (sys_tables_iam, sys_columns_iam) = self.read_iam_heads()?;

        let mut found: Option<(u32, PageId)> = None;
        self.scan_rows(sys_tables_iam, |tuple| {
            let row = SysTablesRow::from_bytes(tuple)?;
            if row.name()? == name {
                found = Some((row.oid(), row.first_page_id()));
                return Ok(false);
            }
            Ok(true)
        })?;

        let Some((oid, first_page_id)) = found else {
            trace!(name, "table not found");
            return Ok(None);
        };

        let mut columns = Vec::new();
        self.scan_rows(sys_columns_iam, |tuple| {
            let row = SysColumnsRow::from_bytes(tuple)?;
            if row.table_oid() == oid {
                let data_type = row.data_type().ok_or_else(|| {
                    eyre::eyre!(
                        "corrupt type tag {} in sys_columns for table {}",
                        row.data_type_tag(),
                        oid
                    )
                })?;
                columns.push(Column::new(row.name()?, data_type, row.length(), row.offset()));
            }
            Ok(true)
        })?;

        trace!(name, oid, columns = columns.len(), "table resolved");
        Ok(Some(TableMetadata {
            oid,
            name: name.to_string(),
            first_page_id,
            schema: Schema::new(columns),
        }))
    }

    /// Highest OID currently recorded in `sys_tables`, floored so the first
    /// user table receives `FIRST_USER_OID`.
    fn next_oid(&self, sys_tables_iam: PageId) -> Result<u32> {
        let mut max_oid = 0u32;
        self.scan_rows(sys_tables_iam, |tuple| {
            max_oid = max_oid.max(SysTablesRow::from_bytes(tuple)?.oid());
            Ok(true)
        })?;
        Ok(max_oid.max(FIRST_USER_OID - 1) + 1)
    }

    /// Creates a table: assigns it an OID, starts its IAM chain, and records
    /// it in the system tables. Returns the new OID.
    pub fn create_table(&self, name: &str, schema: &Schema) -> Result<u32> {
        if self.get_table(name)?.is_some() {
            bail!("table '{}' already exists", name);
        }

        let (sys_tables_iam, sys_columns_iam) = self.read_iam_heads()?;
        let oid = self.next_oid(sys_tables_iam)?;

        let iam_head = self.iam.create_chain()?;

        let table_row = SysTablesRow::new(oid, name, iam_head, schema.column_count() as u16)?;
        self.insert_row(sys_tables_iam, table_row.as_bytes())?;

        for column in schema.columns() {
            let column_row = SysColumnsRow::new(
                oid,
                column.name(),
                column.data_type(),
                column.length(),
                column.offset(),
            )?;
            self.insert_row(sys_columns_iam, column_row.as_bytes())?;
        }

        debug!(name, oid, iam_head, "created table");
        Ok(oid)
    }
}
