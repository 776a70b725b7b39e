//! # System Catalog
//!
//! Table metadata for the whole database, stored in the database itself.
//! Two system tables carry everything:
//!
//! ```text
//! sys_tables  (OID 1)          sys_columns (OID 2)
//! ┌─────┬──────┬──────┬─────┐  ┌─────┬──────┬──────┬────────┬────────┐
//! │ oid │ name │ iam  │ #col│  │ oid │ name │ type │ length │ offset │
//! └─────┴──────┴──────┴─────┘  └─────┴──────┴──────┴────────┴────────┘
//! ```
//!
//! The tables describe themselves: their own rows appear in `sys_tables`,
//! and the nine rows describing both layouts appear in `sys_columns`. The
//! database header pins their IAM chain heads (pages 2 and 3), which breaks
//! the circularity on lookup.
//!
//! ## Module Organization
//!
//! - [`defs`]: fixed-width on-disk row structs, `DataType`, reserved OIDs
//! - [`schema`]: in-memory `Column` / `Schema` descriptions
//! - [`manager`]: bootstrap, name lookup, and table creation

pub mod defs;
pub mod manager;
pub mod schema;

pub use defs::{
    DataType, SysColumnsRow, SysTablesRow, FIRST_USER_OID, SYS_COLUMNS_OID,
    SYS_COLUMNS_ROW_SIZE, SYS_TABLES_OID, SYS_TABLES_ROW_SIZE,
};
pub use manager::{CatalogManager, TableMetadata};
pub use schema::{Column, Schema};
