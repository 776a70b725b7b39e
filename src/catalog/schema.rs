//! # Column and Schema Definitions
//!
//! In-memory description of a table's structure, assembled from
//! `sys_columns` rows on lookup and handed to `create_table` by callers.
//! The physical tuple layout is explicit: every column carries the byte
//! offset where its value lives inside the user tuple.

use crate::catalog::defs::DataType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    name: String,
    data_type: DataType,
    length: u16,
    offset: u16,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType, length: u16, offset: u16) -> Self {
        Self {
            name: name.into(),
            data_type,
            length,
            offset,
        }
    }

    /// Convenience constructor for fixed-width types, where the length is
    /// implied by the type.
    pub fn fixed(name: impl Into<String>, data_type: DataType, offset: u16) -> Self {
        Self {
            name: name.into(),
            data_type,
            length: data_type.fixed_size(),
            offset,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn length(&self) -> u16 {
        self.length
    }

    pub fn offset(&self) -> u16 {
        self.offset
    }
}

/// An ordered collection of columns. Order follows the scan order of
/// `sys_columns`, which is the insertion order for freshly created tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<Column>,
    tuple_length: u32,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        let tuple_length = columns.iter().map(|c| c.length() as u32).sum();
        Self {
            columns,
            tuple_length,
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    /// Total bytes of a tuple with every column at its declared length.
    pub fn tuple_length(&self) -> u32 {
        self.tuple_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_schema() -> Schema {
        Schema::new(vec![
            Column::fixed("id", DataType::Integer, 0),
            Column::new("username", DataType::Varchar, 32, 4),
            Column::fixed("active", DataType::Boolean, 36),
        ])
    }

    #[test]
    fn fixed_constructor_uses_type_width() {
        let column = Column::fixed("id", DataType::Integer, 0);
        assert_eq!(column.length(), 4);

        let column = Column::fixed("created", DataType::Timestamp, 4);
        assert_eq!(column.length(), 24);
    }

    #[test]
    fn tuple_length_sums_column_lengths() {
        let schema = sample_schema();
        assert_eq!(schema.tuple_length(), 4 + 32 + 1);
    }

    #[test]
    fn column_lookup_by_name() {
        let schema = sample_schema();

        let column = schema.column("username").unwrap();
        assert_eq!(column.data_type(), DataType::Varchar);
        assert_eq!(column.offset(), 4);

        assert!(schema.column("ghost").is_none());
    }

    #[test]
    fn columns_keep_declaration_order() {
        let schema = sample_schema();
        let names: Vec<&str> = schema.columns().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["id", "username", "active"]);
    }
}
