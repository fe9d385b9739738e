use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::driver::ColumnMetadata;
use crate::error::SqlBridgeError;
use crate::lob::LobContext;
use crate::types::{FromHostValue, HostType, HostValue, SqlType, SqlValue};

/// Column layout shared by every row of one cursor.
#[derive(Debug)]
pub struct ColumnSet {
    columns: Vec<ColumnMetadata>,
    // Upper-cased names; the first column wins on duplicates.
    index: HashMap<String, usize>,
}

impl ColumnSet {
    #[must_use]
    pub fn new(columns: Vec<ColumnMetadata>) -> Self {
        let mut index = HashMap::with_capacity(columns.len());
        for (i, column) in columns.iter().enumerate() {
            index.entry(column.name.to_ascii_uppercase()).or_insert(i);
        }
        Self { columns, index }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&ColumnMetadata> {
        self.columns.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnMetadata> {
        self.columns.iter()
    }

    /// Case-insensitive lookup.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        if let Some(&idx) = self.index.get(name) {
            return Some(idx);
        }
        self.index.get(&name.to_ascii_uppercase()).copied()
    }
}

/// Something that picks a column out of a [`ColumnSet`]: a zero-based index or a name.
pub trait ColumnIndex: fmt::Display {
    fn locate(&self, columns: &ColumnSet) -> Option<usize>;
}

impl ColumnIndex for usize {
    fn locate(&self, columns: &ColumnSet) -> Option<usize> {
        (*self < columns.len()).then_some(*self)
    }
}

impl ColumnIndex for &str {
    fn locate(&self, columns: &ColumnSet) -> Option<usize> {
        columns.index_of(self)
    }
}

impl ColumnIndex for String {
    fn locate(&self, columns: &ColumnSet) -> Option<usize> {
        columns.index_of(self)
    }
}

/// One fetched row.
///
/// Values are decoded on access. LOB columns become a single [`crate::lob::Blob`] or
/// [`crate::lob::Clob`] handle when the row arrives; every access returns a clone of that
/// handle, and it stops working once the stream moves to the next row.
pub struct Row {
    columns: Arc<ColumnSet>,
    values: Vec<SqlValue>,
    lobs: Vec<Option<HostValue>>,
    context: LobContext,
}

impl Row {
    pub(crate) fn new(
        columns: Arc<ColumnSet>,
        values: Vec<SqlValue>,
        context: LobContext,
    ) -> Result<Self, SqlBridgeError> {
        if values.len() != columns.len() {
            return Err(SqlBridgeError::ExecutionError(format!(
                "driver returned {} values for {} columns",
                values.len(),
                columns.len()
            )));
        }
        let registry = context.connection.registry();
        let mut lobs = Vec::with_capacity(values.len());
        for (value, column) in values.iter().zip(columns.iter()) {
            lobs.push(match value {
                SqlValue::Lob(_) => Some(registry.decode_with(
                    value.clone(),
                    column.sql_type,
                    None,
                    Some(&context),
                )?),
                _ => None,
            });
        }
        Ok(Self {
            columns,
            values,
            lobs,
            context,
        })
    }

    #[must_use]
    pub fn columns(&self) -> &ColumnSet {
        &self.columns
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn position(&self, column: &impl ColumnIndex) -> Result<usize, SqlBridgeError> {
        column.locate(&self.columns).ok_or_else(|| {
            SqlBridgeError::ExecutionError(format!("no column {column} in this row"))
        })
    }

    /// The driver representation of a column.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::ExecutionError`] for an unknown column.
    pub fn raw(&self, column: impl ColumnIndex) -> Result<&SqlValue, SqlBridgeError> {
        let idx = self.position(&column)?;
        Ok(&self.values[idx])
    }

    /// SQL type of a column as the driver described it.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::ExecutionError`] for an unknown column.
    pub fn sql_type(&self, column: impl ColumnIndex) -> Result<SqlType, SqlBridgeError> {
        let idx = self.position(&column)?;
        Ok(self.columns.columns[idx].sql_type)
    }

    /// Decode a column to its default host type.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::ExecutionError`] for an unknown column and
    /// [`SqlBridgeError::UnsupportedConversionError`] if the value cannot be decoded.
    pub fn get(&self, column: impl ColumnIndex) -> Result<HostValue, SqlBridgeError> {
        self.decode(&column, None)
    }

    /// Decode a column to a specific host type.
    ///
    /// # Errors
    /// As [`Row::get`], plus [`SqlBridgeError::UnsupportedConversionError`] when the column's
    /// SQL type has no converter to `host_type`.
    pub fn get_typed(
        &self,
        column: impl ColumnIndex,
        host_type: HostType,
    ) -> Result<HostValue, SqlBridgeError> {
        self.decode(&column, Some(host_type))
    }

    /// Decode a column straight into a Rust value; SQL null becomes `None`.
    ///
    /// # Errors
    /// As [`Row::get_typed`].
    pub fn get_as<T: FromHostValue>(
        &self,
        column: impl ColumnIndex,
    ) -> Result<Option<T>, SqlBridgeError> {
        self.decode(&column, Some(T::HOST_TYPE))?.into_option()
    }

    fn decode(
        &self,
        column: &impl ColumnIndex,
        requested: Option<HostType>,
    ) -> Result<HostValue, SqlBridgeError> {
        let idx = self.position(column)?;
        let sql_type = self.columns.columns[idx].sql_type;
        if let Some(handle) = &self.lobs[idx] {
            return match requested {
                Some(host) if host != handle.host_type() => Err(SqlBridgeError::unsupported(
                    format!("{sql_type} cannot be read as {host}"),
                )),
                _ => Ok(handle.clone()),
            };
        }
        self.context.connection.registry().decode_with(
            self.values[idx].clone(),
            sql_type,
            requested,
            Some(&self.context),
        )
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (column, value) in self.columns.iter().zip(&self.values) {
            map.entry(&column.name, value);
        }
        map.finish()
    }
}
