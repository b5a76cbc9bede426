//! ODBC backend for the session traits.
//!
//! Each column is bound according to its reported type: bit, integer and
//! floating point columns with their native C types, `NCHAR`/`NVARCHAR`/
//! `NTEXT`/`XML` as UTF-16 text and everything else as narrow text in the
//! driver's textual form.
//!
//! When every character column has a reported length no larger than
//! [`FetchOptions::max_text_len`], rows are fetched in blocks into a
//! [`ColumnarAnyBuffer`] sized from those lengths, with truncation reported
//! as an error. Otherwise (`VARCHAR(MAX)`, `NVARCHAR(MAX)`, `XML` and other
//! long or unbounded columns) rows are fetched one at a time and each value
//! is read in full with `SQLGetData`.

use crate::connector::{ConnectionDescriptor, sql_server_drivers};
use crate::session::{DriverError, FetchOptions, QuerySession, Row, RowStream, SessionOpener};
use crate::value::CellValue;
use odbc_api::buffers::{AnySlice, BufferDesc, ColumnarAnyBuffer};
use odbc_api::handles::StatementImpl;
use odbc_api::sys::SqlDataType;
use odbc_api::{
    Bit, BlockCursor, Connection, ConnectionOptions, Cursor, CursorImpl, CursorRow, DataType,
    Nullable, ResultSetMetadata,
};
use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::time::Duration;
use tracing::{debug, trace};

pub use odbc_api::Environment;

/// SQL Server's `xml` type, reported as a driver-specific SQL type.
const SS_XML: SqlDataType = SqlDataType(-152);

/// Creates the ODBC environment shared by every connection of a run.
///
/// # Errors
/// Returns the driver manager's error when no environment can be allocated
pub fn create_environment() -> Result<Environment, DriverError> {
    Environment::new().map_err(driver_error)
}

/// Installed SQL Server drivers known to the driver manager.
///
/// # Errors
/// Returns the driver manager's error when the driver list is unavailable
pub fn list_available_drivers(env: &Environment) -> Result<BTreeSet<String>, DriverError> {
    let drivers = env.drivers().map_err(driver_error)?;
    debug!("Driver manager reports {} drivers", drivers.len());
    Ok(sql_server_drivers(
        drivers.into_iter().map(|driver| driver.description),
    ))
}

/// Opens ODBC connections from descriptors.
#[derive(Debug, Clone, Copy)]
pub struct OdbcOpener<'env> {
    env: &'env Environment,
}

impl<'env> OdbcOpener<'env> {
    /// Creates an opener on `env`.
    pub fn new(env: &'env Environment) -> Self {
        Self { env }
    }
}

impl<'env> SessionOpener for OdbcOpener<'env> {
    type Session = OdbcSession<'env>;

    fn open(
        &self,
        descriptor: &ConnectionDescriptor,
        login_timeout: Duration,
    ) -> Result<OdbcSession<'env>, DriverError> {
        let options = ConnectionOptions {
            login_timeout_sec: Some(u32::try_from(login_timeout.as_secs()).unwrap_or(u32::MAX)),
            ..ConnectionOptions::default()
        };
        let connection_string = descriptor.connection_string();
        let connection = self
            .env
            .connect_with_connection_string(&connection_string, options)
            .map_err(driver_error)?;
        Ok(OdbcSession { connection })
    }
}

/// An open ODBC connection.
pub struct OdbcSession<'env> {
    connection: Connection<'env>,
}

impl std::fmt::Debug for OdbcSession<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OdbcSession").finish_non_exhaustive()
    }
}

impl<'env> QuerySession for OdbcSession<'env> {
    type Rows<'s>
        = OdbcRows<'s>
    where
        Self: 's;

    fn execute<'s>(
        &'s mut self,
        sql: &str,
        fetch: &FetchOptions,
    ) -> Result<Option<OdbcRows<'s>>, DriverError> {
        let Some(mut cursor) = self.connection.execute(sql, ()).map_err(driver_error)? else {
            return Ok(None);
        };

        let column_count = cursor.num_result_cols().map_err(driver_error)?;
        let column_count = u16::try_from(column_count).unwrap_or_default();
        if column_count == 0 {
            return Ok(None);
        }

        let columns = cursor
            .column_names()
            .map_err(driver_error)?
            .collect::<Result<Vec<String>, _>>()
            .map_err(driver_error)?;

        let mut plans = Vec::with_capacity(usize::from(column_count));
        for column in 1..=column_count {
            let data_type = cursor.col_data_type(column).map_err(driver_error)?;
            let plan = ColumnPlan::for_type(data_type);
            trace!("Column {} has type {:?}, bound as {:?}", column, data_type, plan);
            plans.push(plan);
        }

        let source = if plans.iter().all(|plan| plan.fits(fetch.max_text_len)) {
            let buffer = ColumnarAnyBuffer::try_from_descs(
                fetch.batch_size,
                plans.iter().map(|plan| plan.buffer_desc(fetch.max_text_len)),
            )
            .map_err(driver_error)?;
            RowSource::Block(cursor.bind_buffer(buffer).map_err(driver_error)?)
        } else {
            debug!("Result set has long or unbounded text columns, fetching row by row");
            RowSource::Streamed(StreamedRows {
                cursor,
                kinds: plans.iter().map(|plan| plan.kind).collect(),
                batch_size: fetch.batch_size.max(1),
                text: Vec::new(),
                wide: Vec::new(),
                exhausted: false,
            })
        };

        Ok(Some(OdbcRows { columns, source }))
    }
}

/// A result set fetched in batches.
pub struct OdbcRows<'s> {
    columns: Vec<String>,
    source: RowSource<'s>,
}

enum RowSource<'s> {
    Block(BlockCursor<CursorImpl<StatementImpl<'s>>, ColumnarAnyBuffer>),
    Streamed(StreamedRows<'s>),
}

/// Unbound cursor read one row at a time, values fetched in full.
struct StreamedRows<'s> {
    cursor: CursorImpl<StatementImpl<'s>>,
    kinds: Vec<ColumnKind>,
    batch_size: usize,
    text: Vec<u8>,
    wide: Vec<u16>,
    exhausted: bool,
}

impl StreamedRows<'_> {
    fn next_batch(&mut self) -> Result<Option<Vec<Row>>, odbc_api::Error> {
        if self.exhausted {
            return Ok(None);
        }

        let mut rows = Vec::new();
        while rows.len() < self.batch_size {
            let Some(mut row) = self.cursor.next_row()? else {
                self.exhausted = true;
                break;
            };
            let mut cells = Vec::with_capacity(self.kinds.len());
            for (column, kind) in (1..).zip(&self.kinds) {
                cells.push(read_cell(
                    &mut row,
                    column,
                    *kind,
                    &mut self.text,
                    &mut self.wide,
                )?);
            }
            rows.push(cells);
        }

        Ok((!rows.is_empty()).then_some(rows))
    }
}

impl RowStream for OdbcRows<'_> {
    fn column_names(&self) -> &[String] {
        &self.columns
    }

    fn next_batch(&mut self) -> Result<Option<Vec<Row>>, DriverError> {
        let width = self.columns.len();
        let cursor = match &mut self.source {
            RowSource::Block(cursor) => cursor,
            RowSource::Streamed(streamed) => {
                let rows = streamed.next_batch().map_err(driver_error)?;
                if let Some(rows) = &rows {
                    trace!("Fetched {} rows", rows.len());
                }
                return Ok(rows);
            }
        };

        let Some(batch) = cursor
            .fetch_with_truncation_check(true)
            .map_err(driver_error)?
        else {
            return Ok(None);
        };

        let row_count = batch.num_rows();
        let mut rows: Vec<Row> = (0..row_count).map(|_| Vec::with_capacity(width)).collect();
        for index in 0..width {
            for (row, cell) in rows.iter_mut().zip(column_cells(batch.column(index))) {
                row.push(cell);
            }
        }
        trace!("Fetched {} rows", row_count);
        Ok(Some(rows))
    }
}

/// How a column is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Bit,
    Integer,
    Float,
    Text,
    WideText,
}

impl ColumnKind {
    fn for_type(data_type: DataType) -> Self {
        match data_type {
            DataType::Bit => Self::Bit,
            DataType::TinyInt | DataType::SmallInt | DataType::Integer | DataType::BigInt => {
                Self::Integer
            }
            DataType::Real | DataType::Float { .. } | DataType::Double => Self::Float,
            DataType::WChar { .. } | DataType::WVarchar { .. } => Self::WideText,
            DataType::Other { data_type, .. }
                if data_type == SqlDataType::EXT_W_LONG_VARCHAR || data_type == SS_XML =>
            {
                Self::WideText
            }
            _ => Self::Text,
        }
    }
}

/// Binding of one result column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ColumnPlan {
    kind: ColumnKind,
    /// Longest value in buffer elements (bytes, or UTF-16 units for wide
    /// text); `None` when the driver reports no upper bound
    max_len: Option<usize>,
}

impl ColumnPlan {
    fn for_type(data_type: DataType) -> Self {
        let kind = ColumnKind::for_type(data_type);
        let max_len = match kind {
            ColumnKind::Text => data_type.utf8_len(),
            ColumnKind::WideText => data_type.utf16_len(),
            ColumnKind::Bit | ColumnKind::Integer | ColumnKind::Float => data_type.display_size(),
        };
        Self {
            kind,
            max_len: max_len.map(NonZeroUsize::get),
        }
    }

    /// Whether every value fits a block buffer element of `max_text_len`.
    fn fits(self, max_text_len: usize) -> bool {
        match self.kind {
            ColumnKind::Text | ColumnKind::WideText => {
                self.max_len.is_some_and(|len| len <= max_text_len)
            }
            ColumnKind::Bit | ColumnKind::Integer | ColumnKind::Float => true,
        }
    }

    fn buffer_desc(self, max_text_len: usize) -> BufferDesc {
        let max_str_len = self.max_len.unwrap_or(max_text_len).clamp(1, max_text_len.max(1));
        match self.kind {
            ColumnKind::Bit => BufferDesc::Bit { nullable: true },
            ColumnKind::Integer => BufferDesc::I64 { nullable: true },
            ColumnKind::Float => BufferDesc::F64 { nullable: true },
            ColumnKind::Text => BufferDesc::Text { max_str_len },
            ColumnKind::WideText => BufferDesc::WText { max_str_len },
        }
    }
}

fn read_cell(
    row: &mut CursorRow<'_>,
    column: u16,
    kind: ColumnKind,
    text: &mut Vec<u8>,
    wide: &mut Vec<u16>,
) -> Result<CellValue, odbc_api::Error> {
    let cell = match kind {
        ColumnKind::Bit => {
            let mut value = Nullable::<Bit>::null();
            row.get_data(column, &mut value)?;
            value
                .into_opt()
                .map_or(CellValue::Null, |bit| CellValue::Bool(bit.0 != 0))
        }
        ColumnKind::Integer => {
            let mut value = Nullable::<i64>::null();
            row.get_data(column, &mut value)?;
            value.into_opt().map_or(CellValue::Null, CellValue::Int)
        }
        ColumnKind::Float => {
            let mut value = Nullable::<f64>::null();
            row.get_data(column, &mut value)?;
            value.into_opt().map_or(CellValue::Null, CellValue::Float)
        }
        ColumnKind::Text => {
            if row.get_text(column, text)? {
                CellValue::Text(String::from_utf8_lossy(text).into_owned())
            } else {
                CellValue::Null
            }
        }
        ColumnKind::WideText => {
            if row.get_wide_text(column, wide)? {
                CellValue::Text(String::from_utf16_lossy(wide))
            } else {
                CellValue::Null
            }
        }
    };
    Ok(cell)
}

fn column_cells(slice: AnySlice<'_>) -> Vec<CellValue> {
    match slice {
        AnySlice::NullableBit(values) => values
            .map(|value| value.map_or(CellValue::Null, |bit| CellValue::Bool(bit.0 != 0)))
            .collect(),
        AnySlice::NullableI64(values) => values
            .map(|value| value.map_or(CellValue::Null, |v| CellValue::Int(*v)))
            .collect(),
        AnySlice::NullableF64(values) => values
            .map(|value| value.map_or(CellValue::Null, |v| CellValue::Float(*v)))
            .collect(),
        AnySlice::Text(view) => view
            .iter()
            .map(|value| {
                value.map_or(CellValue::Null, |bytes| {
                    CellValue::Text(String::from_utf8_lossy(bytes).into_owned())
                })
            })
            .collect(),
        AnySlice::WText(view) => view
            .iter()
            .map(|value| {
                value.map_or(CellValue::Null, |units| {
                    CellValue::Text(String::from_utf16_lossy(units.as_slice()))
                })
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Converts an `odbc-api` error, keeping SQLSTATE and native code.
fn driver_error(error: odbc_api::Error) -> DriverError {
    let converted = DriverError::new(error.to_string());
    match &error {
        odbc_api::Error::Diagnostics { record, .. } => converted
            .with_sqlstate(record.state.as_str())
            .with_native_code(record.native_error),
        _ => converted,
    }
}
