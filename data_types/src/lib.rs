//! Shared types used across the airport server: scalar values, scan/DML
//! options and results, table capabilities, transactions, and the top-level
//! error enum every RPC handler maps to a [`tonic::Status`].

use std::pin::Pin;

use arrow::datatypes::SchemaRef;
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use futures::Stream;
use ordered_float::OrderedFloat;
use snafu::Snafu;

/// A stream of record batches, as produced by a table scan or a DML
/// operation with `RETURNING`. Defined locally rather than reused from a
/// query-execution crate, since planning/execution of queries is not part
/// of this system.
pub type RecordBatchStream =
    Pin<Box<dyn Stream<Item = Result<RecordBatch, ArrowError>> + Send>>;

/// Identifies the logical type of a [`Value`]. Mirrors the client's type
/// vocabulary; an id this server doesn't recognize is preserved rather than
/// rejected, so that pushdown that doesn't involve that literal still works.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalTypeId {
    Boolean,
    Integer,
    UnsignedInteger,
    Float,
    Utf8,
    Date,
    Timestamp,
    Uuid,
    Unknown(i32),
}

/// A typed scalar literal appearing in a pushed-down filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null(LogicalTypeId),
    Boolean(bool),
    Integer(i64),
    UnsignedInteger(u64),
    Float(OrderedFloat<f64>),
    Utf8(String),
    Date(chrono::NaiveDate),
    Timestamp(chrono::NaiveDateTime),
    Uuid(uuid::Uuid),
}

impl Value {
    pub fn type_id(&self) -> LogicalTypeId {
        match self {
            Value::Null(id) => *id,
            Value::Boolean(_) => LogicalTypeId::Boolean,
            Value::Integer(_) => LogicalTypeId::Integer,
            Value::UnsignedInteger(_) => LogicalTypeId::UnsignedInteger,
            Value::Float(_) => LogicalTypeId::Float,
            Value::Utf8(_) => LogicalTypeId::Utf8,
            Value::Date(_) => LogicalTypeId::Date,
            Value::Timestamp(_) => LogicalTypeId::Timestamp,
            Value::Uuid(_) => LogicalTypeId::Uuid,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null(_))
    }
}

/// The DML capabilities a [`Table`](trait@catalog's Table trait, see the
/// `catalog` crate) declares, replacing duck-typed trait-object probing
/// (§9 REDESIGN FLAGS) with an explicit tagged set the handler consults
/// before ever invoking user code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCapabilities {
    pub insert: bool,
    pub update: bool,
    pub delete: bool,
}

impl TableCapabilities {
    pub const fn read_only() -> Self {
        Self {
            insert: false,
            update: false,
            delete: false,
        }
    }

    pub const fn full() -> Self {
        Self {
            insert: true,
            update: true,
            delete: true,
        }
    }
}

/// Arguments to a table scan (§3).
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Ordered column projection; empty means "all columns".
    pub columns: Vec<String>,
    /// Opaque pushdown filter payload, in the client's JSON format.
    pub filter: Option<bytes::Bytes>,
    pub limit: Option<usize>,
    pub transaction_id: Option<String>,
}

/// Arguments to an insert/update/delete (§3).
#[derive(Debug, Clone)]
pub struct DmlOptions {
    pub returning: bool,
    pub returning_columns: Vec<String>,
    pub transaction_id: Option<String>,
    pub input_schema: SchemaRef,
}

/// The outcome of an insert/update/delete (§3).
pub struct DmlResult {
    pub rows_affected: u64,
    pub returning: Option<RecordBatchStream>,
}

impl std::fmt::Debug for DmlResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DmlResult")
            .field("rows_affected", &self.rows_affected)
            .field("returning", &self.returning.is_some())
            .finish()
    }
}

/// Lifecycle state of a [`Transaction`]. Terminal once non-active (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

impl TransactionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionState::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionState::Active => "active",
            TransactionState::Committed => "committed",
            TransactionState::Aborted => "aborted",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: String,
    pub state: TransactionState,
    pub catalog: String,
}

/// Crate-spanning error type every RPC handler eventually maps to a
/// [`tonic::Status`] per §6's error-mapping table.
#[derive(Debug, Snafu)]
pub enum AirportError {
    #[snafu(display("unknown catalog '{name}'"))]
    UnknownCatalog { name: String },

    #[snafu(display("unknown schema '{name}'"))]
    UnknownSchema { name: String },

    #[snafu(display("unknown table '{name}'"))]
    UnknownTable { name: String },

    #[snafu(display("unknown transaction '{id}'"))]
    UnknownTransaction { id: String },

    #[snafu(display("malformed request: {message}"))]
    InvalidArgument { message: String },

    #[snafu(display("'{action}' is not implemented by this table"))]
    Unimplemented { action: String },

    #[snafu(display("missing or invalid bearer token"))]
    Unauthenticated,

    #[snafu(display("not authorized for catalog '{catalog}'"))]
    PermissionDenied { catalog: String },

    #[snafu(display("internal error: {message}"))]
    Internal { message: String },

    #[snafu(display("request canceled"))]
    Cancelled,
}

impl From<AirportError> for tonic::Status {
    fn from(err: AirportError) -> Self {
        match err {
            AirportError::UnknownCatalog { .. }
            | AirportError::UnknownSchema { .. }
            | AirportError::UnknownTable { .. }
            | AirportError::UnknownTransaction { .. } => {
                tonic::Status::not_found(err.to_string())
            }
            AirportError::InvalidArgument { .. } => {
                tonic::Status::invalid_argument(err.to_string())
            }
            AirportError::Unimplemented { .. } => tonic::Status::unimplemented(err.to_string()),
            AirportError::Unauthenticated => tonic::Status::unauthenticated(err.to_string()),
            AirportError::PermissionDenied { .. } => {
                tonic::Status::permission_denied(err.to_string())
            }
            AirportError::Internal { .. } => tonic::Status::internal(err.to_string()),
            AirportError::Cancelled => tonic::Status::cancelled(err.to_string()),
        }
    }
}
