//! Catalog discovery serialization: the Flight-SQL-shaped `GetTables` batch
//! (§4.2), built with Arrow array builders the way the teacher's
//! system-tables module assembles its summary batches, plus the ZStandard
//! framing applied to it before it goes on the wire.

use std::sync::Arc;

use arrow::array::StringBuilder;
use arrow::datatypes::{DataType, Field, Schema as ArrowSchema};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use catalog::{Catalog, FunctionKind};
use snafu::{ResultExt, Snafu};

const TABLE_TYPE: &str = "TABLE";
const SCALAR_FUNCTION_TYPE: &str = "SCALAR";
const TABLE_FUNCTION_TYPE: &str = "TABLE";

#[derive(Debug, Snafu)]
pub enum SerializeError {
    #[snafu(display("failed to build catalog record batch: {source}"))]
    Build { source: ArrowError },
    #[snafu(display("failed to compress catalog payload: {source}"))]
    Compress { source: std::io::Error },
    #[snafu(display("failed to decompress catalog payload: {source}"))]
    Decompress { source: std::io::Error },
    #[snafu(display("compressed payload is truncated"))]
    Truncated,
}

/// Schema of the discovery batch: `catalog_name`, `db_schema_name`,
/// `table_name`, `table_type`, matching Flight SQL's `GetTables` shape.
pub fn get_tables_schema() -> Arc<ArrowSchema> {
    Arc::new(ArrowSchema::new(vec![
        Field::new("catalog_name", DataType::Utf8, true),
        Field::new("db_schema_name", DataType::Utf8, false),
        Field::new("table_name", DataType::Utf8, false),
        Field::new("table_type", DataType::Utf8, false),
    ]))
}

/// Builds the single-batch `GetTables` response for `catalog`: one row per
/// table, in schema→table iteration order. `catalog_name` is always null
/// (this model has no nested-catalog concept inside a single catalog).
pub fn build_catalog_batch(catalog: &dyn Catalog) -> Result<RecordBatch, SerializeError> {
    let schema = get_tables_schema();

    let mut catalog_name = StringBuilder::new();
    let mut db_schema_name = StringBuilder::new();
    let mut table_name = StringBuilder::new();
    let mut table_type = StringBuilder::new();

    for schema_name in catalog.schema_names() {
        let Some(db_schema) = catalog.schema(&schema_name) else {
            continue;
        };
        for name in db_schema.table_names() {
            catalog_name.append_null();
            db_schema_name.append_value(&schema_name);
            table_name.append_value(&name);
            table_type.append_value(TABLE_TYPE);
        }
    }

    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(catalog_name.finish()),
            Arc::new(db_schema_name.finish()),
            Arc::new(table_name.finish()),
            Arc::new(table_type.finish()),
        ],
    )
    .context(BuildSnafu)
}

/// Schema of the function-discovery batch: `db_schema_name`,
/// `function_name`, `function_type` (`SCALAR` or `TABLE`), mirroring
/// [`get_tables_schema`]'s shape for the GetTables batch.
pub fn get_functions_schema() -> Arc<ArrowSchema> {
    Arc::new(ArrowSchema::new(vec![
        Field::new("db_schema_name", DataType::Utf8, false),
        Field::new("function_name", DataType::Utf8, false),
        Field::new("function_type", DataType::Utf8, false),
    ]))
}

/// Builds the single-batch function-discovery response for `catalog`: one
/// row per function, in schema→function iteration order.
pub fn build_function_batch(catalog: &dyn Catalog) -> Result<RecordBatch, SerializeError> {
    let schema = get_functions_schema();

    let mut db_schema_name = StringBuilder::new();
    let mut function_name = StringBuilder::new();
    let mut function_type = StringBuilder::new();

    for schema_name in catalog.schema_names() {
        let Some(db_schema) = catalog.schema(&schema_name) else {
            continue;
        };
        for name in db_schema.function_names() {
            let Some(function) = db_schema.function(&name) else {
                continue;
            };
            db_schema_name.append_value(&schema_name);
            function_name.append_value(&name);
            function_type.append_value(match function.kind() {
                FunctionKind::Scalar => SCALAR_FUNCTION_TYPE,
                FunctionKind::Table => TABLE_FUNCTION_TYPE,
            });
        }
    }

    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(db_schema_name.finish()),
            Arc::new(function_name.finish()),
            Arc::new(function_type.finish()),
        ],
    )
    .context(BuildSnafu)
}

/// Builds the function-discovery batch for `catalog`, encodes it as an
/// Arrow IPC stream, and compresses the result — the payload returned by
/// the `get_functions` `DoAction`.
pub fn serialize_functions(catalog: &dyn Catalog, level: i32) -> Result<Vec<u8>, SerializeError> {
    let batch = build_function_batch(catalog)?;
    let mut buffer = Vec::new();
    {
        let mut writer =
            arrow::ipc::writer::StreamWriter::try_new(&mut buffer, &batch.schema())
                .context(BuildSnafu)?;
        writer.write(&batch).context(BuildSnafu)?;
        writer.finish().context(BuildSnafu)?;
    }
    compress(&buffer, level)
}

/// Compresses `payload` with ZStandard at `level`, prefixed with the
/// original length so a stateless bulk decompressor knows how large a
/// buffer to allocate. Empty input is returned unchanged (compression is
/// skipped for empty inputs, §4.2).
pub fn compress(payload: &[u8], level: i32) -> Result<Vec<u8>, SerializeError> {
    if payload.is_empty() {
        return Ok(Vec::new());
    }
    let compressed = zstd::bulk::compress(payload, level).context(CompressSnafu)?;
    let mut framed = Vec::with_capacity(4 + compressed.len());
    framed.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    framed.extend_from_slice(&compressed);
    Ok(framed)
}

/// Builds the `GetTables` batch for `catalog`, encodes it as an Arrow IPC
/// stream, and compresses the result (§4.2) — the payload returned by the
/// `get_tables` `DoAction`.
pub fn serialize_catalog(catalog: &dyn Catalog, level: i32) -> Result<Vec<u8>, SerializeError> {
    let batch = build_catalog_batch(catalog)?;
    let mut buffer = Vec::new();
    {
        let mut writer =
            arrow::ipc::writer::StreamWriter::try_new(&mut buffer, &batch.schema())
                .context(BuildSnafu)?;
        writer.write(&batch).context(BuildSnafu)?;
        writer.finish().context(BuildSnafu)?;
    }
    compress(&buffer, level)
}

/// Inverse of [`compress`]. Empty input decompresses to empty output.
pub fn decompress(framed: &[u8]) -> Result<Vec<u8>, SerializeError> {
    if framed.is_empty() {
        return Ok(Vec::new());
    }
    if framed.len() < 4 {
        return Err(SerializeError::Truncated);
    }
    let (len_bytes, compressed) = framed.split_at(4);
    let original_len = u32::from_le_bytes(len_bytes.try_into().unwrap()) as usize;
    zstd::bulk::decompress(compressed, original_len).context(DecompressSnafu)
}
