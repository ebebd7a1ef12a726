//! Arrow schema helpers used by the catalog model: computing a projected
//! schema for a requested column list (§4.1's projection contract) and
//! marking/recognizing the row-identifier pseudo-column DML addresses rows
//! by.

use std::sync::Arc;

use arrow::datatypes::{Field, Schema, SchemaRef};
use itertools::Itertools;
use snafu::prelude::*;

/// Key-value metadata entry a `Field` carries to mark itself as the
/// row-identifier pseudo-column used by `update`/`delete` (§3).
pub const ROWID_METADATA_KEY: &str = "is_rowid";

#[derive(Debug, Snafu)]
pub enum ProjectionError {
    #[snafu(display("column '{name}' is not present in the table's schema"))]
    UnknownColumn { name: String },

    #[snafu(display("column '{name}' is the rowid pseudo-column and cannot be projected directly"))]
    RowidNotProjectable { name: String },
}

/// Returns whether `field` is marked as the rowid pseudo-column.
pub fn is_rowid_field(field: &Field) -> bool {
    field
        .metadata()
        .get(ROWID_METADATA_KEY)
        .map(|v| v == "true")
        .unwrap_or(false)
}

/// Returns the name of `schema`'s rowid pseudo-column, if it has one.
pub fn rowid_column_name(schema: &Schema) -> Option<&str> {
    schema.fields().iter().find_map(|f| {
        if is_rowid_field(f) {
            Some(f.name().as_str())
        } else {
            None
        }
    })
}

/// Clones `field` with the rowid metadata key set, for table implementations
/// that want to mark their row-identifier column declaratively.
pub fn mark_rowid(field: Field) -> Field {
    let mut metadata = field.metadata().clone();
    metadata.insert(ROWID_METADATA_KEY.to_string(), "true".to_string());
    field.with_metadata(metadata)
}

/// Computes the projected schema for a requested, ordered column list.
///
/// An empty `columns` list means "the full schema" (excluding the rowid
/// pseudo-column, which is never part of the user-visible projection).
/// Requesting the rowid column by name is rejected unless `include_rowid` is
/// set — only the DML path inside the handler is allowed to ask for it.
pub fn project(
    schema: &Schema,
    columns: &[String],
    include_rowid: bool,
) -> Result<SchemaRef, ProjectionError> {
    if columns.is_empty() {
        let fields = schema
            .fields()
            .iter()
            .filter(|f| include_rowid || !is_rowid_field(f))
            .cloned()
            .collect_vec();
        return Ok(Arc::new(Schema::new(fields)));
    }

    let fields = columns
        .iter()
        .map(|name| {
            let field = schema
                .fields()
                .iter()
                .find(|f| f.name() == name)
                .cloned()
                .context(UnknownColumnSnafu { name })?;
            if is_rowid_field(&field) && !include_rowid {
                return RowidNotProjectableSnafu { name }.fail();
            }
            Ok(field)
        })
        .collect::<Result<Vec<_>, ProjectionError>>()?;

    Ok(Arc::new(Schema::new(fields)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::DataType;

    fn sample_schema() -> Schema {
        Schema::new(vec![
            mark_rowid(Field::new("_rowid", DataType::UInt64, false)),
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
            Field::new("email", DataType::Utf8, true),
        ])
    }

    #[test]
    fn empty_projection_is_full_schema_minus_rowid() {
        let schema = sample_schema();
        let projected = project(&schema, &[], false).unwrap();
        assert_eq!(
            projected
                .fields()
                .iter()
                .map(|f| f.name().clone())
                .collect_vec(),
            vec!["id", "name", "email"]
        );
    }

    #[test]
    fn projection_preserves_requested_order() {
        let schema = sample_schema();
        let projected = project(
            &schema,
            &["name".to_string(), "id".to_string()],
            false,
        )
        .unwrap();
        assert_eq!(
            projected
                .fields()
                .iter()
                .map(|f| f.name().clone())
                .collect_vec(),
            vec!["name", "id"]
        );
    }

    #[test]
    fn unknown_column_is_an_error() {
        let schema = sample_schema();
        let err = project(&schema, &["bogus".to_string()], false).unwrap_err();
        assert!(matches!(err, ProjectionError::UnknownColumn { .. }));
    }

    #[test]
    fn rowid_rejected_unless_explicitly_included() {
        let schema = sample_schema();
        let err = project(&schema, &["_rowid".to_string()], false).unwrap_err();
        assert!(matches!(err, ProjectionError::RowidNotProjectable { .. }));

        let projected = project(&schema, &["_rowid".to_string()], true).unwrap();
        assert_eq!(projected.fields().len(), 1);
    }

    #[test]
    fn rowid_column_name_lookup() {
        let schema = sample_schema();
        assert_eq!(rowid_column_name(&schema), Some("_rowid"));
    }
}
