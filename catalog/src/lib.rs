//! The catalog/schema/table object model (§3, §4.1) and the transaction
//! registry (§4.6).
//!
//! `Catalog` is a tree, never a graph: a catalog holds schemas, a schema
//! holds tables. `CatalogBuilder` gives a declarative construction path for
//! the common case of wiring up a handful of in-memory-described tables
//! without hand-writing a `Catalog` impl.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use arrow::datatypes::SchemaRef;
use async_trait::async_trait;
use data_types::{
    AirportError, DmlOptions, DmlResult, RecordBatchStream, ScanOptions, TableCapabilities,
    Transaction, TransactionState, UnknownTransactionSnafu,
};
use observability_deps::tracing::debug;
use snafu::prelude::*;

/// A source of Arrow record batches with a fixed logical schema and,
/// optionally, DML capabilities (§3, §4.1).
#[async_trait]
pub trait Table: Send + Sync {
    fn name(&self) -> &str;

    fn comment(&self) -> Option<&str> {
        None
    }

    /// The table's full logical schema (unprojected).
    fn arrow_schema(&self) -> SchemaRef;

    /// Which DML operations this table supports. Consulted by the handler
    /// *before* calling `insert`/`update`/`delete` — an unset flag never
    /// results in a call into user code (§4.1, §9 Open Question (e)).
    fn capabilities(&self) -> TableCapabilities {
        TableCapabilities::read_only()
    }

    /// Computes the projected schema for a requested, ordered column list
    /// (§4.1's projection contract).
    fn projected_schema(
        &self,
        columns: &[String],
    ) -> Result<SchemaRef, schema::ProjectionError> {
        schema::project(&self.arrow_schema(), columns, false)
    }

    async fn scan(&self, options: ScanOptions) -> Result<RecordBatchStream, AirportError>;

    async fn insert(
        &self,
        _options: DmlOptions,
        _input: RecordBatchStream,
    ) -> Result<DmlResult, AirportError> {
        Err(unimplemented("insert"))
    }

    async fn update(
        &self,
        _options: DmlOptions,
        _input: RecordBatchStream,
    ) -> Result<DmlResult, AirportError> {
        Err(unimplemented("update"))
    }

    async fn delete(
        &self,
        _options: DmlOptions,
        _input: RecordBatchStream,
    ) -> Result<DmlResult, AirportError> {
        Err(unimplemented("delete"))
    }
}

fn unimplemented(action: &'static str) -> AirportError {
    AirportError::Unimplemented {
        action: action.to_string(),
    }
}

/// Whether a [`Function`] is called per-row (scalar) or produces a relation
/// (table function).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Scalar,
    Table,
}

/// A named scalar or table function within a [`Schema`] (§3). Functions and
/// tables are separate namespaces: a schema may declare both a table and a
/// function sharing the same name.
pub trait Function: Send + Sync {
    fn name(&self) -> &str;

    fn comment(&self) -> Option<&str> {
        None
    }

    fn kind(&self) -> FunctionKind;
}

/// A [`Function`] with no execution behavior of its own, for catalogs that
/// only need to advertise a function's existence via discovery.
pub struct SimpleFunction {
    name: String,
    comment: Option<String>,
    kind: FunctionKind,
}

impl SimpleFunction {
    pub fn new(name: impl Into<String>, kind: FunctionKind) -> Self {
        Self {
            name: name.into(),
            comment: None,
            kind,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

impl Function for SimpleFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    fn kind(&self) -> FunctionKind {
        self.kind
    }
}

/// A named grouping of tables and functions within a [`Catalog`]. Schema
/// names are unique within a catalog (§3).
pub trait Schema: Send + Sync {
    fn name(&self) -> &str;

    fn comment(&self) -> Option<&str> {
        None
    }

    fn table_names(&self) -> Vec<String>;

    fn table(&self, name: &str) -> Option<Arc<dyn Table>>;

    /// Scalar and table functions declared on this schema. Schemas with no
    /// functions don't need to override this.
    fn function_names(&self) -> Vec<String> {
        Vec::new()
    }

    fn function(&self, _name: &str) -> Option<Arc<dyn Function>> {
        None
    }
}

/// A collection of named [`Schema`]s (§3). The top-level object a single
/// `AirportFlightService` serves; the multi-catalog dispatcher holds one of
/// these per routable catalog name.
pub trait Catalog: Send + Sync {
    fn schema_names(&self) -> Vec<String>;

    fn schema(&self, name: &str) -> Option<Arc<dyn Schema>>;
}

/// A future that resolves to a table's scan result, boxed so `SimpleTable`
/// can store it as a trait object field.
pub type ScanFuture = Pin<Box<dyn Future<Output = Result<RecordBatchStream, AirportError>> + Send>>;
type ScanFn = Arc<dyn Fn(ScanOptions) -> ScanFuture + Send + Sync>;

/// A `Table` implementation backed by a plain closure, for catalogs that
/// don't need a bespoke type per table. DML is not supported; tables
/// needing insert/update/delete should implement `Table` directly.
pub struct SimpleTable {
    name: String,
    comment: Option<String>,
    schema: SchemaRef,
    scan_fn: ScanFn,
}

impl SimpleTable {
    pub fn new(
        name: impl Into<String>,
        schema: SchemaRef,
        scan_fn: impl Fn(ScanOptions) -> ScanFuture + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            comment: None,
            schema,
            scan_fn: Arc::new(scan_fn),
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

#[async_trait]
impl Table for SimpleTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    fn arrow_schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    async fn scan(&self, options: ScanOptions) -> Result<RecordBatchStream, AirportError> {
        (self.scan_fn)(options).await
    }
}

struct InMemorySchema {
    name: String,
    comment: Option<String>,
    tables: Vec<Arc<dyn Table>>,
    functions: Vec<Arc<dyn Function>>,
}

impl Schema for InMemorySchema {
    fn name(&self) -> &str {
        &self.name
    }

    fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.name().to_string()).collect()
    }

    fn table(&self, name: &str) -> Option<Arc<dyn Table>> {
        self.tables.iter().find(|t| t.name() == name).cloned()
    }

    fn function_names(&self) -> Vec<String> {
        self.functions.iter().map(|f| f.name().to_string()).collect()
    }

    fn function(&self, name: &str) -> Option<Arc<dyn Function>> {
        self.functions.iter().find(|f| f.name() == name).cloned()
    }
}

struct InMemoryCatalog {
    schemas: Vec<Arc<InMemorySchema>>,
}

impl Catalog for InMemoryCatalog {
    fn schema_names(&self) -> Vec<String> {
        self.schemas.iter().map(|s| s.name.clone()).collect()
    }

    fn schema(&self, name: &str) -> Option<Arc<dyn Schema>> {
        self.schemas
            .iter()
            .find(|s| s.name == name)
            .map(|s| Arc::clone(s) as Arc<dyn Schema>)
    }
}

#[derive(Debug, Snafu)]
pub enum BuildError {
    #[snafu(display("schema '{name}' declared more than once in this catalog"))]
    DuplicateSchema { name: String },

    #[snafu(display("table '{table}' declared more than once in schema '{schema}'"))]
    DuplicateTable { schema: String, table: String },

    #[snafu(display("table '{table}' attached to undeclared schema '{schema}'"))]
    UndeclaredSchema { schema: String, table: String },

    #[snafu(display("function '{function}' declared more than once in schema '{schema}'"))]
    DuplicateFunction { schema: String, function: String },
}

struct PendingSchema {
    name: String,
    comment: Option<String>,
    tables: Vec<Arc<dyn Table>>,
    functions: Vec<Arc<dyn Function>>,
}

/// Declarative catalog construction (§4.1). Name collisions — two schemas
/// sharing a name, or two tables sharing a name within one schema — are
/// rejected at `build()` time with a descriptive error rather than silently
/// shadowing one another.
#[derive(Default)]
pub struct CatalogBuilder {
    schemas: Vec<PendingSchema>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a schema. Calling this twice with the same name is an error
    /// raised at `build()`, not here, so multiple declarations can be
    /// reported together.
    pub fn schema(mut self, name: impl Into<String>) -> Self {
        self.schemas.push(PendingSchema {
            name: name.into(),
            comment: None,
            tables: Vec::new(),
            functions: Vec::new(),
        });
        self
    }

    pub fn schema_comment(mut self, name: &str, comment: impl Into<String>) -> Self {
        if let Some(s) = self.schemas.iter_mut().find(|s| s.name == name) {
            s.comment = Some(comment.into());
        }
        self
    }

    /// Attaches `table` to the most recently matching declared schema
    /// named `schema_name`. The schema must already have been declared via
    /// [`Self::schema`].
    pub fn table(mut self, schema_name: &str, table: Arc<dyn Table>) -> Self {
        if let Some(s) = self.schemas.iter_mut().find(|s| s.name == schema_name) {
            s.tables.push(table);
        } else {
            // Recorded as an undeclared-schema error at build() time; we
            // stash it under a synthetic pending schema so build() can
            // still name the offending table.
            self.schemas.push(PendingSchema {
                name: format!("\0undeclared:{schema_name}"),
                comment: None,
                tables: vec![table],
                functions: Vec::new(),
            });
        }
        self
    }

    /// Convenience wrapper around [`Self::table`] for the common case of a
    /// plain closure-backed table.
    pub fn simple_table(
        self,
        schema_name: &str,
        name: impl Into<String>,
        table_schema: SchemaRef,
        scan_fn: impl Fn(ScanOptions) -> ScanFuture + Send + Sync + 'static,
    ) -> Self {
        let table = Arc::new(SimpleTable::new(name, table_schema, scan_fn));
        self.table(schema_name, table)
    }

    /// Attaches `function` to the most recently matching declared schema
    /// named `schema_name`. The schema must already have been declared via
    /// [`Self::schema`]. Functions and tables are separate namespaces.
    pub fn function(mut self, schema_name: &str, function: Arc<dyn Function>) -> Self {
        if let Some(s) = self.schemas.iter_mut().find(|s| s.name == schema_name) {
            s.functions.push(function);
        } else {
            self.schemas.push(PendingSchema {
                name: format!("\0undeclared:{schema_name}"),
                comment: None,
                tables: Vec::new(),
                functions: vec![function],
            });
        }
        self
    }

    /// Convenience wrapper around [`Self::function`] for a function that
    /// only needs to be advertised via discovery, not executed.
    pub fn simple_function(
        self,
        schema_name: &str,
        name: impl Into<String>,
        kind: FunctionKind,
    ) -> Self {
        let function = Arc::new(SimpleFunction::new(name, kind));
        self.function(schema_name, function)
    }

    pub fn build(self) -> Result<Arc<dyn Catalog>, BuildError> {
        let mut seen_schema_names = std::collections::HashSet::new();
        let mut schemas = Vec::with_capacity(self.schemas.len());

        for pending in self.schemas {
            if let Some(real_name) = pending.name.strip_prefix("\0undeclared:") {
                let name = pending
                    .tables
                    .first()
                    .map(|t| t.name().to_string())
                    .or_else(|| pending.functions.first().map(|f| f.name().to_string()))
                    .unwrap_or_default();
                return UndeclaredSchemaSnafu {
                    schema: real_name.to_string(),
                    table: name,
                }
                .fail();
            }

            if !seen_schema_names.insert(pending.name.clone()) {
                return DuplicateSchemaSnafu {
                    name: pending.name.clone(),
                }
                .fail();
            }

            let mut seen_table_names = std::collections::HashSet::new();
            for table in &pending.tables {
                if !seen_table_names.insert(table.name().to_string()) {
                    return DuplicateTableSnafu {
                        schema: pending.name.clone(),
                        table: table.name().to_string(),
                    }
                    .fail();
                }
            }

            let mut seen_function_names = std::collections::HashSet::new();
            for function in &pending.functions {
                if !seen_function_names.insert(function.name().to_string()) {
                    return DuplicateFunctionSnafu {
                        schema: pending.name.clone(),
                        function: function.name().to_string(),
                    }
                    .fail();
                }
            }

            debug!(
                schema = %pending.name,
                tables = pending.tables.len(),
                functions = pending.functions.len(),
                "registered schema"
            );

            schemas.push(Arc::new(InMemorySchema {
                name: pending.name,
                comment: pending.comment,
                tables: pending.tables,
                functions: pending.functions,
            }));
        }

        Ok(Arc::new(InMemoryCatalog { schemas }))
    }
}

/// Begin/commit/rollback/status for server-tracked transactions (§4.6).
/// DML handlers pass the active transaction id down to user `Table`
/// methods via `ScanOptions`/`DmlOptions`; the registry itself only tracks
/// lifecycle state, never isolation.
pub trait TransactionRegistry: Send + Sync {
    fn begin(&self, catalog: &str) -> Transaction;
    fn commit(&self, id: &str) -> Result<(), AirportError>;
    fn rollback(&self, id: &str) -> Result<(), AirportError>;
    fn status(&self, id: &str) -> Option<Transaction>;
}

#[derive(Default)]
pub struct InMemoryTransactionRegistry {
    transactions: tracker::Registry<String, Transaction>,
}

impl InMemoryTransactionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn terminate(&self, id: &str, target: TransactionState) -> Result<(), AirportError> {
        let found = self.transactions.update(id, |tx| {
            // Repeated commit/rollback on an already-terminal transaction
            // is a no-op, not an error (§4.6, §8 invariant).
            if !tx.state.is_terminal() {
                tx.state = target;
            }
        });
        if found {
            Ok(())
        } else {
            UnknownTransactionSnafu { id: id.to_string() }.fail()
        }
    }
}

impl TransactionRegistry for InMemoryTransactionRegistry {
    fn begin(&self, catalog: &str) -> Transaction {
        let tx = Transaction {
            id: uuid::Uuid::new_v4().to_string(),
            state: TransactionState::Active,
            catalog: catalog.to_string(),
        };
        self.transactions.insert(tx.id.clone(), tx.clone());
        tx
    }

    fn commit(&self, id: &str) -> Result<(), AirportError> {
        self.terminate(id, TransactionState::Committed)
    }

    fn rollback(&self, id: &str) -> Result<(), AirportError> {
        self.terminate(id, TransactionState::Aborted)
    }

    fn status(&self, id: &str) -> Option<Transaction> {
        self.transactions.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{ArrayRef, Int64Array};
    use arrow::datatypes::{DataType, Field, Schema as ArrowSchema};
    use arrow::record_batch::RecordBatch;
    use futures::stream;

    fn users_schema() -> SchemaRef {
        Arc::new(ArrowSchema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
        ]))
    }

    fn empty_scan(_opts: ScanOptions) -> ScanFuture {
        Box::pin(async { Ok(Box::pin(stream::empty()) as RecordBatchStream) })
    }

    #[test]
    fn build_rejects_duplicate_schema_names() {
        let result = CatalogBuilder::new().schema("s").schema("s").build();
        assert!(matches!(result, Err(BuildError::DuplicateSchema { .. })));
    }

    #[test]
    fn build_rejects_duplicate_table_names_within_schema() {
        let result = CatalogBuilder::new()
            .schema("s")
            .simple_table("s", "t", users_schema(), empty_scan)
            .simple_table("s", "t", users_schema(), empty_scan)
            .build();
        assert!(matches!(result, Err(BuildError::DuplicateTable { .. })));
    }

    #[test]
    fn same_table_name_in_different_schemas_is_fine() {
        let result = CatalogBuilder::new()
            .schema("s1")
            .schema("s2")
            .simple_table("s1", "t", users_schema(), empty_scan)
            .simple_table("s2", "t", users_schema(), empty_scan)
            .build();
        assert!(result.is_ok());
    }

    #[test]
    fn empty_catalog_is_legal() {
        let catalog = CatalogBuilder::new().build().unwrap();
        assert!(catalog.schema_names().is_empty());
    }

    #[tokio::test]
    async fn built_catalog_resolves_tables_by_schema_and_name() {
        let catalog = CatalogBuilder::new()
            .schema("analytics")
            .simple_table("analytics", "users", users_schema(), empty_scan)
            .build()
            .unwrap();

        let schema = catalog.schema("analytics").unwrap();
        assert_eq!(schema.table_names(), vec!["users".to_string()]);
        let table = schema.table("users").unwrap();
        assert_eq!(table.capabilities(), TableCapabilities::read_only());

        let batches = table.scan(ScanOptions::default()).await.unwrap();
        let _ = batches; // stream built successfully
    }

    #[test]
    fn transaction_lifecycle_is_idempotent_and_terminal() {
        let registry = InMemoryTransactionRegistry::new();
        let tx = registry.begin("analytics");
        assert_eq!(registry.status(&tx.id).unwrap().state, TransactionState::Active);

        registry.commit(&tx.id).unwrap();
        assert_eq!(
            registry.status(&tx.id).unwrap().state,
            TransactionState::Committed
        );

        // repeated commit is a no-op, not an error
        registry.commit(&tx.id).unwrap();
        assert_eq!(
            registry.status(&tx.id).unwrap().state,
            TransactionState::Committed
        );

        // rollback after commit does not un-commit
        registry.rollback(&tx.id).unwrap();
        assert_eq!(
            registry.status(&tx.id).unwrap().state,
            TransactionState::Committed
        );
    }

    #[test]
    fn build_rejects_duplicate_function_names() {
        let result = CatalogBuilder::new()
            .schema("s")
            .simple_function("s", "f", FunctionKind::Scalar)
            .simple_function("s", "f", FunctionKind::Table)
            .build();
        assert!(matches!(result, Err(BuildError::DuplicateFunction { .. })));
    }

    #[test]
    fn schema_exposes_function_enumeration_and_lookup() {
        let catalog = CatalogBuilder::new()
            .schema("analytics")
            .simple_function("analytics", "upper", FunctionKind::Scalar)
            .simple_function("analytics", "generate_series", FunctionKind::Table)
            .build()
            .unwrap();

        let schema = catalog.schema("analytics").unwrap();
        let mut names = schema.function_names();
        names.sort();
        assert_eq!(names, vec!["generate_series".to_string(), "upper".to_string()]);

        let scalar = schema.function("upper").unwrap();
        assert_eq!(scalar.kind(), FunctionKind::Scalar);
        let table_fn = schema.function("generate_series").unwrap();
        assert_eq!(table_fn.kind(), FunctionKind::Table);
        assert!(schema.function("missing").is_none());
    }

    #[test]
    fn schema_with_no_functions_has_empty_enumeration() {
        let catalog = CatalogBuilder::new()
            .schema("s")
            .simple_table("s", "t", users_schema(), empty_scan)
            .build()
            .unwrap();
        let schema = catalog.schema("s").unwrap();
        assert!(schema.function_names().is_empty());
        assert!(schema.function("anything").is_none());
    }

    #[test]
    fn unknown_transaction_is_not_found() {
        let registry = InMemoryTransactionRegistry::new();
        let err = registry.commit("bogus").unwrap_err();
        assert!(matches!(err, AirportError::UnknownTransaction { .. }));
        assert!(registry.status("bogus").is_none());
    }

    // silence "unused" for types only referenced via trait objects in docs
    #[allow(dead_code)]
    fn _assert_batch_type(_: RecordBatch) {}
    #[allow(dead_code)]
    fn _assert_array(_: ArrayRef) {}
    #[allow(dead_code)]
    fn _assert_int(_: Int64Array) {}
}
