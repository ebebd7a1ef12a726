//! An Arrow Flight client for the airport server: scans, inserts, and the
//! transaction/catalog control-plane actions, all wrapped around the
//! generated [`FlightServiceClient`].

use std::collections::HashMap;
use std::sync::Arc;

use arrow::datatypes::{Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use arrow_flight::flight_service_client::FlightServiceClient;
use arrow_flight::{Action, Criteria, Empty, FlightData, FlightDescriptor, FlightInfo};
use futures_util::TryStreamExt;
use service_grpc_flight::{DmlOperation, DoPutCommand, Ticket};
use thiserror::Error;
use tonic::Request;

use crate::connection::Connection;

/// Errors returned by [`Client`]'s RPC wrappers.
#[derive(Debug, Error)]
pub enum FlightClientError {
    #[error("unexpected server error: {}: {}", .0.code(), .0.message())]
    ServerError(#[from] tonic::Status),
    #[error("server sent a Flight stream this client could not decode: {0}")]
    Decode(#[from] arrow::error::ArrowError),
    #[error("do_get stream ended before a schema message arrived")]
    MissingSchema,
    #[error("malformed response body: {0}")]
    MalformedBody(String),
}

/// Names a table to scan or write, and which catalog/schema it lives under.
#[derive(Debug, Clone)]
pub struct TableRef {
    pub catalog: String,
    pub schema: String,
    pub table: String,
}

impl TableRef {
    pub fn new(
        catalog: impl Into<String>,
        schema: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            catalog: catalog.into(),
            schema: schema.into(),
            table: table.into(),
        }
    }
}

/// An airport Flight RPC client.
///
/// ```no_run
/// #[tokio::main]
/// # async fn main() {
/// use airport_client::{connection::Builder, flight::{Client, TableRef}};
///
/// let connection = Builder::default()
///     .build("http://127.0.0.1:8815")
///     .await
///     .unwrap();
///
/// let mut client = Client::new(connection);
/// let batches = client
///     .scan(&TableRef::new("main", "public", "events"), &[], None)
///     .await
///     .expect("scan failed");
/// # let _ = batches;
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    inner: FlightServiceClient<Connection>,
}

impl Client {
    pub fn new(channel: Connection) -> Self {
        Self {
            inner: FlightServiceClient::new(channel),
        }
    }

    /// Lists every table `ListFlights` advertises for `catalog`.
    pub async fn list_flights(
        &mut self,
        catalog: &str,
    ) -> Result<Vec<FlightInfo>, FlightClientError> {
        let request = with_catalog(Request::new(Criteria { expression: vec![].into() }), catalog);
        let stream = self.inner.list_flights(request).await?.into_inner();
        Ok(stream.try_collect().await?)
    }

    /// Fetches `FlightInfo` for one table, including its scan ticket.
    pub async fn get_flight_info(
        &mut self,
        table: &TableRef,
    ) -> Result<FlightInfo, FlightClientError> {
        let descriptor = FlightDescriptor {
            r#type: arrow_flight::flight_descriptor::DescriptorType::Path as i32,
            cmd: Default::default(),
            path: vec![table.schema.clone(), table.table.clone()],
        };
        let request = with_catalog(Request::new(descriptor), &table.catalog);
        Ok(self.inner.get_flight_info(request).await?.into_inner())
    }

    /// Scans `table`, optionally projecting `columns` and applying `limit`,
    /// returning every batch collected into memory.
    pub async fn scan(
        &mut self,
        table: &TableRef,
        columns: &[&str],
        limit: Option<usize>,
    ) -> Result<Vec<RecordBatch>, FlightClientError> {
        self.scan_with_filter(table, columns, None, limit).await
    }

    /// Like [`Self::scan`], but also attaches an opaque pushdown filter
    /// payload (§4.3's client-side JSON expression-tree format) for the
    /// table to interpret.
    pub async fn scan_with_filter(
        &mut self,
        table: &TableRef,
        columns: &[&str],
        filter: Option<Vec<u8>>,
        limit: Option<usize>,
    ) -> Result<Vec<RecordBatch>, FlightClientError> {
        let mut ticket = Ticket::new(&table.catalog, &table.schema, &table.table);
        ticket.scan.columns = columns.iter().map(|c| c.to_string()).collect();
        ticket.scan.filter = filter;
        ticket.scan.limit = limit;

        let request = with_catalog(Request::new(ticket.to_flight_ticket()), &table.catalog);
        let mut stream = self.inner.do_get(request).await?.into_inner();

        let schema = decode_schema(
            stream
                .message()
                .await?
                .ok_or(FlightClientError::MissingSchema)?,
        )?;

        let mut dictionaries_by_id = HashMap::new();
        let mut batches = Vec::new();
        while let Some(data) = stream.message().await? {
            if let Some(batch) = decode_batch(&data, &schema, &mut dictionaries_by_id)? {
                batches.push(batch);
            }
        }
        Ok(batches)
    }

    /// Writes `batches` to `table` under `operation`, optionally inside
    /// `transaction_id`. Returns the number of rows the server reports as
    /// affected.
    pub async fn write(
        &mut self,
        table: &TableRef,
        operation: DmlOperation,
        schema: SchemaRef,
        batches: Vec<RecordBatch>,
        transaction_id: Option<&str>,
    ) -> Result<u64, FlightClientError> {
        let (rows_affected, _) = self
            .write_returning(table, operation, schema, batches, transaction_id, false, &[])
            .await?;
        Ok(rows_affected)
    }

    /// Like [`Self::write`], but also asks the server to echo back the
    /// affected rows when `returning` is set, projected to
    /// `returning_columns` (or every column when empty). Returns the
    /// rows-affected count alongside the echoed batches, which are empty
    /// when `returning` is false.
    pub async fn write_returning(
        &mut self,
        table: &TableRef,
        operation: DmlOperation,
        schema: SchemaRef,
        batches: Vec<RecordBatch>,
        transaction_id: Option<&str>,
        returning: bool,
        returning_columns: &[&str],
    ) -> Result<(u64, Vec<RecordBatch>), FlightClientError> {
        let command = DoPutCommand {
            schema: table.schema.clone(),
            table: table.table.clone(),
            operation,
            returning,
            returning_columns: returning_columns.iter().map(|c| c.to_string()).collect(),
        };
        let cmd = serde_json::to_vec(&command)
            .map_err(|err| FlightClientError::MalformedBody(err.to_string()))?;
        let descriptor = FlightDescriptor {
            r#type: arrow_flight::flight_descriptor::DescriptorType::Cmd as i32,
            cmd: cmd.into(),
            path: Vec::new(),
        };

        let messages = encode_batches(descriptor, schema, batches);
        let mut request = Request::new(futures_util::stream::iter(messages));
        set_catalog(&mut request, &table.catalog);
        if let Some(id) = transaction_id {
            set_transaction(&mut request, id);
        }

        let mut results = self.inner.do_put(request).await?.into_inner();
        let first = results
            .try_next()
            .await?
            .ok_or_else(|| FlightClientError::MalformedBody("do_put returned no result".into()))?;

        let (returned_rows, summary) = if returning {
            let returned_rows = decode_ipc_stream(&first.app_metadata)?;
            let summary = results.try_next().await?.ok_or_else(|| {
                FlightClientError::MalformedBody("do_put returned no summary result".into())
            })?;
            (returned_rows, summary)
        } else {
            (Vec::new(), first)
        };

        let body: HashMap<String, u64> = serde_json::from_slice(&summary.app_metadata)
            .map_err(|err| FlightClientError::MalformedBody(err.to_string()))?;
        Ok((*body.get("rows_affected").unwrap_or(&0), returned_rows))
    }

    async fn do_action(
        &mut self,
        catalog: &str,
        action_type: &str,
        body: Vec<u8>,
    ) -> Result<Vec<u8>, FlightClientError> {
        let request = with_catalog(
            Request::new(Action {
                r#type: action_type.to_string(),
                body: body.into(),
            }),
            catalog,
        );
        let mut stream = self.inner.do_action(request).await?.into_inner();
        let result = stream
            .try_next()
            .await?
            .ok_or_else(|| FlightClientError::MalformedBody(format!("{action_type} returned no result")))?;
        Ok(result.body.to_vec())
    }

    /// Starts a transaction on `catalog`, returning its id.
    pub async fn begin_transaction(&mut self, catalog: &str) -> Result<String, FlightClientError> {
        let body = self
            .do_action(catalog, service_grpc_flight::BEGIN_TRANSACTION, Vec::new())
            .await?;
        String::from_utf8(body).map_err(|err| FlightClientError::MalformedBody(err.to_string()))
    }

    pub async fn commit_transaction(
        &mut self,
        catalog: &str,
        transaction_id: &str,
    ) -> Result<(), FlightClientError> {
        self.do_action(
            catalog,
            service_grpc_flight::COMMIT_TRANSACTION,
            transaction_id.as_bytes().to_vec(),
        )
        .await?;
        Ok(())
    }

    pub async fn rollback_transaction(
        &mut self,
        catalog: &str,
        transaction_id: &str,
    ) -> Result<(), FlightClientError> {
        self.do_action(
            catalog,
            service_grpc_flight::ROLLBACK_TRANSACTION,
            transaction_id.as_bytes().to_vec(),
        )
        .await?;
        Ok(())
    }

    pub async fn transaction_status(
        &mut self,
        catalog: &str,
        transaction_id: &str,
    ) -> Result<String, FlightClientError> {
        let body = self
            .do_action(
                catalog,
                service_grpc_flight::GET_TRANSACTION_STATUS,
                transaction_id.as_bytes().to_vec(),
            )
            .await?;
        String::from_utf8(body).map_err(|err| FlightClientError::MalformedBody(err.to_string()))
    }

    /// Fetches and decompresses the `GetTables` catalog batch.
    pub async fn get_tables(&mut self, catalog: &str) -> Result<Vec<u8>, FlightClientError> {
        self.do_action(catalog, service_grpc_flight::GET_TABLES, Vec::new())
            .await
    }

    pub async fn list_actions(
        &mut self,
        catalog: &str,
    ) -> Result<Vec<arrow_flight::ActionType>, FlightClientError> {
        let request = with_catalog(Request::new(Empty {}), catalog);
        let stream = self.inner.list_actions(request).await?.into_inner();
        Ok(stream.try_collect().await?)
    }
}

fn with_catalog<T>(mut request: Request<T>, catalog: &str) -> Request<T> {
    set_catalog(&mut request, catalog);
    request
}

fn set_catalog<T>(request: &mut Request<T>, catalog: &str) {
    if let Ok(value) = catalog.parse() {
        request
            .metadata_mut()
            .insert(trace::headers::CATALOG, value);
    }
}

fn set_transaction<T>(request: &mut Request<T>, transaction_id: &str) {
    if let Ok(value) = transaction_id.parse() {
        request
            .metadata_mut()
            .insert(trace::headers::TRANSACTION_ID, value);
    }
}

fn decode_schema(first: FlightData) -> Result<SchemaRef, FlightClientError> {
    let schema: Schema = arrow_flight::utils::flight_data_to_arrow_schema(&first)?;
    Ok(Arc::new(schema))
}

fn decode_batch(
    data: &FlightData,
    schema: &SchemaRef,
    dictionaries_by_id: &mut HashMap<i64, arrow::array::ArrayRef>,
) -> Result<Option<RecordBatch>, FlightClientError> {
    if data.data_header.is_empty() && data.data_body.is_empty() {
        return Ok(None);
    }
    let batch = arrow_flight::utils::flight_data_to_arrow_batch(
        data,
        Arc::clone(schema),
        dictionaries_by_id,
    )?;
    Ok(Some(batch))
}

/// Decodes a full Arrow IPC stream (schema followed by zero or more record
/// batches) from a single in-memory blob, the shape `do_put` uses to carry
/// RETURNING rows back inside a `PutResult.app_metadata`.
fn decode_ipc_stream(bytes: &[u8]) -> Result<Vec<RecordBatch>, FlightClientError> {
    let reader = arrow::ipc::reader::StreamReader::try_new(bytes, None)?;
    reader
        .collect::<Result<Vec<_>, _>>()
        .map_err(FlightClientError::from)
}

fn encode_batches(
    descriptor: FlightDescriptor,
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
) -> Vec<FlightData> {
    use arrow::ipc::writer::{DictionaryTracker, IpcDataGenerator, IpcWriteOptions};

    let options = IpcWriteOptions::default();
    let mut schema_message: FlightData = arrow_flight::SchemaAsIpc::new(&schema, &options).into();
    schema_message.flight_descriptor = Some(descriptor);

    let mut messages = vec![schema_message];
    let generator = IpcDataGenerator::default();
    let mut tracker = DictionaryTracker::new(false);
    for batch in batches {
        if let Ok((dictionaries, encoded_batch)) =
            generator.encoded_batch(&batch, &mut tracker, &options)
        {
            messages.extend(dictionaries.into_iter().map(FlightData::from));
            messages.push(FlightData::from(encoded_batch));
        }
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_ref_carries_its_three_names() {
        let table = TableRef::new("main", "public", "events");
        assert_eq!(table.catalog, "main");
        assert_eq!(table.schema, "public");
        assert_eq!(table.table, "events");
    }
}
