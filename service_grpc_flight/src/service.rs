//! `AirportFlightService`: the Flight RPC handler for a single catalog
//! (§4.4). `MultiCatalogFlightService` holds one of these per routable
//! catalog name and delegates to it once the `airport-catalog` header has
//! been resolved.

use std::sync::Arc;

use arrow::datatypes::SchemaRef;
use arrow::ipc::writer::{DictionaryTracker, IpcDataGenerator, IpcWriteOptions};
use arrow_flight::flight_service_server::FlightService;
use arrow_flight::{
    Action, ActionType, Criteria, Empty, FlightData, FlightDescriptor, FlightEndpoint, FlightInfo,
    HandshakeRequest, PutResult, SchemaAsIpc, SchemaResult,
};
use catalog::{Catalog, InMemoryTransactionRegistry, Table, TransactionRegistry};
use data_types::{AirportError, DmlOptions, RecordBatchStream, ScanOptions};
use futures::{Stream, StreamExt, TryStreamExt};
use panic_logging::recover;
use serde::{Deserialize, Serialize};
use tonic::{Request, Response, Status, Streaming};

use crate::ticket::Ticket;
use crate::{
    DoActionStream, DoExchangeStream, DoGetStream, DoPutStream, HandshakeStream,
    ListActionsStream, ListFlightsStream,
};

/// The command carried as a JSON-encoded `FlightDescriptor.cmd` on the
/// first `DoPut` message, naming the target table and operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoPutCommand {
    pub schema: String,
    pub table: String,
    pub operation: DmlOperation,
    #[serde(default)]
    pub returning: bool,
    #[serde(default)]
    pub returning_columns: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DmlOperation {
    Insert,
    Update,
    Delete,
}

pub struct AirportFlightService {
    name: String,
    catalog: Arc<dyn Catalog>,
    transactions: Arc<dyn TransactionRegistry>,
    compression_level: i32,
}

impl AirportFlightService {
    pub fn new(name: impl Into<String>, catalog: Arc<dyn Catalog>, compression_level: i32) -> Self {
        Self {
            name: name.into(),
            catalog,
            transactions: Arc::new(InMemoryTransactionRegistry::new()),
            compression_level,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.catalog
    }

    fn resolve_table(&self, schema_name: &str, table_name: &str) -> Result<Arc<dyn Table>, AirportError> {
        let schema = self
            .catalog
            .schema(schema_name)
            .ok_or_else(|| AirportError::UnknownSchema {
                name: schema_name.to_string(),
            })?;
        schema
            .table(table_name)
            .ok_or_else(|| AirportError::UnknownTable {
                name: table_name.to_string(),
            })
    }

    fn flight_info_for(&self, schema_name: &str, table: &Arc<dyn Table>) -> Result<FlightInfo, Status> {
        let arrow_schema = table.arrow_schema();
        let schema_bytes = schema_ipc_bytes(&arrow_schema)?;

        let ticket = Ticket::new(self.name.clone(), schema_name, table.name());
        let descriptor = FlightDescriptor {
            r#type: arrow_flight::flight_descriptor::DescriptorType::Path as i32,
            cmd: Default::default(),
            path: vec![schema_name.to_string(), table.name().to_string()],
        };

        Ok(FlightInfo {
            schema: schema_bytes,
            flight_descriptor: Some(descriptor),
            endpoint: vec![FlightEndpoint {
                ticket: Some(ticket.to_flight_ticket()),
                location: vec![],
            }],
            total_records: -1,
            total_bytes: -1,
            ordered: false,
        })
    }

    fn descriptor_path<'a>(descriptor: &'a FlightDescriptor) -> Result<(&'a str, &'a str), Status> {
        match descriptor.path.as_slice() {
            [schema, table] => Ok((schema.as_str(), table.as_str())),
            _ => Err(Status::invalid_argument(
                "flight descriptor path must be exactly [schema, table]",
            )),
        }
    }

    async fn do_action_impl(&self, action: Action) -> Result<arrow_flight::Result, AirportError> {
        if action.r#type == crate::actions::GET_TABLES {
            let body = crate::serializer::serialize_catalog(self.catalog.as_ref(), self.compression_level)
                .map_err(|err| AirportError::Internal {
                    message: err.to_string(),
                })?;
            return Ok(arrow_flight::Result { body: body.into() });
        }
        if action.r#type == crate::actions::GET_FUNCTIONS {
            let body = crate::serializer::serialize_functions(self.catalog.as_ref(), self.compression_level)
                .map_err(|err| AirportError::Internal {
                    message: err.to_string(),
                })?;
            return Ok(arrow_flight::Result { body: body.into() });
        }
        crate::actions::dispatch(&self.name, self.transactions.as_ref(), &action.r#type, &action.body)
    }

    async fn do_get_impl(&self, ticket_bytes: &[u8], transaction_id: Option<String>) -> Result<(SchemaRef, RecordBatchStream), Status> {
        let ticket = Ticket::decode(ticket_bytes)
            .map_err(|err| Status::invalid_argument(err.to_string()))?;

        let table = self
            .resolve_table(&ticket.schema, &ticket.table)
            .map_err(Status::from)?;

        let projected_schema = table
            .projected_schema(&ticket.scan.columns)
            .map_err(|err| Status::invalid_argument(err.to_string()))?;

        let options = ScanOptions {
            columns: ticket.scan.columns,
            filter: ticket.scan.filter.map(Into::into),
            limit: ticket.scan.limit,
            transaction_id,
        };

        let stream = recover("scan", table.scan(options))
            .await
            .map_err(|err| Status::internal(err.to_string()))?
            .map_err(Status::from)?;

        Ok((projected_schema, stream))
    }

    /// Decodes the first `do_put` message's command and schema, streams in
    /// the remaining batches, runs the DML operation, and assembles the
    /// response messages: an echoed-rows message ahead of the rows-affected
    /// summary when RETURNING was requested (§4.4).
    async fn do_put_impl(
        &self,
        mut stream: impl Stream<Item = Result<FlightData, Status>> + Unpin + Send,
        transaction_id: Option<String>,
    ) -> Result<Vec<PutResult>, Status> {
        let first = stream
            .try_next()
            .await?
            .ok_or_else(|| Status::invalid_argument("do_put stream was empty"))?;

        let descriptor = first
            .flight_descriptor
            .clone()
            .ok_or_else(|| Status::invalid_argument("first do_put message must carry a descriptor"))?;
        let command: DoPutCommand = serde_json::from_slice(&descriptor.cmd)
            .map_err(|err| Status::invalid_argument(format!("malformed do_put command: {err}")))?;

        let arrow_schema = arrow_flight::utils::flight_data_to_arrow_schema(&first)
            .map_err(|err| Status::invalid_argument(err.to_string()))?;
        let input_schema = Arc::new(arrow_schema);

        let table = self
            .resolve_table(&command.schema, &command.table)
            .map_err(Status::from)?;

        let capabilities = table.capabilities();
        let allowed = match command.operation {
            DmlOperation::Insert => capabilities.insert,
            DmlOperation::Update => capabilities.update,
            DmlOperation::Delete => capabilities.delete,
        };
        if !allowed {
            return Err(Status::from(AirportError::Unimplemented {
                action: format!("{:?}", command.operation).to_lowercase(),
            }));
        }

        let dictionaries_by_id = std::collections::HashMap::new();
        let mut batches = Vec::new();
        while let Some(data) = stream.try_next().await? {
            if data.data_header.is_empty() && data.data_body.is_empty() {
                continue;
            }
            let batch = arrow_flight::utils::flight_data_to_arrow_batch(
                &data,
                Arc::clone(&input_schema),
                &dictionaries_by_id,
            )
            .map_err(|err| Status::invalid_argument(err.to_string()))?;
            batches.push(Ok(batch));
        }
        let input: RecordBatchStream = Box::pin(futures::stream::iter(batches));

        let returning_requested = command.returning;
        let returning_columns = command.returning_columns.clone();

        let options = DmlOptions {
            returning: command.returning,
            returning_columns: command.returning_columns,
            transaction_id,
            input_schema,
        };

        let mut result = recover("dml", async {
            match command.operation {
                DmlOperation::Insert => table.insert(options, input).await,
                DmlOperation::Update => table.update(options, input).await,
                DmlOperation::Delete => table.delete(options, input).await,
            }
        })
        .await
        .map_err(|err| Status::internal(err.to_string()))?
        .map_err(Status::from)?;

        let mut messages = Vec::with_capacity(2);
        if returning_requested {
            let returning_schema = table
                .projected_schema(&returning_columns)
                .map_err(|err| Status::invalid_argument(err.to_string()))?;
            let returning_stream = result
                .returning
                .take()
                .unwrap_or_else(|| Box::pin(futures::stream::empty()));
            let ipc_bytes =
                encode_record_batch_stream_to_ipc(returning_schema, returning_stream).await?;
            messages.push(PutResult {
                app_metadata: ipc_bytes.into(),
            });
        }
        messages.push(PutResult {
            app_metadata: format!("{{\"rows_affected\":{}}}", result.rows_affected).into_bytes().into(),
        });

        Ok(messages)
    }
}

#[tonic::async_trait]
impl FlightService for AirportFlightService {
    type HandshakeStream = HandshakeStream;
    type ListFlightsStream = ListFlightsStream;
    type DoGetStream = DoGetStream;
    type DoPutStream = DoPutStream;
    type DoActionStream = DoActionStream;
    type ListActionsStream = ListActionsStream;
    type DoExchangeStream = DoExchangeStream;

    async fn handshake(
        &self,
        _request: Request<Streaming<HandshakeRequest>>,
    ) -> Result<Response<Self::HandshakeStream>, Status> {
        // Authentication rides on gRPC metadata (§4.7), not the Flight
        // handshake exchange.
        Err(Status::unimplemented(
            "handshake is not part of this protocol's authentication model",
        ))
    }

    async fn list_flights(
        &self,
        _request: Request<Criteria>,
    ) -> Result<Response<Self::ListFlightsStream>, Status> {
        let mut infos = Vec::new();
        for schema_name in self.catalog.schema_names() {
            let Some(schema) = self.catalog.schema(&schema_name) else {
                continue;
            };
            for table_name in schema.table_names() {
                let Some(table) = schema.table(&table_name) else {
                    continue;
                };
                infos.push(self.flight_info_for(&schema_name, &table)?);
            }
        }

        let stream = futures::stream::iter(infos.into_iter().map(Ok)).boxed();
        Ok(Response::new(stream))
    }

    async fn get_flight_info(
        &self,
        request: Request<FlightDescriptor>,
    ) -> Result<Response<FlightInfo>, Status> {
        let (schema_name, table_name) = Self::descriptor_path(request.get_ref())?;
        let table = self
            .resolve_table(schema_name, table_name)
            .map_err(Status::from)?;
        Ok(Response::new(self.flight_info_for(schema_name, &table)?))
    }

    async fn get_schema(
        &self,
        request: Request<FlightDescriptor>,
    ) -> Result<Response<SchemaResult>, Status> {
        let (schema_name, table_name) = Self::descriptor_path(request.get_ref())?;
        let table = self
            .resolve_table(schema_name, table_name)
            .map_err(Status::from)?;
        let schema_bytes = schema_ipc_bytes(&table.arrow_schema())?;
        Ok(Response::new(SchemaResult {
            schema: schema_bytes,
        }))
    }

    async fn do_get(
        &self,
        request: Request<arrow_flight::Ticket>,
    ) -> Result<Response<Self::DoGetStream>, Status> {
        let transaction_id = metadata_value(&request, trace::headers::TRANSACTION_ID);
        let ticket_bytes = request.into_inner().ticket;
        let (schema, batches) = self.do_get_impl(&ticket_bytes, transaction_id).await?;
        let stream = record_batches_to_flight_stream(schema, batches).boxed();
        Ok(Response::new(stream))
    }

    async fn do_put(
        &self,
        request: Request<Streaming<FlightData>>,
    ) -> Result<Response<Self::DoPutStream>, Status> {
        let transaction_id = metadata_value(&request, trace::headers::TRANSACTION_ID);
        let stream = request.into_inner();
        let messages = self.do_put_impl(stream, transaction_id).await?;
        Ok(Response::new(
            futures::stream::iter(messages.into_iter().map(Ok)).boxed(),
        ))
    }

    async fn do_exchange(
        &self,
        _request: Request<Streaming<FlightData>>,
    ) -> Result<Response<Self::DoExchangeStream>, Status> {
        // Reserved for bidirectional future use (§9 Open Question (a)).
        Ok(Response::new(futures::stream::empty().boxed()))
    }

    async fn do_action(
        &self,
        request: Request<Action>,
    ) -> Result<Response<Self::DoActionStream>, Status> {
        let action = request.into_inner();
        let result = recover("do_action", self.do_action_impl(action))
            .await
            .map_err(|err| Status::internal(err.to_string()))?
            .map_err(Status::from)?;
        Ok(Response::new(futures::stream::once(async { Ok(result) }).boxed()))
    }

    async fn list_actions(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<Self::ListActionsStream>, Status> {
        let actions: Vec<Result<ActionType, Status>> = crate::actions::list().into_iter().map(Ok).collect();
        Ok(Response::new(futures::stream::iter(actions).boxed()))
    }
}

fn metadata_value<T>(request: &Request<T>, name: &str) -> Option<String> {
    request
        .metadata()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

fn schema_ipc_bytes(schema: &SchemaRef) -> Result<bytes::Bytes, Status> {
    let options = IpcWriteOptions::default();
    let message: arrow_flight::IpcMessage = SchemaAsIpc::new(schema, &options)
        .try_into()
        .map_err(|err: arrow::error::ArrowError| Status::internal(err.to_string()))?;
    Ok(message.0)
}

/// Encodes `schema` followed by every batch in `batches` as a single Arrow
/// IPC stream buffer, for carrying DML's RETURNING rows back through
/// `do_put`'s `PutResult.app_metadata` (§4.4) — `DoPut`'s response stream
/// has no `FlightData` slot of its own, so the echoed rows ride as an
/// opaque IPC blob ahead of the final rows-affected summary message.
async fn encode_record_batch_stream_to_ipc(
    schema: SchemaRef,
    mut batches: RecordBatchStream,
) -> Result<Vec<u8>, Status> {
    let mut buffer = Vec::new();
    {
        let mut writer = arrow::ipc::writer::StreamWriter::try_new(&mut buffer, &schema)
            .map_err(|err| Status::internal(err.to_string()))?;
        while let Some(batch) = batches.next().await {
            let batch = batch.map_err(|err| Status::internal(err.to_string()))?;
            writer
                .write(&batch)
                .map_err(|err| Status::internal(err.to_string()))?;
        }
        writer
            .finish()
            .map_err(|err| Status::internal(err.to_string()))?;
    }
    Ok(buffer)
}

/// Encodes a schema followed by every batch in `batches` as a Flight data
/// stream, in the order the scan produced them (§4.4, §5 Ordering).
fn record_batches_to_flight_stream(
    schema: SchemaRef,
    batches: RecordBatchStream,
) -> impl Stream<Item = Result<FlightData, Status>> + Send + 'static {
    let options = IpcWriteOptions::default();
    let schema_message: FlightData = SchemaAsIpc::new(&schema, &options).into();
    let header = futures::stream::once(async move { Ok(schema_message) });

    let body = batches
        .map(move |batch_result| {
            let options = options.clone();
            let items: Vec<Result<FlightData, Status>> = match batch_result {
                Ok(batch) => {
                    let generator = IpcDataGenerator::default();
                    let mut tracker = DictionaryTracker::new(false);
                    match generator.encoded_batch(&batch, &mut tracker, &options) {
                        Ok((dictionaries, encoded_batch)) => {
                            let mut items: Vec<Result<FlightData, Status>> = dictionaries
                                .into_iter()
                                .map(|d| Ok(FlightData::from(d)))
                                .collect();
                            items.push(Ok(FlightData::from(encoded_batch)));
                            items
                        }
                        Err(err) => vec![Err(Status::internal(err.to_string()))],
                    }
                }
                Err(err) => vec![Err(Status::internal(err.to_string()))],
            };
            futures::stream::iter(items)
        })
        .flatten();

    header.chain(body)
}

#[cfg(test)]
mod tests {
    use arrow::array::Int64Array;
    use arrow::datatypes::{DataType, Field, Schema as ArrowSchema};
    use arrow::record_batch::RecordBatch;
    use catalog::CatalogBuilder;

    use super::*;

    fn service_with_one_table() -> AirportFlightService {
        let schema = Arc::new(ArrowSchema::new(vec![Field::new(
            "id",
            DataType::Int64,
            false,
        )]));
        let scan_schema = schema.clone();
        let catalog = CatalogBuilder::new()
            .schema("public")
            .simple_table("public", "items", schema, move |_opts| {
                let scan_schema = scan_schema.clone();
                Box::pin(async move {
                    let batch = RecordBatch::try_new(
                        scan_schema,
                        vec![Arc::new(Int64Array::from(vec![1, 2, 3]))],
                    )
                    .unwrap();
                    let stream: RecordBatchStream =
                        Box::pin(futures::stream::iter(vec![Ok(batch)]));
                    Ok(stream)
                })
            })
            .build()
            .unwrap();
        AirportFlightService::new("main", catalog, 3)
    }

    #[tokio::test]
    async fn list_flights_returns_one_entry_per_table() {
        let service = service_with_one_table();
        let response = service
            .list_flights(Request::new(Criteria {
                expression: vec![].into(),
            }))
            .await
            .unwrap();
        let infos: Vec<_> = response.into_inner().try_collect().await.unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(
            infos[0].flight_descriptor.as_ref().unwrap().path,
            vec!["public".to_string(), "items".to_string()]
        );
    }

    #[tokio::test]
    async fn get_flight_info_rejects_unknown_table() {
        let service = service_with_one_table();
        let descriptor = FlightDescriptor {
            r#type: arrow_flight::flight_descriptor::DescriptorType::Path as i32,
            cmd: Default::default(),
            path: vec!["public".to_string(), "missing".to_string()],
        };
        let err = service
            .get_flight_info(Request::new(descriptor))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::NotFound);
    }

    #[tokio::test]
    async fn do_get_streams_schema_then_batches() {
        let service = service_with_one_table();
        let ticket = Ticket::new("main", "public", "items").to_flight_ticket();
        let response = service.do_get(Request::new(ticket)).await.unwrap();
        let messages: Vec<_> = response.into_inner().try_collect().await.unwrap();
        // one schema message plus one encoded batch message
        assert_eq!(messages.len(), 2);
    }

    #[tokio::test]
    async fn do_get_rejects_malformed_ticket() {
        let service = service_with_one_table();
        let ticket = arrow_flight::Ticket {
            ticket: b"not json".to_vec().into(),
        };
        let err = service.do_get(Request::new(ticket)).await.unwrap_err();
        assert_eq!(err.code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn do_action_get_tables_returns_compressed_catalog_batch() {
        let service = service_with_one_table();
        let action = Action {
            r#type: crate::actions::GET_TABLES.to_string(),
            body: Default::default(),
        };
        let response = service.do_action(Request::new(action)).await.unwrap();
        let results: Vec<_> = response.into_inner().try_collect().await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(!results[0].body.is_empty());
    }

    #[tokio::test]
    async fn do_action_transaction_round_trip() {
        let service = service_with_one_table();
        let begin = Action {
            r#type: crate::actions::BEGIN_TRANSACTION.to_string(),
            body: Default::default(),
        };
        let response = service.do_action(Request::new(begin)).await.unwrap();
        let results: Vec<_> = response.into_inner().try_collect().await.unwrap();
        let id = results[0].body.to_vec();

        let commit = Action {
            r#type: crate::actions::COMMIT_TRANSACTION.to_string(),
            body: id.into(),
        };
        service.do_action(Request::new(commit)).await.unwrap();
    }

    #[tokio::test]
    async fn list_actions_includes_get_tables() {
        let service = service_with_one_table();
        let response = service.list_actions(Request::new(Empty {})).await.unwrap();
        let actions: Vec<_> = response.into_inner().try_collect().await.unwrap();
        assert!(actions
            .iter()
            .any(|a| a.r#type == crate::actions::GET_TABLES));
    }

    #[tokio::test]
    async fn list_actions_includes_get_functions() {
        let service = service_with_one_table();
        let response = service.list_actions(Request::new(Empty {})).await.unwrap();
        let actions: Vec<_> = response.into_inner().try_collect().await.unwrap();
        assert!(actions
            .iter()
            .any(|a| a.r#type == crate::actions::GET_FUNCTIONS));
    }

    #[tokio::test]
    async fn do_action_get_functions_returns_compressed_function_batch() {
        let schema = Arc::new(ArrowSchema::new(vec![Field::new(
            "id",
            DataType::Int64,
            false,
        )]));
        let catalog = CatalogBuilder::new()
            .schema("public")
            .simple_function("public", "upper", catalog::FunctionKind::Scalar)
            .simple_table("public", "items", schema, |_| {
                Box::pin(async { Ok(Box::pin(futures::stream::empty()) as RecordBatchStream) })
            })
            .build()
            .unwrap();
        let service = AirportFlightService::new("main", catalog, 3);

        let action = Action {
            r#type: crate::actions::GET_FUNCTIONS.to_string(),
            body: Default::default(),
        };
        let response = service.do_action(Request::new(action)).await.unwrap();
        let results: Vec<_> = response.into_inner().try_collect().await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(!results[0].body.is_empty());
    }

    struct EchoingTable {
        name: String,
        schema: SchemaRef,
    }

    #[async_trait::async_trait]
    impl Table for EchoingTable {
        fn name(&self) -> &str {
            &self.name
        }

        fn arrow_schema(&self) -> SchemaRef {
            self.schema.clone()
        }

        fn capabilities(&self) -> data_types::TableCapabilities {
            data_types::TableCapabilities::full()
        }

        async fn scan(&self, _options: ScanOptions) -> Result<RecordBatchStream, AirportError> {
            Ok(Box::pin(futures::stream::empty()))
        }

        async fn insert(
            &self,
            options: DmlOptions,
            input: RecordBatchStream,
        ) -> Result<data_types::DmlResult, AirportError> {
            let batches: Vec<_> = input.try_collect().await.map_err(|err| AirportError::Internal {
                message: err.to_string(),
            })?;
            let rows_affected = batches.iter().map(|b| b.num_rows() as u64).sum();
            let returning = if options.returning {
                Some(Box::pin(futures::stream::iter(batches.into_iter().map(Ok)))
                    as RecordBatchStream)
            } else {
                None
            };
            Ok(data_types::DmlResult {
                rows_affected,
                returning,
            })
        }
    }

    fn service_with_echoing_table() -> AirportFlightService {
        let schema = Arc::new(ArrowSchema::new(vec![Field::new(
            "id",
            DataType::Int64,
            false,
        )]));
        let catalog = CatalogBuilder::new()
            .schema("public")
            .table(
                "public",
                Arc::new(EchoingTable {
                    name: "items".to_string(),
                    schema,
                }),
            )
            .build()
            .unwrap();
        AirportFlightService::new("main", catalog, 3)
    }

    fn do_put_messages(
        command: &DoPutCommand,
        schema: &SchemaRef,
        batch: RecordBatch,
    ) -> impl Stream<Item = Result<FlightData, Status>> + Unpin + Send {
        use arrow::ipc::writer::{DictionaryTracker, IpcDataGenerator, IpcWriteOptions};

        let cmd = serde_json::to_vec(command).unwrap();
        let descriptor = FlightDescriptor {
            r#type: arrow_flight::flight_descriptor::DescriptorType::Cmd as i32,
            cmd: cmd.into(),
            path: Vec::new(),
        };
        let options = IpcWriteOptions::default();
        let mut schema_message: FlightData = SchemaAsIpc::new(schema, &options).into();
        schema_message.flight_descriptor = Some(descriptor);

        let generator = IpcDataGenerator::default();
        let mut tracker = DictionaryTracker::new(false);
        let (dictionaries, encoded_batch) =
            generator.encoded_batch(&batch, &mut tracker, &options).unwrap();

        let mut messages = vec![schema_message];
        messages.extend(dictionaries.into_iter().map(FlightData::from));
        messages.push(FlightData::from(encoded_batch));

        futures::stream::iter(messages.into_iter().map(Ok))
    }

    #[tokio::test]
    async fn do_put_streams_back_returning_rows_before_the_summary() {
        let service = service_with_echoing_table();
        let schema = Arc::new(ArrowSchema::new(vec![Field::new(
            "id",
            DataType::Int64,
            false,
        )]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![Arc::new(Int64Array::from(vec![1, 2]))],
        )
        .unwrap();

        let command = DoPutCommand {
            schema: "public".to_string(),
            table: "items".to_string(),
            operation: DmlOperation::Insert,
            returning: true,
            returning_columns: vec!["id".to_string()],
        };

        let stream = do_put_messages(&command, &schema, batch);
        let messages = service.do_put_impl(stream, None).await.unwrap();

        // one message carrying the echoed rows, one carrying rows_affected
        assert_eq!(messages.len(), 2);
        assert!(!messages[0].app_metadata.is_empty());
        let summary: serde_json::Value =
            serde_json::from_slice(&messages[1].app_metadata).unwrap();
        assert_eq!(summary["rows_affected"], 2);
    }

    #[tokio::test]
    async fn do_put_without_returning_sends_only_the_summary() {
        let service = service_with_echoing_table();
        let schema = Arc::new(ArrowSchema::new(vec![Field::new(
            "id",
            DataType::Int64,
            false,
        )]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![Arc::new(Int64Array::from(vec![1, 2, 3]))],
        )
        .unwrap();

        let command = DoPutCommand {
            schema: "public".to_string(),
            table: "items".to_string(),
            operation: DmlOperation::Insert,
            returning: false,
            returning_columns: Vec::new(),
        };

        let stream = do_put_messages(&command, &schema, batch);
        let messages = service.do_put_impl(stream, None).await.unwrap();

        assert_eq!(messages.len(), 1);
        let summary: serde_json::Value =
            serde_json::from_slice(&messages[0].app_metadata).unwrap();
        assert_eq!(summary["rows_affected"], 3);
    }
}
