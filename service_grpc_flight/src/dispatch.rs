//! Multi-catalog dispatch (§4.8): routes every incoming RPC to the
//! `AirportFlightService` registered under the `airport-catalog` metadata
//! header, falling back to the configured default catalog when the header
//! is absent or empty.

use std::sync::Arc;

use arrow_flight::flight_service_server::FlightService;
use arrow_flight::{
    Action, Criteria, Empty, FlightDescriptor, FlightInfo, HandshakeRequest, SchemaResult,
};
use catalog::Catalog;
use snafu::Snafu;
use tonic::{Request, Response, Status, Streaming};
use trace::{headers, SessionContext};

use crate::service::AirportFlightService;
use crate::{
    DoActionStream, DoExchangeStream, DoGetStream, DoPutStream, HandshakeStream,
    ListActionsStream, ListFlightsStream,
};

#[derive(Debug, Snafu)]
pub enum DispatchError {
    #[snafu(display("catalog '{name}' is registered more than once"))]
    DuplicateCatalog { name: String },
    #[snafu(display("at least one catalog must be registered"))]
    Empty,
}

/// Builds a [`MultiCatalogFlightService`] from a fixed set of catalogs,
/// rejecting duplicate names (including a duplicate default) and an empty
/// catalog set at construction time.
#[derive(Default)]
pub struct MultiCatalogFlightServiceBuilder {
    default_catalog: String,
    compression_level: i32,
    pending: Vec<(String, Arc<dyn Catalog>)>,
}

impl MultiCatalogFlightServiceBuilder {
    pub fn new(default_catalog: impl Into<String>) -> Self {
        Self {
            default_catalog: default_catalog.into(),
            compression_level: 3,
            pending: Vec::new(),
        }
    }

    pub fn compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    pub fn catalog(mut self, name: impl Into<String>, catalog: Arc<dyn Catalog>) -> Self {
        self.pending.push((name.into(), catalog));
        self
    }

    pub fn build(self) -> Result<MultiCatalogFlightService, DispatchError> {
        if self.pending.is_empty() {
            return EmptySnafu.fail();
        }

        let handlers = tracker::Registry::new();
        let mut seen = std::collections::HashSet::new();
        for (name, catalog) in self.pending {
            if !seen.insert(name.clone()) {
                return DuplicateCatalogSnafu { name }.fail();
            }
            let handler = Arc::new(AirportFlightService::new(
                name.clone(),
                catalog,
                self.compression_level,
            ));
            handlers.insert(name, handler);
        }

        Ok(MultiCatalogFlightService {
            handlers,
            default_catalog: self.default_catalog,
        })
    }
}

pub struct MultiCatalogFlightService {
    handlers: tracker::Registry<String, Arc<AirportFlightService>>,
    default_catalog: String,
}

impl MultiCatalogFlightService {
    /// Registers a new catalog at runtime. Safe under concurrent traffic:
    /// in-flight requests keep running against the handler instance they
    /// were dispatched to.
    pub fn add_catalog(
        &self,
        name: impl Into<String>,
        catalog: Arc<dyn Catalog>,
        compression_level: i32,
    ) -> Result<(), DispatchError> {
        let name = name.into();
        if self.handlers.contains(&name) {
            return DuplicateCatalogSnafu { name }.fail();
        }
        let handler = Arc::new(AirportFlightService::new(name.clone(), catalog, compression_level));
        self.handlers.insert(name, handler);
        Ok(())
    }

    pub fn remove_catalog(&self, name: &str) -> Option<Arc<AirportFlightService>> {
        self.handlers.remove(name)
    }

    pub fn catalog_names(&self) -> Vec<String> {
        self.handlers.keys()
    }

    fn resolve(&self, requested: &str) -> Result<Arc<AirportFlightService>, Status> {
        let name = if requested.is_empty() {
            self.default_catalog.as_str()
        } else {
            requested
        };
        self.handlers
            .get(name)
            .ok_or_else(|| Status::not_found(format!("unknown catalog '{name}'")))
    }

    fn session_context<T>(&self, request: &Request<T>, catalog: &str) -> SessionContext {
        let metadata = request.metadata();
        let mut builder = SessionContext::builder().catalog(catalog);
        if let Some(v) = metadata.get(headers::TRACE_ID).and_then(|v| v.to_str().ok()) {
            builder = builder.trace_id(v.to_string());
        }
        if let Some(v) = metadata
            .get(headers::CLIENT_SESSION_ID)
            .and_then(|v| v.to_str().ok())
        {
            builder = builder.session_id(v.to_string());
        }
        if let Some(v) = metadata
            .get(headers::TRANSACTION_ID)
            .and_then(|v| v.to_str().ok())
        {
            builder = builder.transaction_id(v.to_string());
        }
        if let Some(identity) = request.extensions().get::<trace::Identity>() {
            builder = builder.identity(identity.clone());
        }
        builder.build()
    }

    fn catalog_header<T>(request: &Request<T>) -> String {
        request
            .metadata()
            .get(headers::CATALOG)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string()
    }
}

#[tonic::async_trait]
impl FlightService for MultiCatalogFlightService {
    type HandshakeStream = HandshakeStream;
    type ListFlightsStream = ListFlightsStream;
    type DoGetStream = DoGetStream;
    type DoPutStream = DoPutStream;
    type DoActionStream = DoActionStream;
    type ListActionsStream = ListActionsStream;
    type DoExchangeStream = DoExchangeStream;

    async fn handshake(
        &self,
        request: Request<Streaming<HandshakeRequest>>,
    ) -> Result<Response<Self::HandshakeStream>, Status> {
        let handler = self.resolve(&Self::catalog_header(&request))?;
        let ctx = self.session_context(&request, handler.name());
        trace::scope(ctx, handler.handshake(request)).await
    }

    async fn list_flights(
        &self,
        request: Request<Criteria>,
    ) -> Result<Response<Self::ListFlightsStream>, Status> {
        let handler = self.resolve(&Self::catalog_header(&request))?;
        let ctx = self.session_context(&request, handler.name());
        trace::scope(ctx, handler.list_flights(request)).await
    }

    async fn get_flight_info(
        &self,
        request: Request<FlightDescriptor>,
    ) -> Result<Response<FlightInfo>, Status> {
        let handler = self.resolve(&Self::catalog_header(&request))?;
        let ctx = self.session_context(&request, handler.name());
        trace::scope(ctx, handler.get_flight_info(request)).await
    }

    async fn get_schema(
        &self,
        request: Request<FlightDescriptor>,
    ) -> Result<Response<SchemaResult>, Status> {
        let handler = self.resolve(&Self::catalog_header(&request))?;
        let ctx = self.session_context(&request, handler.name());
        trace::scope(ctx, handler.get_schema(request)).await
    }

    async fn do_get(
        &self,
        request: Request<arrow_flight::Ticket>,
    ) -> Result<Response<Self::DoGetStream>, Status> {
        let handler = self.resolve(&Self::catalog_header(&request))?;
        let ctx = self.session_context(&request, handler.name());
        trace::scope(ctx, handler.do_get(request)).await
    }

    async fn do_put(
        &self,
        request: Request<Streaming<arrow_flight::FlightData>>,
    ) -> Result<Response<Self::DoPutStream>, Status> {
        let handler = self.resolve(&Self::catalog_header(&request))?;
        let ctx = self.session_context(&request, handler.name());
        trace::scope(ctx, handler.do_put(request)).await
    }

    async fn do_exchange(
        &self,
        request: Request<Streaming<arrow_flight::FlightData>>,
    ) -> Result<Response<Self::DoExchangeStream>, Status> {
        let handler = self.resolve(&Self::catalog_header(&request))?;
        let ctx = self.session_context(&request, handler.name());
        trace::scope(ctx, handler.do_exchange(request)).await
    }

    async fn do_action(
        &self,
        request: Request<Action>,
    ) -> Result<Response<Self::DoActionStream>, Status> {
        let handler = self.resolve(&Self::catalog_header(&request))?;
        let ctx = self.session_context(&request, handler.name());
        trace::scope(ctx, handler.do_action(request)).await
    }

    async fn list_actions(
        &self,
        request: Request<Empty>,
    ) -> Result<Response<Self::ListActionsStream>, Status> {
        let handler = self.resolve(&Self::catalog_header(&request))?;
        let ctx = self.session_context(&request, handler.name());
        trace::scope(ctx, handler.list_actions(request)).await
    }
}

/// Forwards to the inner `MultiCatalogFlightService`, so an `Arc` of it can
/// be handed to `FlightServiceServer` directly (tonic's generated server
/// wraps whatever it's given in its own `Arc`, so this ends up double-Arc'd
/// — harmless, and lets `ioxd_airport` keep its own handle to the dispatcher
/// for logging alongside the one tonic holds).
#[tonic::async_trait]
impl FlightService for Arc<MultiCatalogFlightService> {
    type HandshakeStream = HandshakeStream;
    type ListFlightsStream = ListFlightsStream;
    type DoGetStream = DoGetStream;
    type DoPutStream = DoPutStream;
    type DoActionStream = DoActionStream;
    type ListActionsStream = ListActionsStream;
    type DoExchangeStream = DoExchangeStream;

    async fn handshake(
        &self,
        request: Request<Streaming<HandshakeRequest>>,
    ) -> Result<Response<Self::HandshakeStream>, Status> {
        (**self).handshake(request).await
    }

    async fn list_flights(
        &self,
        request: Request<Criteria>,
    ) -> Result<Response<Self::ListFlightsStream>, Status> {
        (**self).list_flights(request).await
    }

    async fn get_flight_info(
        &self,
        request: Request<FlightDescriptor>,
    ) -> Result<Response<FlightInfo>, Status> {
        (**self).get_flight_info(request).await
    }

    async fn get_schema(
        &self,
        request: Request<FlightDescriptor>,
    ) -> Result<Response<SchemaResult>, Status> {
        (**self).get_schema(request).await
    }

    async fn do_get(
        &self,
        request: Request<arrow_flight::Ticket>,
    ) -> Result<Response<Self::DoGetStream>, Status> {
        (**self).do_get(request).await
    }

    async fn do_put(
        &self,
        request: Request<Streaming<arrow_flight::FlightData>>,
    ) -> Result<Response<Self::DoPutStream>, Status> {
        (**self).do_put(request).await
    }

    async fn do_exchange(
        &self,
        request: Request<Streaming<arrow_flight::FlightData>>,
    ) -> Result<Response<Self::DoExchangeStream>, Status> {
        (**self).do_exchange(request).await
    }

    async fn do_action(
        &self,
        request: Request<Action>,
    ) -> Result<Response<Self::DoActionStream>, Status> {
        (**self).do_action(request).await
    }

    async fn list_actions(
        &self,
        request: Request<Empty>,
    ) -> Result<Response<Self::ListActionsStream>, Status> {
        (**self).list_actions(request).await
    }
}

#[cfg(test)]
mod tests {
    use arrow::datatypes::{Field, Schema as ArrowSchema};
    use catalog::CatalogBuilder;
    use data_types::RecordBatchStream;

    use super::*;

    fn empty_catalog() -> Arc<dyn Catalog> {
        let schema = Arc::new(ArrowSchema::new(vec![Field::new(
            "id",
            arrow::datatypes::DataType::Int64,
            false,
        )]));
        CatalogBuilder::new()
            .schema("public")
            .simple_table("public", "t", schema, |_| {
                Box::pin(async { Ok(Box::pin(futures::stream::empty()) as RecordBatchStream) })
            })
            .build()
            .unwrap()
    }

    #[test]
    fn build_rejects_empty_catalog_set() {
        let result = MultiCatalogFlightServiceBuilder::new("main").build();
        assert!(matches!(result, Err(DispatchError::Empty)));
    }

    #[test]
    fn build_rejects_duplicate_names() {
        let result = MultiCatalogFlightServiceBuilder::new("main")
            .catalog("main", empty_catalog())
            .catalog("main", empty_catalog())
            .build();
        assert!(matches!(result, Err(DispatchError::DuplicateCatalog { .. })));
    }

    #[test]
    fn resolve_falls_back_to_default_on_empty_header() {
        let service = MultiCatalogFlightServiceBuilder::new("main")
            .catalog("main", empty_catalog())
            .build()
            .unwrap();
        assert_eq!(service.resolve("").unwrap().name(), "main");
        assert!(service.resolve("unknown").is_err());
    }

    #[test]
    fn add_catalog_rejects_duplicates_at_runtime() {
        let service = MultiCatalogFlightServiceBuilder::new("main")
            .catalog("main", empty_catalog())
            .build()
            .unwrap();
        let err = service.add_catalog("main", empty_catalog(), 3).unwrap_err();
        assert!(matches!(err, DispatchError::DuplicateCatalog { .. }));
    }

    #[test]
    fn add_then_resolve_named_catalog() {
        let service = MultiCatalogFlightServiceBuilder::new("main")
            .catalog("main", empty_catalog())
            .build()
            .unwrap();
        service.add_catalog("analytics", empty_catalog(), 3).unwrap();
        assert_eq!(service.resolve("analytics").unwrap().name(), "analytics");
    }
}
