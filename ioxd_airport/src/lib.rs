//! `AirportServerType`: the concrete `ServerType` that serves the Flight RPC
//! surface (§4.4) for every registered catalog, optionally behind
//! bearer-token authentication (§4.7).

use std::sync::Arc;

use arrow_flight::flight_service_server::FlightServiceServer;
use async_trait::async_trait;
use grpc_auth::{Authenticator, BearerAuth};
use ioxd_common::rpc::RpcBuilderInput;
use ioxd_common::server_type::{RpcError, ServerType};
use ioxd_common::{add_service, serve_builder, setup_builder};
use service_grpc_flight::MultiCatalogFlightService;
use tokio_util::sync::CancellationToken;

/// Serves every catalog registered on `dispatch` over Arrow Flight. When
/// `authenticator` is set, every RPC is required to carry a valid bearer
/// token; when `None`, the server is open (suitable for local development
/// only, per §4.7).
pub struct AirportServerType {
    dispatch: Arc<MultiCatalogFlightService>,
    authenticator: Option<Arc<dyn Authenticator>>,
    shutdown: CancellationToken,
}

impl AirportServerType {
    pub fn new(
        dispatch: MultiCatalogFlightService,
        authenticator: Option<Arc<dyn Authenticator>>,
    ) -> Self {
        Self {
            dispatch: Arc::new(dispatch),
            authenticator,
            shutdown: CancellationToken::new(),
        }
    }
}

impl std::fmt::Debug for AirportServerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Airport({} catalog(s), auth={})",
            self.dispatch.catalog_names().len(),
            self.authenticator.is_some()
        )
    }
}

#[async_trait]
impl ServerType for AirportServerType {
    /// Registers the Flight service — interceptor-wrapped when an
    /// authenticator is configured — and serves it until shutdown.
    async fn server_grpc(self: Arc<Self>, builder_input: RpcBuilderInput) -> Result<(), RpcError> {
        let builder = setup_builder!(builder_input, self);

        match &self.authenticator {
            Some(authenticator) => {
                let service = FlightServiceServer::with_interceptor(
                    Arc::clone(&self.dispatch),
                    BearerAuth::new(Arc::clone(authenticator)),
                );
                add_service!(builder, service);
            }
            None => {
                let service = FlightServiceServer::new(Arc::clone(&self.dispatch));
                add_service!(builder, service);
            }
        }

        serve_builder!(builder, builder_input);
        Ok(())
    }

    async fn join(self: Arc<Self>) {
        self.shutdown.cancelled().await;
    }

    fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use arrow::datatypes::{DataType, Field, Schema as ArrowSchema};
    use catalog::CatalogBuilder;
    use data_types::RecordBatchStream;
    use service_grpc_flight::MultiCatalogFlightServiceBuilder;

    use super::*;

    fn dispatch() -> MultiCatalogFlightService {
        let schema = Arc::new(ArrowSchema::new(vec![Field::new(
            "id",
            DataType::Int64,
            false,
        )]));
        let catalog = CatalogBuilder::new()
            .schema("public")
            .simple_table("public", "t", schema, |_| {
                Box::pin(async { Ok(Box::pin(futures::stream::empty()) as RecordBatchStream) })
            })
            .build()
            .unwrap();
        MultiCatalogFlightServiceBuilder::new("main")
            .catalog("main", catalog)
            .build()
            .unwrap()
    }

    #[test]
    fn shutdown_unblocks_join() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let server = Arc::new(AirportServerType::new(dispatch(), None));
            server.shutdown();
            // shutdown() before join() still unblocks it: the token is
            // already cancelled by the time join() starts waiting.
            Arc::clone(&server).join().await;
        });
    }

    #[test]
    fn debug_reports_catalog_count_and_auth_state() {
        let server = AirportServerType::new(dispatch(), None);
        let rendered = format!("{server:?}");
        assert!(rendered.contains('1'));
        assert!(rendered.contains("auth=false"));
    }
}
