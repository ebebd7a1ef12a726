//! The airport facade: what an embedder depends on to stand up a Flight RPC
//! server over their own catalog. Construct one or more catalogs with
//! [`CatalogBuilder`] (or a handwritten [`catalog::Catalog`] impl), register
//! them on a [`MultiCatalogFlightServiceBuilder`], wrap the result in an
//! [`AirportServerType`], and hand it to [`ioxd_common::serve`].

pub use catalog::{Catalog, CatalogBuilder, Schema, SimpleTable, Table};
pub use clap_blocks::FlightServerConfig;
pub use grpc_auth::Authenticator;
pub use ioxd_airport::AirportServerType;
pub use service_grpc_flight::{MultiCatalogFlightService, MultiCatalogFlightServiceBuilder};

use std::sync::Arc;

/// Builds an [`AirportServerType`] from a server config and the catalogs to
/// serve, then runs it to completion (until Ctrl-C or the server itself
/// stops). `catalogs` pairs a routable name with the catalog it resolves to;
/// `config.default_catalog` must name one of them.
pub async fn serve(
    config: &FlightServerConfig,
    catalogs: Vec<(String, Arc<dyn Catalog>)>,
    authenticator: Option<Arc<dyn Authenticator>>,
) -> Result<(), ServeError> {
    if config.require_auth && authenticator.is_none() {
        return Err(ServeError::AuthRequiredButNotConfigured);
    }

    let mut builder = MultiCatalogFlightServiceBuilder::new(config.default_catalog.clone())
        .compression_level(config.compression_level);
    for (name, catalog) in catalogs {
        builder = builder.catalog(name, catalog);
    }
    let dispatch = builder.build()?;

    let server_type = Arc::new(AirportServerType::new(dispatch, authenticator));
    ioxd_common::serve(server_type, config.bind_address)
        .await
        .map_err(ServeError::Rpc)
}

#[derive(Debug, snafu::Snafu)]
pub enum ServeError {
    #[snafu(display("airport-require-auth is set but no Authenticator was provided"))]
    AuthRequiredButNotConfigured,
    #[snafu(display("failed to build the multi-catalog dispatcher: {source}"))]
    Dispatch {
        source: service_grpc_flight::DispatchError,
    },
    #[snafu(display("gRPC server error: {source}"))]
    Rpc {
        source: ioxd_common::server_type::RpcError,
    },
}

impl From<service_grpc_flight::DispatchError> for ServeError {
    fn from(source: service_grpc_flight::DispatchError) -> Self {
        ServeError::Dispatch { source }
    }
}
