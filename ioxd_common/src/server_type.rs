//! The [`ServerType`] trait every `ioxd_*` crate implements, and the state
//! common to all of them. Trimmed from the teacher's version of this trait
//! down to what a single Flight gRPC service needs: no HTTP admin surface,
//! no metrics registry, since this system exposes only the gRPC port.

use std::sync::Arc;

use async_trait::async_trait;
use snafu::Snafu;

use crate::rpc::RpcBuilderInput;

/// State shared by every [`ServerType`] implementation, independent of which
/// gRPC services it happens to register.
#[derive(Debug, Clone)]
pub struct CommonServerState {
    service_name: &'static str,
}

impl CommonServerState {
    pub fn new(service_name: &'static str) -> Self {
        Self { service_name }
    }

    pub fn service_name(&self) -> &'static str {
        self.service_name
    }
}

#[derive(Debug, Snafu)]
pub enum RpcError {
    #[snafu(display("gRPC server transport error: {source}"))]
    Transport { source: tonic::transport::Error },

    #[snafu(display("failed to bind gRPC listener: {source}"))]
    Bind { source: std::io::Error },
}

/// A runnable gRPC server. One implementation per `ioxd_*` crate; the binary
/// that wires everything together only ever holds an `Arc<dyn ServerType>`.
#[async_trait]
pub trait ServerType: std::fmt::Debug + Send + Sync + 'static {
    /// Registers this server's gRPC services onto the builder carried by
    /// `builder_input` and serves them until shutdown is requested.
    async fn server_grpc(self: Arc<Self>, builder_input: RpcBuilderInput) -> Result<(), RpcError>;

    /// Resolves once [`Self::shutdown`] has been called.
    async fn join(self: Arc<Self>);

    /// Requests that [`Self::join`] return and that [`Self::server_grpc`]'s
    /// serve loop stop accepting new connections.
    fn shutdown(&self);
}
