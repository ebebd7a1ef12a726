//! Shared scaffolding for running a [`ServerType`] as a gRPC server: bind a
//! listener, hand it to the server's `server_grpc`, and wait for either it or
//! a Ctrl-C to finish.

pub mod rpc;
pub mod server_type;

use std::net::SocketAddr;
use std::sync::Arc;

use rpc::RpcBuilderInput;
use server_type::{RpcError, ServerType};
use tokio_util::sync::CancellationToken;

/// Binds `bind_address`, serves `server_type`'s gRPC services on it, and
/// returns once the server has shut down — either because
/// [`ServerType::shutdown`] was called, or because this process received
/// Ctrl-C.
pub async fn serve(
    server_type: Arc<dyn ServerType>,
    bind_address: SocketAddr,
) -> Result<(), RpcError> {
    let listener = tokio::net::TcpListener::bind(bind_address)
        .await
        .map_err(|source| RpcError::Bind { source })?;
    let shutdown = CancellationToken::new();

    let builder_input = RpcBuilderInput {
        listener,
        addr: bind_address,
        shutdown: shutdown.clone(),
    };

    let signal_watcher = {
        let server_type = Arc::clone(&server_type);
        async move {
            let _ = tokio::signal::ctrl_c().await;
            observability_deps::tracing::info!("received Ctrl-C, shutting down");
            server_type.shutdown();
        }
    };

    let grpc = Arc::clone(&server_type).server_grpc(builder_input);
    let join = server_type.join();

    tokio::select! {
        result = grpc => result,
        _ = signal_watcher => Ok(()),
        _ = join => Ok(()),
    }
}
