//! Plumbing that backs the `setup_builder!`/`add_service!`/`serve_builder!`
//! trio: binding a listener once in [`serve`] and handing each
//! [`ServerType::server_grpc`] implementation just enough to register its
//! services and serve them to completion.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;

/// Everything a [`ServerType`](crate::server_type::ServerType) impl needs to
/// stand its gRPC services up: the already-bound listener, its address (for
/// logging), and the token that signals a graceful shutdown.
pub struct RpcBuilderInput {
    pub listener: TcpListener,
    pub addr: SocketAddr,
    pub shutdown: CancellationToken,
}

/// Starts a [`tonic::transport::Server`] builder, logging the bind address.
/// Pairs with [`add_service`] and [`serve_builder`].
#[macro_export]
macro_rules! setup_builder {
    ($input:expr, $server_type:expr) => {{
        observability_deps::tracing::info!(
            bind_address = %$input.addr,
            server_type = ?$server_type,
            "binding gRPC server",
        );
        tonic::transport::Server::builder()
    }};
}

/// Registers one more service on `$builder`, rebinding it in place so later
/// `add_service!`/`serve_builder!` calls in the same block see the updated
/// router.
#[macro_export]
macro_rules! add_service {
    ($builder:ident, $svc:expr) => {
        let $builder = $builder.add_service($svc);
    };
}

/// Drives `$builder` to completion over `$input`'s listener, stopping once
/// `$input`'s shutdown token fires.
#[macro_export]
macro_rules! serve_builder {
    ($builder:ident, $input:expr) => {
        $builder
            .serve_with_incoming_shutdown(
                $crate::rpc::incoming($input.listener),
                $input.shutdown.cancelled(),
            )
            .await
            .map_err(|source| $crate::server_type::RpcError::Transport { source })?;
    };
}

/// Wraps a bound listener as the `Stream` of incoming connections tonic's
/// `serve_with_incoming*` family expects.
pub fn incoming(listener: TcpListener) -> TcpListenerStream {
    TcpListenerStream::new(listener)
}
