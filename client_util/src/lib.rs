//! Shared connection-building code for the thin gRPC clients in
//! `airport_client`.

use std::time::Duration;

use thiserror::Error;

/// The channel type every generated client in `airport_client` is built on.
pub type Connection = tonic::transport::Channel;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("client error: {0}")]
    Transport(#[from] tonic::transport::Error),
}

/// Builds a [`Connection`] to a `tonic::transport::Server`, mirroring the
/// ergonomic defaults (connect timeout, keep-alive) the teacher's client
/// crates apply before handing back a bare `tonic` channel.
#[derive(Debug, Clone)]
pub struct Builder {
    connect_timeout: Duration,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl Builder {
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// ```no_run
    /// #[tokio::main]
    /// # async fn main() {
    /// use client_util::Builder;
    ///
    /// let connection = Builder::default()
    ///     .build("http://127.0.0.1:8815")
    ///     .await
    ///     .unwrap();
    /// # let _ = connection;
    /// # }
    /// ```
    pub async fn build(self, endpoint: impl AsRef<str>) -> Result<Connection, ConnectionError> {
        let endpoint = tonic::transport::Endpoint::from_shared(endpoint.as_ref().to_string())?
            .connect_timeout(self.connect_timeout);
        Ok(endpoint.connect().await?)
    }
}
