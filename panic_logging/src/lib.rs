//! Catches panics raised by user-supplied catalog code (a `Table::scan`, a
//! DML method, an `Authenticator`) and turns them into an ordinary error
//! value instead of unwinding into, and killing, the tokio task that is
//! serving the RPC.

use std::any::Any;
use std::fmt;

use futures::FutureExt;
use observability_deps::tracing::error;

/// A user-supplied function panicked instead of returning an error.
#[derive(Debug)]
pub struct PanicError {
    /// The operation that was being performed when the panic occurred,
    /// e.g. `"Table::scan"`.
    pub operation: &'static str,
    message: String,
}

impl fmt::Display for PanicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "panic in {}: {}", self.operation, self.message)
    }
}

impl std::error::Error for PanicError {}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Runs `fut`, catching any panic it raises (directly, not in a spawned
/// task) and converting it to `Err(PanicError)`. `operation` names the call
/// site for logging and error messages.
pub async fn recover<F, T>(operation: &'static str, fut: F) -> Result<T, PanicError>
where
    F: std::future::Future<Output = T>,
{
    match std::panic::AssertUnwindSafe(fut).catch_unwind().await {
        Ok(value) => Ok(value),
        Err(payload) => {
            let message = panic_message(payload);
            let backtrace = std::backtrace::Backtrace::force_capture();
            error!(%operation, %message, ?backtrace, "user-supplied catalog code panicked");
            Err(PanicError { operation, message })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ok_future_passes_through() {
        let result = recover("Table::scan", async { 42 }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn panic_is_converted_to_error() {
        let result = recover("Table::scan", async { panic!("boom") }).await;
        let err = result.unwrap_err();
        assert_eq!(err.operation, "Table::scan");
        assert!(err.to_string().contains("boom"));
    }
}
