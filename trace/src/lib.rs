//! Request-scoped context propagated from a Flight RPC's entry point down into
//! user-supplied catalog code.
//!
//! Each RPC runs as a single tokio task, so the context lives in a
//! [`tokio::task_local!`] slot rather than the thread-local span stack a
//! synchronous, thread-per-request server would use. Accessors never error:
//! code running outside of a scoped request (e.g. a unit test) simply sees
//! the default, empty context.

use std::fmt;

use observability_deps::tracing::trace;

tokio::task_local! {
    static SESSION_CONTEXT: SessionContext;
}

/// gRPC metadata header names recognized by the dispatcher and auth
/// pipeline (§6).
pub mod headers {
    /// Target catalog for multi-catalog routing; absent means the default
    /// catalog (whose name is the empty string, §9 Open Question (f)).
    pub const CATALOG: &str = "airport-catalog";
    pub const TRACE_ID: &str = "airport-trace-id";
    pub const CLIENT_SESSION_ID: &str = "airport-client-session-id";
    pub const TRANSACTION_ID: &str = "airport-transaction-id";
}

/// The authenticated caller of the current request, as established by an
/// `Authenticator` (see the `grpc_auth` crate). Opaque outside of that.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    subject: String,
}

impl Identity {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.subject)
    }
}

/// Everything a handler knows about the request it is currently serving.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    identity: Option<Identity>,
    trace_id: Option<String>,
    session_id: Option<String>,
    catalog: String,
    transaction_id: Option<String>,
}

impl SessionContext {
    pub fn builder() -> SessionContextBuilder {
        SessionContextBuilder::default()
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Name of the catalog this request was dispatched to. The default
    /// catalog's name is the empty string.
    pub fn catalog(&self) -> &str {
        &self.catalog
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }
}

#[derive(Debug, Default)]
pub struct SessionContextBuilder {
    inner: SessionContext,
}

impl SessionContextBuilder {
    pub fn identity(mut self, identity: Identity) -> Self {
        self.inner.identity = Some(identity);
        self
    }

    pub fn trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.inner.trace_id = Some(trace_id.into());
        self
    }

    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.inner.session_id = Some(session_id.into());
        self
    }

    pub fn catalog(mut self, catalog: impl Into<String>) -> Self {
        self.inner.catalog = catalog.into();
        self
    }

    pub fn transaction_id(mut self, transaction_id: impl Into<String>) -> Self {
        self.inner.transaction_id = Some(transaction_id.into());
        self
    }

    pub fn build(self) -> SessionContext {
        self.inner
    }
}

/// Returns the context of the request currently being served, or the default
/// (anonymous, default-catalog, no transaction) context if called outside of
/// [`scope`].
pub fn current() -> SessionContext {
    SESSION_CONTEXT
        .try_with(Clone::clone)
        .unwrap_or_default()
}

/// Runs `fut` with `ctx` bound as the current session context for its
/// duration, including anything it calls into.
pub async fn scope<F>(ctx: SessionContext, fut: F) -> F::Output
where
    F: std::future::Future,
{
    trace!(catalog = %ctx.catalog, trace_id = ?ctx.trace_id, "entering session scope");
    SESSION_CONTEXT.scope(ctx, fut).await
}

/// Generates a fresh random identifier suitable for a trace id, session id,
/// or transaction id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_context_outside_scope() {
        let ctx = current();
        assert_eq!(ctx.catalog(), "");
        assert!(ctx.identity().is_none());
        assert!(ctx.transaction_id().is_none());
    }

    #[tokio::test]
    async fn scope_propagates_into_nested_calls() {
        let ctx = SessionContext::builder()
            .catalog("analytics")
            .identity(Identity::new("alice"))
            .transaction_id("tx-1")
            .build();

        scope(ctx, async {
            assert_eq!(current().catalog(), "analytics");
            assert_eq!(current().identity().unwrap().subject(), "alice");
            assert_eq!(current().transaction_id(), Some("tx-1"));

            // nested future still sees the same context
            async {
                assert_eq!(current().catalog(), "analytics");
            }
            .await;
        })
        .await;

        // outside the scope again, we're back to default
        assert_eq!(current().catalog(), "");
    }
}
