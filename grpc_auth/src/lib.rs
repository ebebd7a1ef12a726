//! Bearer-token authentication and per-catalog authorization, applied as a
//! single [`tonic::service::Interceptor`] in front of the Flight service.
//!
//! The distilled spec's vocabulary suggests separate unary/streaming
//! interceptor types, but `tonic` 0.8's `Interceptor` trait runs once per
//! call regardless of whether the RPC streams, so one implementation covers
//! both; see DESIGN.md Open Question (c).

use std::sync::Arc;

use data_types::AirportError;
use observability_deps::tracing::warn;
use snafu::Snafu;
use tonic::{Request, Status};
use trace::{headers, Identity};

#[derive(Debug, Snafu)]
pub enum AuthError {
    #[snafu(display("missing or malformed authorization header"))]
    Unauthorized,
    #[snafu(display("{identity} is not permitted to access catalog {catalog:?}"))]
    PermissionDenied { identity: Identity, catalog: String },
}

impl From<AuthError> for Status {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unauthorized => Status::unauthenticated(err.to_string()),
            AuthError::PermissionDenied { .. } => Status::permission_denied(err.to_string()),
        }
    }
}

impl From<AuthError> for AirportError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unauthorized => AirportError::Unauthenticated,
            AuthError::PermissionDenied { catalog, .. } => AirportError::PermissionDenied { catalog },
        }
    }
}

/// Verifies bearer tokens and decides whether an authenticated caller may
/// reach a given catalog. Implementations are expected to be cheap to call
/// on every request; cache whatever they need internally.
pub trait Authenticator: Send + Sync + 'static {
    fn authenticate(&self, token: &str) -> Result<Identity, AuthError>;

    /// Default allows any authenticated identity into any catalog. Override
    /// to enforce per-catalog access control.
    fn authorize_catalog(
        &self,
        _identity: &Identity,
        _catalog: &str,
        _token: &str,
    ) -> Result<(), AuthError> {
        Ok(())
    }
}

/// Adapts a plain closure into an [`Authenticator`] that only checks bearer
/// tokens, not per-catalog authorization.
struct FnAuthenticator<F> {
    validate: F,
}

impl<F> Authenticator for FnAuthenticator<F>
where
    F: Fn(&str) -> Result<Identity, AuthError> + Send + Sync + 'static,
{
    fn authenticate(&self, token: &str) -> Result<Identity, AuthError> {
        (self.validate)(token)
    }
}

impl Authenticator for Arc<dyn Authenticator> {
    fn authenticate(&self, token: &str) -> Result<Identity, AuthError> {
        (**self).authenticate(token)
    }

    fn authorize_catalog(
        &self,
        identity: &Identity,
        catalog: &str,
        token: &str,
    ) -> Result<(), AuthError> {
        (**self).authorize_catalog(identity, catalog, token)
    }
}

/// A [`tonic::service::Interceptor`] that requires a `Bearer <token>`
/// `authorization` header, authenticates it, and (if the request names a
/// catalog via the `airport-catalog` header) authorizes access to it.
///
/// On success, the resolved [`Identity`] is stashed in the request's
/// extensions for the service layer to lift into a [`trace::SessionContext`];
/// on failure, the call is aborted before it reaches any user code.
#[derive(Clone)]
pub struct BearerAuth<A> {
    authenticator: Arc<A>,
}

impl<A> BearerAuth<A>
where
    A: Authenticator,
{
    pub fn new(authenticator: A) -> Self {
        Self {
            authenticator: Arc::new(authenticator),
        }
    }

    /// Builds a `BearerAuth` from a bare token-validation closure, with no
    /// per-catalog authorization beyond "authenticated".
    pub fn from_fn<F>(validate: F) -> BearerAuth<FnAuthenticator<F>>
    where
        F: Fn(&str) -> Result<Identity, AuthError> + Send + Sync + 'static,
    {
        BearerAuth::new(FnAuthenticator { validate })
    }
}

impl<A> tonic::service::Interceptor for BearerAuth<A>
where
    A: Authenticator,
{
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        let token = bearer_token(&request).map_err(Status::from)?;
        let identity = self.authenticator.authenticate(token).map_err(|err| {
            warn!(%err, "rejected request: authentication failed");
            Status::from(err)
        })?;

        if let Some(catalog) = catalog_header(&request) {
            self.authenticator
                .authorize_catalog(&identity, &catalog, token)
                .map_err(|err| {
                    warn!(%err, %catalog, "rejected request: authorization failed");
                    Status::from(err)
                })?;
        }

        request.extensions_mut().insert(identity);
        Ok(request)
    }
}

fn bearer_token(request: &Request<()>) -> Result<&str, AuthError> {
    let header = request
        .metadata()
        .get("authorization")
        .ok_or(AuthError::Unauthorized)?
        .to_str()
        .map_err(|_| AuthError::Unauthorized)?;

    header
        .strip_prefix("Bearer ")
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::Unauthorized)
}

fn catalog_header(request: &Request<()>) -> Option<String> {
    request
        .metadata()
        .get(headers::CATALOG)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}
