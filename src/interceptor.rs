// src/interceptor.rs

//! The fixed per-call pipeline in front of every RPC handler:
//! method-info extraction, authentication, the handler itself, and error
//! translation into transport status codes.

use crate::authenticator::Authenticate;
use crate::context::{MethodInfo, RequestContext};
use crate::error::GatekeeperError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::task::{Context, Poll};
use tonic::{Code, Extensions, GrpcMethod, Request, Response, Status};
use tower::{Layer, Service};
use tracing::{debug, warn};

/// The only message a rejected caller ever sees.
const UNAUTHENTICATED_MESSAGE: &str = "invalid auth token";

/// Structured outcome codes a handler can fail with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Canceled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl From<ErrorCode> for Code {
    fn from(code: ErrorCode) -> Self {
        match code {
            ErrorCode::Canceled => Code::Cancelled,
            ErrorCode::Unknown => Code::Unknown,
            ErrorCode::InvalidArgument => Code::InvalidArgument,
            ErrorCode::DeadlineExceeded => Code::DeadlineExceeded,
            ErrorCode::NotFound => Code::NotFound,
            ErrorCode::AlreadyExists => Code::AlreadyExists,
            ErrorCode::PermissionDenied => Code::PermissionDenied,
            ErrorCode::ResourceExhausted => Code::ResourceExhausted,
            ErrorCode::FailedPrecondition => Code::FailedPrecondition,
            ErrorCode::Aborted => Code::Aborted,
            ErrorCode::OutOfRange => Code::OutOfRange,
            ErrorCode::Unimplemented => Code::Unimplemented,
            ErrorCode::Internal => Code::Internal,
            ErrorCode::Unavailable => Code::Unavailable,
            ErrorCode::DataLoss => Code::DataLoss,
            ErrorCode::Unauthenticated => Code::Unauthenticated,
        }
    }
}

/// An error returned by an RPC handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceError {
    pub code: ErrorCode,
    pub message: String,
}

impl ServiceError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for ServiceError {}

impl From<ServiceError> for Status {
    fn from(err: ServiceError) -> Self {
        Status::new(err.code.into(), err.message)
    }
}

/// Lets handlers use `?` on authorizer assertions and the other crate APIs.
impl From<GatekeeperError> for ServiceError {
    fn from(err: GatekeeperError) -> Self {
        let code = match &err {
            GatekeeperError::MissingPermissions(_) => ErrorCode::PermissionDenied,
            GatekeeperError::UnsupportedChallengeMethod(_) => ErrorCode::InvalidArgument,
            GatekeeperError::Transport(_) | GatekeeperError::UnexpectedStatus { .. } => ErrorCode::Unavailable,
            e if e.is_authentication_failure() => ErrorCode::Unauthenticated,
            _ => ErrorCode::Internal,
        };
        Self::new(code, err.to_string())
    }
}

/// Stamps the method the transport dispatched the call to into the context.
///
/// A [`MethodInfo`] recorded by [`MethodInfoLayer`] wins, then tonic's
/// [`GrpcMethod`]. With neither present the context carries no method, so no
/// whitelist entry can match.
pub fn extract_method_info(ctx: RequestContext, extensions: &Extensions) -> RequestContext {
    if let Some(info) = extensions.get::<MethodInfo>() {
        return ctx.with_method_info(info.clone());
    }
    match extensions.get::<GrpcMethod<'static>>() {
        Some(method) => ctx.with_method_info(MethodInfo::new(format!("/{}/{}", method.service(), method.method()))),
        None => ctx,
    }
}

/// Maps a handler error onto the transport status with the same code.
pub fn translate_error(err: ServiceError) -> Status {
    Status::from(err)
}

/// Runs every inbound call through the same ordered pipeline.
///
/// Authentication runs before the handler, so a rejected call never reaches
/// business logic, and the handler sees the context authentication produced.
pub struct InterceptorChain<A> {
    authenticator: Arc<A>,
}

impl<A> Clone for InterceptorChain<A> {
    fn clone(&self) -> Self {
        Self {
            authenticator: Arc::clone(&self.authenticator),
        }
    }
}

impl<A: Authenticate> InterceptorChain<A> {
    pub fn new(authenticator: A) -> Self {
        Self {
            authenticator: Arc::new(authenticator),
        }
    }

    /// Handles one unary call.
    ///
    /// The method name comes from the request extensions, never from the
    /// caller. Dropping the returned future cancels any identity provider
    /// request still in flight for this call.
    pub async fn intercept<T, R, H, Fut>(&self, request: Request<T>, handler: H) -> Result<Response<R>, Status>
    where
        H: FnOnce(RequestContext, T) -> Fut,
        Fut: Future<Output = Result<R, ServiceError>>,
    {
        let (metadata, extensions, message) = request.into_parts();

        // (a) method info
        let ctx = extract_method_info(RequestContext::new(metadata), &extensions);
        let method = ctx.method_info().map(|m| m.full_name.clone()).unwrap_or_default();

        // (b) authentication
        let ctx = self.authenticate(ctx).await?;

        // (c) handler, (d) error translation
        let reply = handler(ctx, message).await.map_err(|err| {
            debug!(method = %method, code = ?err.code, "Handler returned an error");
            translate_error(err)
        })?;

        Ok(Response::new(reply))
    }

    /// Runs the authenticator and converts any failure into `Unauthenticated`.
    pub async fn authenticate(&self, ctx: RequestContext) -> Result<RequestContext, Status> {
        let method = ctx.method_info().map(|m| m.full_name.clone()).unwrap_or_default();
        self.authenticator.authenticate(ctx).await.map_err(|err| {
            warn!(method = %method, error = %err, "Rejecting unauthenticated call");
            Status::unauthenticated(UNAUTHENTICATED_MESSAGE)
        })
    }
}

/// Records the HTTP/2 `:path` of every inbound call as its [`MethodInfo`].
///
/// Install it on the server (`Server::builder().layer(MethodInfoLayer)`) so the
/// chain sees the path the router dispatched on.
#[derive(Debug, Clone, Copy, Default)]
pub struct MethodInfoLayer;

impl<S> Layer<S> for MethodInfoLayer {
    type Service = MethodInfoService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MethodInfoService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct MethodInfoService<S> {
    inner: S,
}

impl<S, B> Service<http::Request<B>> for MethodInfoService<S>
where
    S: Service<http::Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: http::Request<B>) -> Self::Future {
        let info = MethodInfo::new(req.uri().path());
        req.extensions_mut().insert(info);
        self.inner.call(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::PermissionSet;
    use async_trait::async_trait;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tower::ServiceExt;

    /// Accepts calls whose token is "good" and grants one permission.
    struct FakeAuthenticator {
        whitelist: Vec<&'static str>,
    }

    #[async_trait]
    impl Authenticate for FakeAuthenticator {
        async fn authenticate(&self, ctx: RequestContext) -> Result<RequestContext, GatekeeperError> {
            let whitelisted = ctx
                .method_info()
                .map(|m| self.whitelist.contains(&m.full_name.as_str()))
                .unwrap_or(false);
            if whitelisted {
                return Ok(ctx);
            }
            match ctx.bearer_token() {
                "good" => Ok(ctx.with_permissions(PermissionSet::new(["service:svc1:read"]))),
                "" => Err(GatekeeperError::InvalidAuthToken),
                _ => Err(GatekeeperError::ExpiredToken),
            }
        }
    }

    fn chain() -> InterceptorChain<FakeAuthenticator> {
        InterceptorChain::new(FakeAuthenticator {
            whitelist: vec!["/pkg.Svc/Health"],
        })
    }

    /// A call routed by tonic to `pkg.Svc/<method>`.
    fn request(method: &'static str, auth: Option<&'static str>) -> Request<u32> {
        let mut request = Request::new(7);
        request.extensions_mut().insert(GrpcMethod::new("pkg.Svc", method));
        if let Some(value) = auth {
            request.metadata_mut().insert("authorization", value.parse().unwrap());
        }
        request
    }

    #[tokio::test]
    async fn handler_sees_method_and_permissions() {
        let response = chain()
            .intercept(request("Get", Some("Bearer good")), |ctx, msg| async move {
                assert_eq!(ctx.method_info().unwrap().full_name, "/pkg.Svc/Get");
                assert!(ctx.permissions().unwrap().contains("service:svc1:read"));
                Ok::<_, ServiceError>(msg * 2)
            })
            .await
            .unwrap();
        assert_eq!(response.into_inner(), 14);
    }

    #[tokio::test]
    async fn whitelisted_method_runs_without_authorization_header() {
        let response = chain()
            .intercept(request("Health", None), |ctx, msg| async move {
                assert!(ctx.permissions().is_none());
                Ok::<_, ServiceError>(msg)
            })
            .await
            .unwrap();
        assert_eq!(response.into_inner(), 7);
    }

    #[tokio::test]
    async fn rejected_call_never_reaches_the_handler() {
        let ran = AtomicBool::new(false);
        for auth in [None, Some("Bearer expired")] {
            let status = chain()
                .intercept(request("Get", auth), |_, msg| {
                    ran.store(true, Ordering::SeqCst);
                    async move { Ok::<_, ServiceError>(msg) }
                })
                .await
                .unwrap_err();
            assert_eq!(status.code(), Code::Unauthenticated);
            assert_eq!(status.message(), "invalid auth token");
        }
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn routed_method_cannot_be_relabelled_as_whitelisted() {
        // Routed to Get, with a whitelisted name planted where a caller could reach it.
        let mut routed = request("Get", None);
        routed
            .metadata_mut()
            .insert("grpc-method", "/pkg.Svc/Health".parse().unwrap());
        let status = chain()
            .intercept(routed, |_, msg| async move { Ok::<_, ServiceError>(msg) })
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::Unauthenticated);
    }

    #[tokio::test]
    async fn call_without_transport_method_is_never_whitelisted() {
        let status = chain()
            .intercept(Request::new(7u32), |_, msg| async move { Ok::<_, ServiceError>(msg) })
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::Unauthenticated);
    }

    #[tokio::test]
    async fn layer_path_takes_precedence_over_grpc_method() {
        let mut request = request("Health", None);
        request.extensions_mut().insert(MethodInfo::new("/pkg.Svc/Delete"));
        let status = chain()
            .intercept(request, |_, msg| async move { Ok::<_, ServiceError>(msg) })
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::Unauthenticated);
    }

    #[tokio::test]
    async fn layer_records_the_request_path() {
        let service = MethodInfoLayer.layer(tower::service_fn(|req: http::Request<()>| async move {
            let info = req.extensions().get::<MethodInfo>().cloned();
            Ok::<_, Infallible>(info)
        }));
        let req = http::Request::builder()
            .uri("http://localhost/pkg.Svc/Health?ignored=1")
            .body(())
            .unwrap();

        let info = service.oneshot(req).await.unwrap();
        assert_eq!(info, Some(MethodInfo::new("/pkg.Svc/Health")));
    }

    #[tokio::test]
    async fn layered_request_flows_into_the_chain() {
        let chain = chain();
        let service = MethodInfoLayer.layer(tower::service_fn(move |req: http::Request<u32>| {
            let chain = chain.clone();
            async move {
                let result = chain
                    .intercept(Request::from_http(req), |ctx, msg| async move {
                        assert_eq!(ctx.method_info().unwrap().full_name, "/pkg.Svc/Health");
                        Ok::<_, ServiceError>(msg)
                    })
                    .await;
                Ok::<_, Infallible>(result.map(Response::into_inner).map_err(|s| s.code()))
            }
        }));

        let health = http::Request::builder().uri("/pkg.Svc/Health").body(7).unwrap();
        assert_eq!(service.clone().oneshot(health).await.unwrap(), Ok(7));

        let get = http::Request::builder().uri("/pkg.Svc/Get").body(7).unwrap();
        assert_eq!(service.oneshot(get).await.unwrap(), Err(Code::Unauthenticated));
    }

    #[tokio::test]
    async fn handler_errors_keep_their_code() {
        let status = chain()
            .intercept(request("Get", Some("Bearer good")), |_, _| async {
                Err::<u32, _>(ServiceError::not_found("no such event"))
            })
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::NotFound);
        assert_eq!(status.message(), "no such event");
    }

    #[test]
    fn every_error_code_maps_to_its_status_code() {
        let pairs = [
            (ErrorCode::Canceled, Code::Cancelled),
            (ErrorCode::Unknown, Code::Unknown),
            (ErrorCode::InvalidArgument, Code::InvalidArgument),
            (ErrorCode::DeadlineExceeded, Code::DeadlineExceeded),
            (ErrorCode::NotFound, Code::NotFound),
            (ErrorCode::AlreadyExists, Code::AlreadyExists),
            (ErrorCode::PermissionDenied, Code::PermissionDenied),
            (ErrorCode::ResourceExhausted, Code::ResourceExhausted),
            (ErrorCode::FailedPrecondition, Code::FailedPrecondition),
            (ErrorCode::Aborted, Code::Aborted),
            (ErrorCode::OutOfRange, Code::OutOfRange),
            (ErrorCode::Unimplemented, Code::Unimplemented),
            (ErrorCode::Internal, Code::Internal),
            (ErrorCode::Unavailable, Code::Unavailable),
            (ErrorCode::DataLoss, Code::DataLoss),
            (ErrorCode::Unauthenticated, Code::Unauthenticated),
        ];
        for (code, expected) in pairs {
            let status = translate_error(ServiceError::new(code, "boom"));
            assert_eq!(status.code(), expected);
            assert_eq!(status.message(), "boom");
        }
    }

    #[test]
    fn missing_permissions_become_permission_denied() {
        let err: ServiceError = GatekeeperError::MissingPermissions(vec!["service:svc2:read".to_string()]).into();
        assert_eq!(err.code, ErrorCode::PermissionDenied);
        assert_eq!(err.message, "Missing permissions service:svc2:read");
    }
}
