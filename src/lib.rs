// src/lib.rs

pub mod authenticator;
pub mod authorizer;
pub mod config;
pub mod context;
pub mod error;
pub mod interceptor;
pub mod login;
mod nullable;
pub mod pkce;
pub mod retriever;
pub mod userinfo;
pub mod validator;

/// The public prelude for the `oidc-gatekeeper` crate.
///
/// This module re-exports the most commonly used types for convenience.
pub mod prelude {
    pub use crate::authenticator::{Authenticate, RequestAuthenticator};
    pub use crate::authorizer::Authorizer;
    pub use crate::config::{ConfigBuilder, GatekeeperConfig};
    pub use crate::context::{MethodInfo, PermissionSet, RequestContext};
    pub use crate::error::GatekeeperError;
    pub use crate::interceptor::{ErrorCode, InterceptorChain, MethodInfoLayer, ServiceError};
    pub use crate::login::{CallbackListener, LoginAttempt, LoginFlow};
    pub use crate::pkce::{ChallengeMethod, CodeChallenge};
    pub use crate::retriever::{TokenResponse, TokenRetriever};
    pub use crate::userinfo::{UserInfo, UserInfoClient};
    pub use crate::validator::client::KeySetResolver;
    pub use crate::validator::{AccessTokenClaims, IdTokenClaims, TokenValidator};
    pub use jsonwebtoken::Algorithm;
}
