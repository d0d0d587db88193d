// src/authenticator.rs

use crate::config::GatekeeperConfig;
use crate::context::{PermissionSet, RequestContext};
use crate::error::GatekeeperError;
use crate::userinfo::UserInfoClient;
use crate::validator::TokenValidator;
use async_trait::async_trait;
use std::collections::HashSet;
use tracing::{debug, info, instrument};

/// Authenticates one inbound call.
///
/// On success the returned context carries whatever the handler needs to
/// know about the caller. On failure the call must not reach its handler.
#[async_trait]
pub trait Authenticate: Send + Sync {
    async fn authenticate(&self, ctx: RequestContext) -> Result<RequestContext, GatekeeperError>;
}

/// Token authentication backed by the identity provider.
///
/// Per call: whitelisted methods pass through untouched. Everything else has
/// its bearer token checked for liveness at the userinfo endpoint, then
/// validated as a signed access token. Only then are the profile and
/// permissions attached to the context.
#[derive(Clone)]
pub struct RequestAuthenticator {
    whitelist: HashSet<String>,
    user_info: UserInfoClient,
    validator: TokenValidator,
}

impl RequestAuthenticator {
    pub fn new(whitelist: impl IntoIterator<Item = String>, user_info: UserInfoClient, validator: TokenValidator) -> Self {
        Self {
            whitelist: whitelist.into_iter().collect(),
            user_info,
            validator,
        }
    }

    /// Wires up the userinfo client and validator from one configuration,
    /// sharing a single HTTP client.
    pub fn from_config(config: &GatekeeperConfig) -> Result<Self, GatekeeperError> {
        let http_client = config.http_client()?;
        Ok(Self::new(
            config.whitelist.iter().cloned(),
            UserInfoClient::new(config, http_client.clone()),
            TokenValidator::new(config, http_client),
        ))
    }

    /// Returns true if the current method is whitelisted from authentication.
    fn skip_authentication(&self, ctx: &RequestContext) -> bool {
        ctx.method_info()
            .map(|m| self.whitelist.contains(&m.full_name))
            .unwrap_or(false)
    }
}

#[async_trait]
impl Authenticate for RequestAuthenticator {
    #[instrument(skip_all, err)]
    async fn authenticate(&self, ctx: RequestContext) -> Result<RequestContext, GatekeeperError> {
        if self.skip_authentication(&ctx) {
            debug!(method = ?ctx.method_info(), "Method is whitelisted, skipping authentication");
            return Ok(ctx);
        }

        let token = ctx.bearer_token().to_string();

        let user_info = match self.user_info.get_user_info(&token).await {
            Ok(user_info) => user_info,
            Err(GatekeeperError::UserInfoUnauthorized) => {
                // Most likely a revoked or foreign token rather than a fault on our side.
                info!("authentication failed while getting user info");
                return Err(GatekeeperError::InvalidAuthToken);
            }
            Err(e) => return Err(e),
        };

        let claims = self.validator.decode_and_validate_access_token(&token).await?;
        debug!(sub = %claims.sub, permissions = claims.permissions.len(), "Caller authenticated");

        Ok(ctx
            .with_user_info(user_info)
            .with_permissions(PermissionSet::new(claims.permissions)))
    }
}
