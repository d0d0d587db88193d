// src/login.rs

//! Interactive authorization-code login with PKCE, for hosts without a
//! browser session of their own.
//!
//! The host opens `LoginAttempt::authorization_url`, receives the provider's
//! redirect on `redirect_url` (for example with a [`CallbackListener`]), and
//! hands the callback query to [`LoginFlow::complete`].

use crate::config::GatekeeperConfig;
use crate::error::GatekeeperError;
use crate::pkce::{ChallengeMethod, CodeChallenge};
use crate::retriever::{TokenResponse, TokenRetriever};
use axum::extract::{RawQuery, State};
use axum::routing::get;
use axum::Router;
use std::future::IntoFuture;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, instrument};
use url::{form_urlencoded, Url};
use uuid::Uuid;

const DEFAULT_SCOPES: &[&str] = &["openid", "profile", "email"];

/// One pending login. Holds the PKCE verifier until the code comes back.
#[derive(Debug, Clone)]
pub struct LoginAttempt {
    pub state: String,
    pub code_challenge: CodeChallenge,
    pub redirect_url: String,
    pub authorization_url: Url,
}

#[derive(Clone)]
pub struct LoginFlow {
    client_id: String,
    authorize_url: Option<Url>,
    logout_url: Option<Url>,
    scopes: Vec<String>,
    audience: Option<String>,
    retriever: TokenRetriever,
}

impl LoginFlow {
    pub fn new(config: &GatekeeperConfig, retriever: TokenRetriever) -> Self {
        Self {
            client_id: config.client_id.clone(),
            authorize_url: config.authorize_url.clone(),
            logout_url: config.logout_url.clone(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            audience: config.validation.audience.clone(),
            retriever,
        }
    }

    /// Replaces the requested scopes.
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Binds a local listener for the provider redirect on `addr` and `path`.
    ///
    /// Pass [`CallbackListener::redirect_url`] to [`LoginFlow::begin`], then
    /// feed the query from [`CallbackListener::wait`] to [`LoginFlow::complete`].
    pub async fn listen_for_callback(&self, addr: SocketAddr, path: &str) -> Result<CallbackListener, GatekeeperError> {
        CallbackListener::bind(addr, path).await
    }

    /// Starts a login that will redirect back to `redirect_url`.
    pub fn begin(&self, redirect_url: &str) -> Result<LoginAttempt, GatekeeperError> {
        let mut authorization_url = self
            .authorize_url
            .clone()
            .ok_or_else(|| GatekeeperError::MissingConfiguration("authorize_url".to_string()))?;

        let state = Uuid::new_v4().to_string();
        let code_challenge = CodeChallenge::with_method(ChallengeMethod::S256);

        {
            let mut query = authorization_url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", redirect_url)
                .append_pair("scope", &self.scopes.join(" "))
                .append_pair("state", &state)
                .append_pair("code_challenge", &code_challenge.challenge)
                .append_pair("code_challenge_method", code_challenge.method.as_str());
            if let Some(audience) = &self.audience {
                query.append_pair("audience", audience);
            }
        }

        Ok(LoginAttempt {
            state,
            code_challenge,
            redirect_url: redirect_url.to_string(),
            authorization_url,
        })
    }

    /// Finishes `attempt` with the query string the provider redirected to.
    #[instrument(skip_all, err)]
    pub async fn complete(&self, attempt: &LoginAttempt, callback_query: &str) -> Result<TokenResponse, GatekeeperError> {
        let mut code = None;
        let mut state = None;
        let mut error = None;
        let mut error_description = None;

        for (key, value) in form_urlencoded::parse(callback_query.trim_start_matches('?').as_bytes()) {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                "error_description" => error_description = Some(value.into_owned()),
                _ => {}
            }
        }

        if let Some(code) = error.filter(|e| !e.is_empty()) {
            return Err(GatekeeperError::AuthorizationDenied {
                code,
                description: error_description.unwrap_or_default(),
            });
        }

        if state.as_deref() != Some(attempt.state.as_str()) {
            return Err(GatekeeperError::LoginStateMismatch);
        }

        let code = code
            .filter(|c| !c.is_empty())
            .ok_or(GatekeeperError::MissingAuthorizationCode)?;

        debug!("Exchanging authorization code");
        self.retriever
            .access_code(&code, &attempt.code_challenge.verifier, &attempt.redirect_url)
            .await
    }

    /// The provider logout URL that sends the user back to `return_to`.
    pub fn logout_url(&self, return_to: &str) -> Result<Url, GatekeeperError> {
        let mut url = self
            .logout_url
            .clone()
            .ok_or_else(|| GatekeeperError::MissingConfiguration("logout_url".to_string()))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("returnTo", return_to);
        Ok(url)
    }
}

type CallbackSender = Arc<Mutex<Option<oneshot::Sender<String>>>>;

/// A loopback HTTP listener that accepts exactly one login callback.
#[derive(Debug)]
pub struct CallbackListener {
    listener: TcpListener,
    path: String,
    redirect_url: String,
}

impl CallbackListener {
    /// Binds `addr`; port 0 picks a free port.
    pub async fn bind(addr: SocketAddr, path: &str) -> Result<Self, GatekeeperError> {
        if !path.starts_with('/') {
            return Err(GatekeeperError::InvalidConfiguration(format!(
                "callback path must start with '/': {}",
                path
            )));
        }
        let listener = TcpListener::bind(addr).await?;
        let redirect_url = format!("http://{}{}", listener.local_addr()?, path);
        info!(url = %redirect_url, "Login callback listener bound");
        Ok(Self {
            listener,
            path: path.to_string(),
            redirect_url,
        })
    }

    /// The URL the provider should redirect to.
    pub fn redirect_url(&self) -> &str {
        &self.redirect_url
    }

    /// Serves until the first request to the callback path and returns its raw
    /// query string. Requests to other paths get a 404 and are otherwise ignored.
    ///
    /// The listener closes once the callback response is sent. Dropping the
    /// future closes it immediately.
    pub async fn wait(self) -> Result<String, GatekeeperError> {
        let (tx, rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let sender: CallbackSender = Arc::new(Mutex::new(Some(tx)));
        let app = Router::new()
            .route(&self.path, get(receive_callback))
            .with_state(sender);

        let server = axum::serve(self.listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .into_future();
        let mut server = std::pin::pin!(server);

        let query = tokio::select! {
            query = rx => query.map_err(|_| io::Error::other("callback handler went away"))?,
            served = &mut server => {
                served?;
                return Err(io::Error::other("callback listener stopped before a callback arrived").into());
            }
        };

        // Let the in-flight response reach the browser before closing.
        let _ = shutdown_tx.send(());
        server.await?;
        Ok(query)
    }
}

async fn receive_callback(State(sender): State<CallbackSender>, RawQuery(query): RawQuery) -> &'static str {
    debug!("Received login callback");
    if let Some(tx) = sender.lock().await.take() {
        let _ = tx.send(query.unwrap_or_default());
    }
    "Login complete. You can close this window."
}
