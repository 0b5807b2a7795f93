#![allow(dead_code, missing_docs, clippy::expect_used)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use rstest::fixture;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::info;

use authspec_core::{CredentialIdentity, HttpCredentialProvider, TokenService};

pub const TOKEN_PATH: &str = "/as/token.oauth2";
pub const CLIENT_ID: &str = "test-client";
pub const CLIENT_SECRET: &str = "test-secret";

pub fn init_tracing() {
    // should be run once, fail otherwise, we skip that error
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();

    info!("Tracing initialized");
}

/// How the stub token endpoint answers.
#[derive(Debug, Clone)]
pub enum TokenReply {
    /// `200 OK` with `T1`, `T2`, ... as access tokens.
    Counting { expires_in: Option<u64> },
    /// The given status with a raw body.
    Raw { status: StatusCode, body: String },
}

#[derive(Debug)]
struct StubState {
    calls: AtomicUsize,
    forms: Mutex<Vec<HashMap<String, String>>>,
    reply: TokenReply,
    delay: Duration,
}

/// A token endpoint running on an ephemeral local port.
#[derive(Debug)]
pub struct StubTokenServer {
    addr: SocketAddr,
    state: Arc<StubState>,
    handle: JoinHandle<()>,
}

impl StubTokenServer {
    pub async fn start(reply: TokenReply) -> anyhow::Result<Self> {
        Self::start_with_delay(reply, Duration::ZERO).await
    }

    pub async fn start_with_delay(reply: TokenReply, delay: Duration) -> anyhow::Result<Self> {
        let state = Arc::new(StubState {
            calls: AtomicUsize::new(0),
            forms: Mutex::default(),
            reply,
            delay,
        });
        let app = Router::new()
            .route(TOKEN_PATH, post(issue_token))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        info!(%addr, "stub token endpoint listening");
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("stub server");
        });

        Ok(Self {
            addr,
            state,
            handle,
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    pub fn forms(&self) -> Vec<HashMap<String, String>> {
        self.state.forms.lock().expect("forms lock").clone()
    }

    pub fn identity(&self) -> CredentialIdentity {
        CredentialIdentity::builder(self.base_url())
            .expect("valid base url")
            .with_client_id(CLIENT_ID)
            .with_client_secret(CLIENT_SECRET)
            .build()
            .expect("valid identity")
    }

    pub fn service(&self) -> TokenService {
        let provider = HttpCredentialProvider::new(reqwest::Client::new());
        TokenService::builder(self.identity(), provider).build()
    }
}

impl Drop for StubTokenServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn issue_token(
    State(state): State<Arc<StubState>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let call = state.calls.fetch_add(1, Ordering::SeqCst) + 1;
    state.forms.lock().expect("forms lock").push(form);
    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }

    match &state.reply {
        TokenReply::Counting { expires_in } => {
            let mut body = json!({
                "access_token": format!("T{call}"),
                "token_type": "Bearer",
            });
            if let Some(expires_in) = expires_in {
                body["expires_in"] = json!(expires_in);
            }
            Json(body).into_response()
        }
        TokenReply::Raw { status, body } => (*status, body.clone()).into_response(),
    }
}

#[fixture]
pub async fn token_server() -> StubTokenServer {
    init_tracing();
    match StubTokenServer::start(TokenReply::Counting { expires_in: None }).await {
        Ok(server) => server,
        Err(error) => {
            panic!("fail to start stub token server: {error:?}");
        }
    }
}
