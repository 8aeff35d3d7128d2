use crate::auth::{self, Claims};
use crate::broadcast::Broadcaster;
use crate::config::Config;
use crate::db::{self, DbPool};
use crate::error::ChatError;
use crate::registry::RoomRegistry;
use crate::store::MessageStore;
use crate::ws;
use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};
use semchat_protocol::{ChatMessage, SemesterId, ServerEvent};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub store: MessageStore,
    pub registry: Arc<RoomRegistry>,
    pub broadcaster: Broadcaster,
    pub config: Config,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self> {
        tokio::fs::create_dir_all(&config.data_dir).await?;
        let pool = db::init_pool(config.db_path())?;
        let store = MessageStore::new(pool.clone(), config.persist_timeout());
        let registry = Arc::new(RoomRegistry::new());
        let broadcaster = Broadcaster::new(registry.clone());
        Ok(Self {
            pool,
            store,
            registry,
            broadcaster,
            config,
        })
    }
}

/// Build the HTTP application router.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/chat/semester/:semester_id/messages",
            get(list_messages).post(create_message),
        )
        .route("/ws", get(ws::ws_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));
    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn auth_middleware<B>(
    State(state): State<AppState>,
    mut req: axum::http::Request<B>,
    next: Next<B>,
) -> Result<Response, ChatError> {
    if let Some(value) = req.headers().get(header::AUTHORIZATION) {
        if let Ok(value) = value.to_str() {
            if let Some(token) = value.strip_prefix("Bearer ") {
                if let Ok(claims) = auth::verify_jwt(&state.config.jwt_secret_bytes(), token) {
                    req.extensions_mut().insert(claims);
                    return Ok(next.run(req).await);
                }
            }
        }
    }
    Err(ChatError::Authorization)
}

fn parse_semester_path(raw: &str) -> Result<SemesterId, ChatError> {
    Ok(SemesterId::parse_id(raw)?)
}

#[derive(Deserialize)]
struct HistoryQuery {
    #[serde(default)]
    page: usize,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    50
}

#[derive(Serialize)]
struct HistoryResp {
    success: bool,
    messages: Vec<ChatMessage>,
}

async fn list_messages(
    State(state): State<AppState>,
    Path(semester_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ChatError> {
    let semester = parse_semester_path(&semester_id)?;
    let mut messages = state
        .store
        .list_recent(semester, query.page, query.limit)
        .await?;
    // the wire contract is chronological; the store pages newest-first
    messages.reverse();
    Ok(Json(HistoryResp {
        success: true,
        messages,
    }))
}

#[derive(Deserialize)]
struct CreateMessageReq {
    text: String,
    #[serde(rename = "tempId", default)]
    temp_id: Option<String>,
}

#[derive(Serialize)]
struct CreateMessageResp {
    success: bool,
    message: ChatMessage,
}

/// Fallback submission path for clients without a live connection. The
/// sender is resolved from the authenticated session, never from the
/// request body.
async fn create_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(semester_id): Path<String>,
    Json(req): Json<CreateMessageReq>,
) -> Result<impl IntoResponse, ChatError> {
    let semester = parse_semester_path(&semester_id)?;
    if req.text.trim().is_empty() {
        return Err(ChatError::Validation("empty_text".into()));
    }
    let message = state
        .store
        .append(semester, claims.user(), req.text, req.temp_id)
        .await?;
    // Live peers learn of fallback submissions immediately too.
    state.broadcaster.broadcast(
        semester,
        &ServerEvent::MessageNew {
            message: message.clone(),
        },
    );
    Ok((
        StatusCode::CREATED,
        Json(CreateMessageResp {
            success: true,
            message,
        }),
    ))
}

/// Run the HTTP server bound to the configured address.
pub async fn run_http_server(config: Config) -> Result<()> {
    let addr: SocketAddr = config.bind.parse()?;
    let state = AppState::new(config).await?;
    tracing::info!(%addr, "semester chat listening");
    axum::Server::bind(&addr)
        .serve(build_router(state).into_make_service())
        .await?;
    Ok(())
}
