use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    serve, Json, Router,
};
use minijinja::{path_loader, Environment};
use minijinja_autoreload::AutoReloader;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use tokio::sync::{watch, Mutex, OwnedMutexGuard, RwLock};
use tokio::time::{Instant, MissedTickBehavior};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::constants;
use crate::error::ChatError;
use crate::profile::ProfileForm;
use crate::prompt::PromptTemplate;
use crate::session::{ChatSession, SessionSnapshot};
use crate::speech::Playback;
use crate::ChatConfig;

/// Live chat sessions, one per browser that completed the profile form.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, SessionEntry>>>,
}

struct SessionEntry {
    session: Arc<Mutex<ChatSession>>,
    view: watch::Receiver<SessionSnapshot>,
    last_seen: Instant,
}

impl SessionStore {
    pub async fn insert(&self, session: ChatSession) -> Uuid {
        let id = Uuid::new_v4();
        let entry = SessionEntry {
            view: session.subscribe(),
            session: Arc::new(Mutex::new(session)),
            last_seen: Instant::now(),
        };
        self.sessions.write().await.insert(id, entry);
        id
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<Mutex<ChatSession>>> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(&id)?;
        entry.last_seen = Instant::now();
        Some(entry.session.clone())
    }

    /// The latest published snapshot. Never waits on a turn in flight.
    pub async fn snapshot(&self, id: Uuid) -> Option<SessionSnapshot> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(&id)?;
        entry.last_seen = Instant::now();
        let snapshot = entry.view.borrow().clone();
        Some(snapshot)
    }

    /// Tear a session down. Its audio files go with it.
    pub async fn remove(&self, id: Uuid) -> bool {
        self.sessions.write().await.remove(&id).is_some()
    }

    /// Drop sessions nobody has touched for `ttl`. A session with a turn or
    /// playback in flight is never evicted.
    pub async fn evict_idle(&self, ttl: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|id, entry| {
            let keep = entry.last_seen.elapsed() < ttl || entry.session.try_lock().is_err();
            if !keep {
                info!(session_id = %id, "Evicting idle session");
            }
            keep
        });
        before - sessions.len()
    }

    /// Sweep idle sessions every `every` until the process exits.
    pub async fn run_eviction(self, ttl: Duration, every: Duration) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let evicted = self.evict_idle(ttl).await;
            if evicted > 0 {
                let remaining = self.len().await;
                debug!(evicted, remaining, "Idle session sweep");
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

// Shared application state
#[derive(Clone)]
pub struct AppState {
    templates: Arc<AutoReloader>,
    prompt: Arc<PromptTemplate>,
    config: Arc<ChatConfig>,
    sessions: SessionStore,
}

impl AppState {
    pub fn new(config: ChatConfig) -> Result<Self> {
        let prompt = PromptTemplate::resolve(config.prompt_path.as_deref())
            .context("Failed to load instruction template")?;
        let templates = create_minijinja_env(config.templates_dir.clone());
        Ok(Self {
            templates: Arc::new(templates),
            prompt: Arc::new(prompt),
            config: Arc::new(config),
            sessions: SessionStore::default(),
        })
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }
}

// Minijinja Environment setup
fn create_minijinja_env(dir: PathBuf) -> AutoReloader {
    // Use AutoReloader for development convenience
    AutoReloader::new(move |notifier| {
        let mut env = Environment::new();
        env.set_loader(path_loader(&dir));
        // Watch the templates directory for changes
        notifier.watch_path(&dir, true);
        Ok(env)
    })
}

/// JSON error body: a notice for the user, plus the unchanged snapshot when
/// there is one to redraw.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    notice: String,
    retryable: bool,
    snapshot: Option<SessionSnapshot>,
}

#[derive(Serialize)]
struct ErrorBody {
    notice: String,
    retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    snapshot: Option<SessionSnapshot>,
}

impl ApiError {
    fn not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            notice: "session not found, please start again".to_string(),
            retryable: false,
            snapshot: None,
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            notice: message.into(),
            retryable: false,
            snapshot: None,
        }
    }

    fn with_snapshot(mut self, snapshot: SessionSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        let status = match &err {
            ChatError::MissingCredential
            | ChatError::InvalidProfile(_)
            | ChatError::EmptyMessage => StatusCode::BAD_REQUEST,
            ChatError::Busy => StatusCode::CONFLICT,
            ChatError::NoSuchTurn(_) => StatusCode::NOT_FOUND,
            ChatError::Generation(_) | ChatError::Synthesis(_) => StatusCode::BAD_GATEWAY,
            ChatError::Template(_) | ChatError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            notice: err.to_string(),
            retryable: err.is_retryable(),
            snapshot: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            notice: self.notice,
            retryable: self.retryable,
            snapshot: self.snapshot,
        };
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

async fn index_handler(State(state): State<AppState>) -> Result<Html<String>, Html<String>> {
    // Acquire env, get template, and render within the same block
    state
        .templates
        .acquire_env()
        .and_then(|env| {
            env.get_template("index.html").and_then(|tmpl| {
                let context = minijinja::context! {
                    title => "AuraAssist | AI Support",
                };
                tmpl.render(context)
            })
        })
        .map(Html)
        .map_err(|e| {
            error!("Failed to get or render template: {}", e);
            Html(format!("Internal Server Error: {}", e))
        })
}

#[derive(Serialize)]
struct SessionCreated {
    session_id: Uuid,
    snapshot: SessionSnapshot,
}

async fn create_session(
    State(state): State<AppState>,
    Json(form): Json<ProfileForm>,
) -> ApiResult<(StatusCode, Json<SessionCreated>)> {
    let session = ChatSession::start(form, state.prompt.clone(), &state.config)?;
    let snapshot = session.snapshot();
    let session_id = state.sessions.insert(session).await;
    info!(%session_id, "Session created");
    Ok((StatusCode::CREATED, Json(SessionCreated { session_id, snapshot })))
}

/// Lock a session without waiting: a turn already in flight means busy.
async fn claim(state: &AppState, id: Uuid) -> ApiResult<OwnedMutexGuard<ChatSession>> {
    let session = state.sessions.get(id).await.ok_or_else(ApiError::not_found)?;
    session
        .try_lock_owned()
        .map_err(|_| ApiError::from(ChatError::Busy))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SessionSnapshot>> {
    state
        .sessions
        .snapshot(id)
        .await
        .map(Json)
        .ok_or_else(ApiError::not_found)
}

#[derive(Deserialize)]
struct MessageBody {
    text: String,
}

async fn submit_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<MessageBody>,
) -> ApiResult<Json<SessionSnapshot>> {
    let mut session = claim(&state, id).await?;

    // Spawned so a dropped connection cannot abandon the turn mid-flight.
    let (outcome, snapshot) = tokio::spawn(async move {
        let outcome = session.submit_message(&body.text).await;
        (outcome, session.snapshot())
    })
    .await
    .map_err(|e| {
        error!("Turn task failed: {:?}", e);
        ApiError::internal("the turn could not be completed")
    })?;

    match outcome {
        Ok(snapshot) => Ok(Json(snapshot)),
        Err(e) => Err(ApiError::from(e).with_snapshot(snapshot)),
    }
}

#[derive(Serialize)]
struct PlaybackBody {
    /// `None` means there is nothing to play.
    audio_url: Option<String>,
}

async fn request_playback(
    State(state): State<AppState>,
    Path((id, index)): Path<(Uuid, usize)>,
) -> ApiResult<Json<PlaybackBody>> {
    let mut session = claim(&state, id).await?;
    let playback = tokio::spawn(async move { session.request_playback(index).await })
        .await
        .map_err(|e| {
            error!("Playback task failed: {:?}", e);
            ApiError::internal("playback could not be prepared")
        })??;

    let audio_url = match playback {
        Playback::Audio(_) => Some(format!("/api/sessions/{id}/turns/{index}/audio")),
        Playback::NoAudio => None,
    };
    Ok(Json(PlaybackBody { audio_url }))
}

async fn get_audio(
    State(state): State<AppState>,
    Path((id, index)): Path<(Uuid, usize)>,
) -> ApiResult<Response> {
    let clip = {
        let session = claim(&state, id).await?;
        session
            .rendered_audio(index)
            .and_then(Playback::clip)
            .cloned()
            .ok_or(ChatError::NoSuchTurn(index))?
    };

    let bytes = clip.read().await.map_err(|e| {
        warn!("Failed to read audio clip: {}", e);
        ApiError::from(e)
    })?;
    Ok(([(header::CONTENT_TYPE, "audio/mpeg")], bytes).into_response())
}

async fn reset_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if state.sessions.remove(id).await {
        info!(session_id = %id, "Session reset");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found())
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    // Serve static files from the configured static directory
    let static_files_service = ServeDir::new(&state.config.static_dir).not_found_service(
        tower::service_fn(|_: axum::extract::Request| async {
            Ok::<_, std::convert::Infallible>(
                (StatusCode::NOT_FOUND, Body::from("Not Found")).into_response(),
            )
        }),
    );

    Router::new()
        .route("/", get(index_handler))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_session).delete(reset_session))
        .route("/api/sessions/:id/messages", post(submit_message))
        .route("/api/sessions/:id/turns/:index/speech", post(request_playback))
        .route("/api/sessions/:id/turns/:index/audio", get(get_audio))
        // Static files live under /static so they cannot shadow API routes.
        .nest_service("/static", static_files_service)
        .with_state(state)
        .layer(TraceLayer::new_for_http()) // Add request logging
}

pub async fn start_web_server(addr: SocketAddr, config: ChatConfig) -> Result<()> {
    let state = AppState::new(config)?;
    tokio::spawn(
        state
            .sessions
            .clone()
            .run_eviction(state.config.session_ttl, constants::SESSION_SWEEP_INTERVAL),
    );
    let app = router(state);

    info!("Web server listening on http://{}", addr);

    // Bind using tokio::net::TcpListener
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind to address {}", addr))?;

    serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Web server failed")?;

    info!("Web server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        // Without a signal handler, run until the process is killed.
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Ctrl-C received, initiating shutdown...");
}
