//! Gateway HTTP + WebSocket server (single port).

use crate::config::{self, Config};
use crate::gateway::protocol::{
    ConnectParams, HelloOk, HistoryParams, SubmitParams, WsRequest, WsResponse,
};
use crate::pipeline::{self, AgentKind};
use crate::session::{SessionMessage, SessionStore};
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path as UrlPath, State,
    },
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use include_dir::{include_dir, Dir};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::mpsc;

const PROTOCOL_VERSION: u32 = 1;

const SHUTDOWN_EVENT_JSON: &str = r#"{"type":"event","event":"shutdown","payload":{}}"#;

/// Browser chat UI, embedded at build time and served from `/`.
static WEBUI: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/webui");

/// When auth mode is token and a token is configured, returns it for connect validation.
fn require_connect_token(config: &Config) -> Option<String> {
    if config.gateway.auth.mode == config::GatewayAuthMode::Token {
        config::resolve_gateway_token(config)
    } else {
        None
    }
}

/// Event frame broadcast to connected clients. `origin` names the connection
/// that already delivered the frame locally (its forwarder skips it, so a
/// client never sees its own events twice or out of order with responses).
#[derive(Debug, Clone)]
pub struct BroadcastFrame {
    pub origin: Option<String>,
    pub text: String,
}

/// Shared state for the gateway (config, sessions, event broadcast).
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    /// When Some, WebSocket connect must provide params.auth.token matching this.
    pub required_token: Option<String>,
    /// Broadcasts events to connected clients (agent.active, session.message,
    /// shutdown). Subscribers receive JSON event frames.
    pub event_tx: broadcast::Sender<BroadcastFrame>,
    pub session_store: Arc<SessionStore>,
}

/// Build an agent.active event frame: the stage that is currently "working",
/// or null when the pipeline clears it.
fn agent_active_event(session_id: &str, agent: Option<AgentKind>) -> String {
    let event = json!({
        "type": "event",
        "event": "agent.active",
        "payload": {
            "sessionId": session_id,
            "agent": agent,
        }
    });
    serde_json::to_string(&event)
        .unwrap_or_else(|_| r#"{"type":"event","event":"agent.active","payload":{}}"#.to_string())
}

/// Build a session.message event frame for an appended message.
fn session_message_event(session_id: &str, message: &SessionMessage) -> String {
    let event = json!({
        "type": "event",
        "event": "session.message",
        "payload": {
            "sessionId": session_id,
            "message": message,
        }
    });
    serde_json::to_string(&event)
        .unwrap_or_else(|_| r#"{"type":"event","event":"session.message","payload":{}}"#.to_string())
}

/// Deliver an event frame: in-order to the originating connection through its
/// writer queue, and via broadcast (tagged with the origin) to everyone else.
async fn emit_event(
    state: &GatewayState,
    out_tx: &mpsc::Sender<Message>,
    conn_id: &str,
    text: String,
) {
    let _ = out_tx.send(Message::Text(text.clone())).await;
    let _ = state.event_tx.send(BroadcastFrame {
        origin: Some(conn_id.to_string()),
        text,
    });
}

/// Run the gateway server; binds to config.gateway.bind:config.gateway.port.
/// When bind is not loopback, a gateway token must be configured or startup fails.
/// Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_gateway(config: Config) -> Result<()> {
    let bind = config.gateway.bind.trim();
    if !config::is_loopback_bind(bind) {
        let token = config::resolve_gateway_token(&config);
        if token.is_none() || config.gateway.auth.mode != config::GatewayAuthMode::Token {
            anyhow::bail!(
                "refusing to bind gateway to {} without auth (set gateway.auth.mode to \"token\" and gateway.auth.token or DESKCREW_GATEWAY_TOKEN)",
                bind
            );
        }
    }

    let required_token = require_connect_token(&config);
    let (event_tx, _) = broadcast::channel(64);

    let state = GatewayState {
        config: Arc::new(config.clone()),
        required_token,
        event_tx: event_tx.clone(),
        session_store: Arc::new(SessionStore::new()),
    };

    let app = Router::new()
        .route("/", get(index_html))
        .route("/assets/*path", get(asset))
        .route("/health", get(health_http))
        .route("/ws", get(ws_handler))
        .with_state(state);

    let bind_addr = format!("{}:{}", bind, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(event_tx))
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
/// Broadcasts a shutdown event to WebSocket clients first.
async fn shutdown_signal(event_tx: broadcast::Sender<BroadcastFrame>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, broadcasting shutdown and draining connections");

    let _ = event_tx.send(BroadcastFrame {
        origin: None,
        text: SHUTDOWN_EVENT_JSON.to_string(),
    });
}

/// GET / serves the embedded chat UI.
async fn index_html() -> Response {
    match WEBUI.get_file("index.html").and_then(|f| f.contents_utf8()) {
        Some(html) => Html(html).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// GET /assets/*path serves embedded static files for the chat UI.
async fn asset(UrlPath(path): UrlPath<String>) -> Response {
    let Some(file) = WEBUI.get_file(&path) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let content_type = match path.rsplit('.').next() {
        Some("js") => "application/javascript",
        Some("css") => "text/css",
        Some("html") => "text/html; charset=utf-8",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    };
    ([(header::CONTENT_TYPE, content_type)], file.contents()).into_response()
}

/// GET /health returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "protocol": PROTOCOL_VERSION,
        "port": state.config.gateway.port,
    }))
}

/// GET /ws upgrades to WebSocket. First frame must be connect; we reply with hello-ok.
async fn ws_handler(State(state): State<GatewayState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Per-connection loop. The socket is split so a writer task owns the sink:
/// broadcast events (agent.active, session.message) reach the client while a
/// submit request is still being processed on this connection.
async fn handle_socket(socket: WebSocket, state: GatewayState) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(64);

    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if sink.send(msg).await.is_err() {
                break;
            }
        }
    });

    let mut event_rx = state.event_tx.subscribe();
    let event_out = out_tx.clone();
    let forwarder_conn_id = conn_id.clone();
    let forwarder = tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(frame) => {
                    // this connection already got its own events via out_tx
                    if frame.origin.as_deref() == Some(forwarder_conn_id.as_str()) {
                        continue;
                    }
                    let is_shutdown = frame.text == SHUTDOWN_EVENT_JSON;
                    if event_out.send(Message::Text(frame.text)).await.is_err() {
                        break;
                    }
                    if is_shutdown {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    log::debug!("ws client lagged {} broadcast messages", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let mut connected = false;

    while let Some(Ok(msg)) = stream.next().await {
        let Message::Text(text) = msg else { continue };
        let Ok(req): Result<WsRequest, _> = serde_json::from_str(&text) else {
            continue;
        };

        if req.typ != "req" {
            continue;
        }

        match req.method.as_str() {
            "connect" => {
                let params: ConnectParams = match serde_json::from_value(req.params.clone()) {
                    Ok(p) => p,
                    Err(_) => {
                        send_response(&out_tx, WsResponse::err(&req.id, "invalid connect params"))
                            .await;
                        continue;
                    }
                };
                if let Some(ref required) = state.required_token {
                    let provided = params.auth.token.as_deref().unwrap_or("").trim();
                    if provided.is_empty() {
                        send_response(
                            &out_tx,
                            WsResponse::err(
                                &req.id,
                                "unauthorized: gateway token missing (set DESKCREW_GATEWAY_TOKEN or gateway.auth.token)",
                            ),
                        )
                        .await;
                        continue;
                    }
                    if provided != required {
                        send_response(
                            &out_tx,
                            WsResponse::err(&req.id, "unauthorized: gateway token mismatch"),
                        )
                        .await;
                        continue;
                    }
                }
                let protocol = params
                    .max_protocol
                    .unwrap_or(PROTOCOL_VERSION)
                    .min(PROTOCOL_VERSION);
                let hello = HelloOk {
                    typ: "hello-ok".to_string(),
                    protocol,
                };
                connected = true;
                send_response(
                    &out_tx,
                    WsResponse::ok(&req.id, serde_json::to_value(&hello).unwrap_or(json!({}))),
                )
                .await;
            }
            "health" => {
                let payload = json!({
                    "runtime": "running",
                    "protocol": PROTOCOL_VERSION,
                });
                send_response(&out_tx, WsResponse::ok(&req.id, payload)).await;
            }
            "status" => {
                if !authorized(&state, connected) {
                    send_response(&out_tx, WsResponse::err(&req.id, "not connected")).await;
                    continue;
                }
                let auth_mode = if state.required_token.is_some() {
                    "token"
                } else {
                    "none"
                };
                let payload = json!({
                    "runtime": "running",
                    "protocol": PROTOCOL_VERSION,
                    "port": state.config.gateway.port,
                    "bind": state.config.gateway.bind,
                    "auth": auth_mode,
                    "pipeline": state.config.pipeline,
                    "sessions": state.session_store.len().await,
                });
                send_response(&out_tx, WsResponse::ok(&req.id, payload)).await;
            }
            "submit" => {
                if !authorized(&state, connected) {
                    send_response(&out_tx, WsResponse::err(&req.id, "not connected")).await;
                    continue;
                }
                let params: SubmitParams = match serde_json::from_value(req.params.clone()) {
                    Ok(p) => p,
                    Err(_) => {
                        send_response(&out_tx, WsResponse::err(&req.id, "invalid submit params"))
                            .await;
                        continue;
                    }
                };
                handle_submit(&state, &out_tx, &conn_id, &req.id, params).await;
            }
            "history" => {
                if !authorized(&state, connected) {
                    send_response(&out_tx, WsResponse::err(&req.id, "not connected")).await;
                    continue;
                }
                let params: HistoryParams = match serde_json::from_value(req.params.clone()) {
                    Ok(p) => p,
                    Err(_) => {
                        send_response(&out_tx, WsResponse::err(&req.id, "invalid history params"))
                            .await;
                        continue;
                    }
                };
                match state.session_store.get(&params.session_id).await {
                    Some(session) => {
                        let payload = json!({
                            "sessionId": session.id,
                            "messages": session.messages,
                        });
                        send_response(&out_tx, WsResponse::ok(&req.id, payload)).await;
                    }
                    None => {
                        send_response(&out_tx, WsResponse::err(&req.id, "session not found")).await;
                    }
                }
            }
            _ => {
                send_response(
                    &out_tx,
                    WsResponse::err(&req.id, format!("unknown method: {}", req.method)),
                )
                .await;
            }
        }
    }

    forwarder.abort();
    drop(out_tx);
    let _ = writer.await;

    if !connected {
        log::debug!("ws client disconnected before sending connect");
    }
}

/// Methods past the handshake require connect only when token auth is on;
/// without a token the gateway is loopback-only and open, as over HTTP.
fn authorized(state: &GatewayState, connected: bool) -> bool {
    state.required_token.is_none() || connected
}

async fn send_response(out_tx: &mpsc::Sender<Message>, res: WsResponse) {
    let text = serde_json::to_string(&res).unwrap_or_default();
    let _ = out_tx.send(Message::Text(text)).await;
}

/// Run the pipeline for one submitted message: get or create the session,
/// append the user message, run the three stages (emitting agent.active
/// transitions and each appended message as events), and answer with the
/// ordered message list.
async fn handle_submit(
    state: &GatewayState,
    out_tx: &mpsc::Sender<Message>,
    conn_id: &str,
    req_id: &str,
    params: SubmitParams,
) {
    if params.message.trim().is_empty() {
        send_response(out_tx, WsResponse::err(req_id, "empty message")).await;
        return;
    }
    let session_id = if let Some(ref id) = params.session_id {
        state.session_store.get_or_create(id.clone()).await
    } else {
        state.session_store.create().await
    };

    let user_message = SessionMessage::user(params.message.clone());
    if let Err(e) = state
        .session_store
        .append(&session_id, user_message.clone())
        .await
    {
        send_response(out_tx, WsResponse::err(req_id, e)).await;
        return;
    }
    emit_event(
        state,
        out_tx,
        conn_id,
        session_message_event(&session_id, &user_message),
    )
    .await;

    let delays = state.config.pipeline.stage_delays();
    let event_tx = state.event_tx.clone();
    let stage_out = out_tx.clone();
    let stage_session = session_id.clone();
    let stage_conn = conn_id.to_string();
    // The callback is synchronous, so the local copy uses try_send; the
    // per-connection queue is far deeper than four stage transitions.
    let mut on_stage = move |stage: Option<AgentKind>| {
        let text = agent_active_event(&stage_session, stage);
        let _ = stage_out.try_send(Message::Text(text.clone()));
        let _ = event_tx.send(BroadcastFrame {
            origin: Some(stage_conn.clone()),
            text,
        });
    };

    let run_result = pipeline::run_pipeline(
        &state.session_store,
        &session_id,
        &params.message,
        delays,
        Some(&mut on_stage),
    )
    .await;

    match run_result {
        Ok(messages) => {
            for msg in &messages {
                emit_event(
                    state,
                    out_tx,
                    conn_id,
                    session_message_event(&session_id, msg),
                )
                .await;
            }
            // reply message carries the full metadata for this run
            let meta = messages.get(1).and_then(|m| m.meta.clone()).unwrap_or_default();
            let payload = json!({
                "sessionId": session_id,
                "intent": meta.intent,
                "escalation": meta.escalation.unwrap_or(false),
                "messages": messages,
            });
            send_response(out_tx, WsResponse::ok(req_id, payload)).await;
        }
        Err(e) => {
            log::warn!("submit: pipeline failed: {}", e);
            send_response(out_tx, WsResponse::err(req_id, e.to_string())).await;
        }
    }
}
