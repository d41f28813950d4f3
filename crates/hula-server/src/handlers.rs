//! Connection and request handlers for the hula server.
//!
//! Two entry points share one [`Renderer`]:
//! - plain HTTP `GET` of any route renders the page with its ancestors
//! - the WebSocket channel answers `Call` frames with rendered html

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use crate::page::PageTemplate;
use anyhow::Result;
use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, Query as QueryParams, State},
    http::{Method, StatusCode, Uri},
    response::{Html, IntoResponse, Response as HttpResponse},
    routing::get,
    Router,
};
use futures_util::FutureExt;
use hula_core::{Context, Renderer, RouteTable};
use hula_protocol::{Call, Encoding, Frame, Query, Response};
use hula_transport::{Connection, Incoming, UpgradedConnection};
use percent_encoding::percent_decode_str;
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, trace, warn};

/// Shared server state.
pub struct AppState {
    /// Renders every route the server knows.
    pub renderer: Renderer,
    /// Outer page for plain HTTP requests.
    pub page: PageTemplate,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config, routes: RouteTable, page: PageTemplate) -> Self {
        Self {
            renderer: Renderer::new(routes),
            page,
            config,
        }
    }
}

/// Build the axum router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .fallback(page_handler)
        .with_state(state)
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config, routes: RouteTable) -> Result<()> {
    let page = PageTemplate::load(config.webroot.as_deref())?;
    let state = Arc::new(AppState::new(config.clone(), routes, page));

    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!(
        routes = state.renderer.routes().len(),
        environment = ?config.environment,
        "hula server listening on {}", addr
    );
    info!(
        "Channel endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Plain HTTP rendering of any other path.
async fn page_handler(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    QueryParams(params): QueryParams<HashMap<String, String>>,
) -> HttpResponse {
    if method != Method::GET && method != Method::HEAD {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let query: Query = params
        .into_iter()
        .map(|(key, value)| (key, Value::String(value)))
        .collect();

    let path = match percent_decode_str(uri.path()).decode_utf8() {
        Ok(path) => path,
        Err(_) => return (StatusCode::BAD_REQUEST, "Path is not valid UTF-8").into_response(),
    };

    render_page(&state, &path, query).await
}

/// Render a route with its ancestors into the page template.
pub async fn render_page(state: &AppState, path: &str, query: Query) -> HttpResponse {
    let start = Instant::now();
    let context = Context::with_state(query);
    let rendered = state.renderer.render_html(path, &context, true).await;
    metrics::record_render(start.elapsed().as_secs_f64());

    let body = match rendered {
        Ok(body) => body,
        Err(e) => {
            warn!(path = %path, code = e.code(), error = %e, "Page render failed");
            metrics::record_page(e.code());
            let status =
                StatusCode::from_u16(e.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return (status, e.to_string()).into_response();
        }
    };

    match state.page.fill(&body, &context.snapshot()) {
        Ok(html) => {
            debug!(path = %path, components = context.component_count(), "Rendered page");
            metrics::record_page(200);
            Html(html).into_response()
        }
        Err(e) => {
            error!(path = %path, error = %e, "Page template failed");
            metrics::record_page(500);
            metrics::record_error("page");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let max_message_size = state.config.transport.max_message_size;
    ws.max_message_size(max_message_size)
        .on_upgrade(move |socket| {
            let connection = UpgradedConnection::new(socket, max_message_size)
                .with_remote_addr(addr.to_string());
            serve_connection(connection, state)
        })
}

/// Answer one call with a fresh context.
///
/// Html larger than `max_response_size` is answered with an error instead,
/// since a client could not accept it.
pub async fn answer(renderer: &Renderer, call: Call, max_response_size: usize) -> Response {
    let start = Instant::now();
    let context = Context::with_state(call.query.clone());
    let rendered = renderer.render_html(&call.path, &context, call.parents).await;
    metrics::record_render(start.elapsed().as_secs_f64());

    match rendered {
        Ok(html) if html.len() > max_response_size => {
            warn!(call = call.id, path = %call.path, bytes = html.len(), "Response too large");
            metrics::record_call("too_large");
            let message = format!(
                "Response of {} bytes exceeds the {} byte limit",
                html.len(),
                max_response_size
            );
            Response::failure(call, message, Some(500))
        }
        Ok(html) => {
            metrics::record_call("result");
            Response::success(call, Value::String(html))
        }
        Err(e) => {
            warn!(call = call.id, path = %call.path, error = %e, "Call failed");
            metrics::record_call("error");
            Response::failure(call, e.to_string(), Some(e.code()))
        }
    }
}

/// Answer one call, turning a panicking component into an error response.
async fn answer_isolated(state: &AppState, call: Call) -> Response {
    let fallback = call.clone();
    let max_response_size = state.config.transport.max_response_size;

    match AssertUnwindSafe(answer(&state.renderer, call, max_response_size))
        .catch_unwind()
        .await
    {
        Ok(response) => response,
        Err(_) => {
            error!(call = fallback.id, path = %fallback.path, "Component panicked");
            metrics::record_call("panic");
            Response::failure(fallback, "Component panicked", Some(500))
        }
    }
}

/// Serve the channel protocol over one connection until it closes.
///
/// Calls run concurrently, each on its own task; responses are written in
/// completion order using the encoding the call arrived in.
pub async fn serve_connection<C: Connection>(mut connection: C, state: Arc<AppState>) {
    let _metrics_guard = ConnectionMetricsGuard::new();
    let connection_id = connection.id().clone();
    debug!(
        connection = %connection_id,
        remote = connection.remote_addr().as_deref().unwrap_or("unknown"),
        "Channel connected"
    );

    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<(Frame, Encoding)>();
    let mut calls = JoinSet::new();

    loop {
        tokio::select! {
            Some((frame, encoding)) = reply_rx.recv() => {
                if let Err(e) = connection.send(&frame, encoding).await {
                    warn!(connection = %connection_id, error = %e, "Failed to send response");
                    metrics::record_error("send");
                    break;
                }
            }

            Some(joined) = calls.join_next(), if !calls.is_empty() => {
                if let Err(e) = joined {
                    warn!(connection = %connection_id, error = %e, "Call task failed");
                }
            }

            incoming = connection.recv() => {
                match incoming {
                    Ok(Some(Incoming { frame, encoding })) => match frame {
                        Frame::Hello(hello) => {
                            trace!(connection = %connection_id, ordinal = hello.connection_ordinal, "Hello");
                            if hello.connection_ordinal > 0 && state.config.environment.live_reload() {
                                info!(connection = %connection_id, "Reconnected client, requesting reload");
                                metrics::record_reload();
                                if connection.send(&Frame::reload(), encoding).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Frame::Call(call) => {
                            trace!(connection = %connection_id, call = call.id, path = %call.path, "Call");
                            let state = Arc::clone(&state);
                            let reply_tx = reply_tx.clone();
                            calls.spawn(async move {
                                let response = answer_isolated(&state, call).await;
                                let _ = reply_tx.send((Frame::Response(response), encoding));
                            });
                        }
                        other => {
                            warn!(connection = %connection_id, frame_type = other.frame_type().as_str(), "Unexpected frame type");
                            metrics::record_error("unexpected_frame");
                        }
                    },
                    Ok(None) => break,
                    Err(e) if e.is_recoverable() => {
                        warn!(connection = %connection_id, error = %e, "Dropping malformed message");
                        metrics::record_error("protocol");
                    }
                    Err(e) => {
                        warn!(connection = %connection_id, error = %e, "Connection failed");
                        metrics::record_error("transport");
                        break;
                    }
                }
            }
        }
    }

    calls.abort_all();
    debug!(connection = %connection_id, "Channel disconnected");
}
