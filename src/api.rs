use std::{net::SocketAddr, sync::Arc};

use anyhow::{Error, Result};
use axum::{
    Router,
    extract::{
        State,
        rejection::JsonRejection,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use tokio::{net::TcpListener, sync::broadcast::error::RecvError};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::{
    clients::{
        broadcaster::{Broadcaster, ChannelBroadcaster},
        health::HealthChecker,
    },
    error::IngressError,
    models::{
        event::{Event, NotifyRequest},
        health::{HealthStatus, LivenessResponse},
        response::{ErrorResponse, MessageResponse, RealtimeFrame},
    },
    pipeline::{NotificationPipeline, ProcessOutcome},
};

const REQUIRED_FIELDS: &str = "userId and type are required";

pub struct AppState {
    pub pipeline: Arc<NotificationPipeline>,
    pub broadcaster: Arc<ChannelBroadcaster>,
    pub health_checker: HealthChecker,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/notify", post(notify))
        .route("/health", get(health_check))
        .route("/health/ready", get(readiness_check))
        .route("/ws", get(realtime))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_api_server(
    state: Arc<AppState>,
    port: u16,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), Error> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!(address = %addr, "Notification service listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

/// Runs a directly submitted event through the pipeline. Unknown event
/// types are accepted without creating a record.
pub async fn submit(
    pipeline: &NotificationPipeline,
    request: NotifyRequest,
) -> Result<ProcessOutcome, IngressError> {
    let (user_id, event_type) = match (request.user_id, request.event_type) {
        (Some(user_id), Some(event_type))
            if !user_id.trim().is_empty() && !event_type.trim().is_empty() =>
        {
            (user_id, event_type)
        }
        _ => return Err(IngressError::Validation(REQUIRED_FIELDS.to_string())),
    };

    let event = Event {
        event_type,
        user_id: Some(user_id),
        order_id: request.order_id,
        status: request.status,
    };

    Ok(pipeline.process(&event).await?)
}

impl IntoResponse for IngressError {
    fn into_response(self) -> Response {
        let status = match &self {
            IngressError::Validation(_) => StatusCode::BAD_REQUEST,
            IngressError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}

async fn notify(
    State(state): State<Arc<AppState>>,
    body: Result<Json<NotifyRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "Rejected malformed notify request");
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new(rejection.body_text())),
            )
                .into_response();
        }
    };

    match submit(&state.pipeline, request).await {
        Ok(_) => (StatusCode::OK, Json(MessageResponse::processed())).into_response(),
        Err(e) => {
            warn!(error = %e, "Notify request failed");
            e.into_response()
        }
    }
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(LivenessResponse::ok()))
}

async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_checker.check_all().await;

    let status_code = match health.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn realtime(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| forward_notifications(socket, state))
}

async fn forward_notifications(mut socket: WebSocket, state: Arc<AppState>) {
    let mut notifications = state.broadcaster.subscribe();

    debug!(
        subscribers = state.broadcaster.subscriber_count(),
        "Realtime subscriber connected"
    );

    loop {
        tokio::select! {
            received = notifications.recv() => match received {
                Ok(message) => {
                    let frame = match serde_json::to_string(&RealtimeFrame::notification(message)) {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!(error = %e, "Failed to encode realtime frame");
                            continue;
                        }
                    };

                    if socket.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Realtime subscriber lagging, notifications skipped");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }

    debug!("Realtime subscriber disconnected");
}
