use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info};
use tv_core::event::TvEvent;
use tv_proto::playlist::Direction;
use tv_proto::protocol::{Command, Notice, TvSnapshot};
use tv_proto::state::StateManager;

#[derive(Clone)]
struct HttpState {
    state_manager: StateManager,
    event_tx: mpsc::Sender<TvEvent>,
}

#[derive(Serialize)]
struct ApiState {
    #[serde(flatten)]
    snapshot: TvSnapshot,
    channel_number: usize,
    indicator: String,
}

pub fn start_server(
    bind_address: String,
    port: u16,
    state_manager: StateManager,
    event_tx: mpsc::Sender<TvEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app_state = HttpState {
            state_manager,
            event_tx,
        };

        let app = Router::new()
            .route("/api/state", get(get_state))
            .route("/api/mute", get(toggle_mute).post(toggle_mute))
            .route("/api/volume/set/:level", get(set_volume).post(set_volume))
            .route("/api/volume/:delta", get(adjust_volume).post(adjust_volume))
            .route("/api/channel/up", get(channel_up).post(channel_up))
            .route("/api/channel/down", get(channel_down).post(channel_down))
            .route("/api/visibility/:state", get(visibility).post(visibility))
            .route("/api/focus", get(focus).post(focus))
            .with_state(app_state);

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API server listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

async fn send(state: &HttpState, cmd: Command) -> StatusCode {
    info!("HTTP API: {:?}", cmd);
    if state.event_tx.send(TvEvent::Command(cmd)).await.is_err() {
        error!("Failed to send command, core loop is gone");
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    StatusCode::OK
}

async fn get_state(State(state): State<HttpState>) -> Json<ApiState> {
    let snapshot = state.state_manager.get_state().await;
    Json(ApiState {
        channel_number: snapshot.current_channel + 1,
        indicator: Notice::indicator_text(snapshot.is_muted, snapshot.volume_level),
        snapshot,
    })
}

async fn toggle_mute(State(state): State<HttpState>) -> StatusCode {
    send(&state, Command::ToggleMute).await
}

async fn adjust_volume(State(state): State<HttpState>, Path(delta): Path<i32>) -> StatusCode {
    send(&state, Command::AdjustVolume { delta }).await
}

async fn set_volume(State(state): State<HttpState>, Path(level): Path<u8>) -> StatusCode {
    send(&state, Command::SetVolume { level }).await
}

async fn channel_up(State(state): State<HttpState>) -> StatusCode {
    send(
        &state,
        Command::ChangeChannel {
            direction: Direction::Up,
        },
    )
    .await
}

async fn channel_down(State(state): State<HttpState>) -> StatusCode {
    send(
        &state,
        Command::ChangeChannel {
            direction: Direction::Down,
        },
    )
    .await
}

async fn visibility(State(state): State<HttpState>, Path(page): Path<String>) -> StatusCode {
    let hidden = match page.as_str() {
        "hidden" => true,
        "visible" => false,
        other => {
            error!("HTTP API: unknown visibility state {:?}", other);
            return StatusCode::BAD_REQUEST;
        }
    };
    send(&state, Command::Visibility { hidden }).await
}

async fn focus(State(state): State<HttpState>) -> StatusCode {
    send(&state, Command::Focus).await
}
