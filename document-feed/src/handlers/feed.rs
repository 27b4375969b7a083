//! Live feed over a WebSocket.
//!
//! Each connection owns one [`DocumentFeed`]. The server sends a
//! [`FeedView`] frame whenever the visible page changes; the client drives
//! navigation with [`FeedCommand`] frames. Closing the socket tears the
//! feed's subscription down.

use crate::dtos::{FeedCommand, FeedParams, FeedView};
use crate::feed::{DocumentFeed, FeedConfig};
use crate::session::AuthUser;
use crate::startup::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use service_core::error::AppError;

pub async fn document_feed(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<FeedParams>,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    let mut config = state.config.feed.clone();
    if let Some(page_size) = params.page_size {
        config.page_size = page_size;
    }
    config.validate()?;

    Ok(ws.on_upgrade(move |socket| run_feed(socket, state, user, config)))
}

async fn run_feed(mut socket: WebSocket, state: AppState, user: AuthUser, config: FeedConfig) {
    let mut feed = match DocumentFeed::initialize(state.gateway.clone(), config).await {
        Ok(feed) => feed,
        Err(e) => {
            tracing::error!(user_id = %user.id, error = %e, "Failed to open document feed");
            let view = FeedView {
                items: Vec::new(),
                page_number: 1,
                has_more: false,
                loading: false,
                error: Some(e.to_string()),
            };
            let _ = send_view(&mut socket, &view).await;
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    tracing::info!(user_id = %user.id, page_size = feed.page_size(), "Feed client connected");

    // Pushes may already have landed while subscribing.
    feed.poll_updates();
    if send_view(&mut socket, &FeedView::from(feed.state())).await.is_err() {
        feed.teardown();
        return;
    }

    loop {
        let subscribed = feed.is_subscribed();
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        let reply = handle_command(&mut feed, &user, &text).await;
                        if send_view(&mut socket, &reply).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(_) = feed.next_update(), if subscribed => {
                feed.poll_updates();
                if send_view(&mut socket, &FeedView::from(feed.state())).await.is_err() {
                    break;
                }
            }
        }
    }

    feed.teardown();
    tracing::info!(user_id = %user.id, "Feed client disconnected");
}

async fn handle_command(feed: &mut DocumentFeed, user: &AuthUser, text: &str) -> FeedView {
    let command: FeedCommand = match serde_json::from_str(text) {
        Ok(command) => command,
        Err(e) => {
            tracing::warn!(user_id = %user.id, error = %e, "Invalid feed command");
            let mut view = FeedView::from(feed.state());
            view.error = Some(format!("invalid command: {}", e));
            return view;
        }
    };

    let result = match command {
        FeedCommand::Next => feed.go_to_next_page().await.map(|_| ()),
        FeedCommand::Previous => feed.go_to_previous_page().await.map(|_| ()),
        FeedCommand::Refresh => feed.refresh().await,
    };
    if let Err(e) = result {
        tracing::warn!(user_id = %user.id, command = ?command, error = %e, "Feed command failed");
    }

    feed.poll_updates();
    FeedView::from(feed.state())
}

async fn send_view(socket: &mut WebSocket, view: &FeedView) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(view) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode feed frame");
            return Ok(());
        }
    };
    socket.send(Message::Text(text)).await
}
