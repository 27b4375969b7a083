mod common;

use common::{TestApp, TEST_USER_ID};
use document_feed::dtos::FeedView;
use document_feed::gateway::DocumentGateway;
use document_feed::models::NewDocument;
use futures::{SinkExt, StreamExt};
use reqwest::multipart;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(app: &TestApp, query: &str) -> Socket {
    let mut request = format!("{}/documents/feed{}", app.ws_address, query)
        .into_client_request()
        .unwrap();
    request
        .headers_mut()
        .insert("X-User-ID", TEST_USER_ID.parse().unwrap());

    let (socket, _) = tokio_tungstenite::connect_async(request)
        .await
        .expect("Failed to open feed socket");
    socket
}

async fn next_view(socket: &mut Socket) -> FeedView {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("Timed out waiting for feed frame")
            .expect("Socket closed")
            .expect("Socket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("Invalid feed frame");
        }
    }
}

async fn send(socket: &mut Socket, action: &str) {
    let frame = format!(r#"{{"action":"{}"}}"#, action);
    socket.send(Message::Text(frame)).await.unwrap();
}

async fn seed(app: &TestApp, count: usize) {
    for n in 0..count {
        app.gateway
            .insert(NewDocument::new(
                format!("seed-{n}.txt"),
                format!("http://localhost/files/seed-{n}"),
            ))
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn feed_pages_and_receives_live_uploads() {
    let app = TestApp::spawn().await;
    seed(&app, 3).await;
    let mut socket = connect(&app, "?page_size=2").await;

    let first = next_view(&mut socket).await;
    assert_eq!(first.page_number, 1);
    assert_eq!(first.items.len(), 2);
    assert!(first.has_more);
    assert!(!first.loading);

    send(&mut socket, "next").await;
    let second = next_view(&mut socket).await;
    assert_eq!(second.page_number, 2);
    assert_eq!(second.items.len(), 1);
    assert!(!second.has_more);

    // An upload lands after every seeded document, i.e. on this page.
    let form = multipart::Form::new().part(
        "file",
        multipart::Part::bytes(b"%PDF-1.4".to_vec())
            .file_name("live.pdf")
            .mime_str("application/pdf")
            .unwrap(),
    );
    let response = reqwest::Client::new()
        .post(format!("{}/documents", app.address))
        .header("X-User-ID", TEST_USER_ID)
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);

    let live = next_view(&mut socket).await;
    assert_eq!(live.page_number, 2);
    assert_eq!(live.items.len(), 2);
    assert_eq!(live.items[1].name, "live.pdf");
    assert!(live.has_more);

    send(&mut socket, "previous").await;
    let back = next_view(&mut socket).await;
    assert_eq!(back.page_number, 1);
    assert_eq!(back.items, first.items);

    socket.close(None).await.unwrap();
    app.cleanup().await;
}

#[tokio::test]
async fn closing_socket_releases_subscription() {
    let app = TestApp::spawn().await;
    seed(&app, 1).await;
    let mut socket = connect(&app, "").await;
    next_view(&mut socket).await;
    assert_eq!(app.gateway.active_subscriptions(), 1);

    socket.close(None).await.unwrap();

    let mut released = false;
    for _ in 0..40 {
        if app.gateway.active_subscriptions() == 0 {
            released = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert!(released, "feed subscription still open after close");

    app.cleanup().await;
}

#[tokio::test]
async fn invalid_command_reports_error_and_keeps_page() {
    let app = TestApp::spawn().await;
    seed(&app, 2).await;
    let mut socket = connect(&app, "").await;
    let first = next_view(&mut socket).await;

    socket
        .send(Message::Text(r#"{"action":"jump"}"#.to_string()))
        .await
        .unwrap();
    let reply = next_view(&mut socket).await;

    assert!(reply.error.is_some());
    assert_eq!(reply.page_number, 1);
    assert_eq!(reply.items, first.items);

    socket.close(None).await.unwrap();
    app.cleanup().await;
}

#[tokio::test]
async fn feed_requires_user() {
    let app = TestApp::spawn().await;
    let request = format!("{}/documents/feed", app.ws_address)
        .into_client_request()
        .unwrap();

    assert!(tokio_tungstenite::connect_async(request).await.is_err());

    app.cleanup().await;
}

#[tokio::test]
async fn feed_rejects_zero_page_size() {
    let app = TestApp::spawn().await;
    let mut request = format!("{}/documents/feed?page_size=0", app.ws_address)
        .into_client_request()
        .unwrap();
    request
        .headers_mut()
        .insert("X-User-ID", TEST_USER_ID.parse().unwrap());

    match tokio_tungstenite::connect_async(request).await {
        Err(WsError::Http(response)) => assert_eq!(response.status().as_u16(), 400),
        other => panic!("expected HTTP 400, got {:?}", other.map(|_| ())),
    }

    app.cleanup().await;
}

#[tokio::test]
async fn feed_rejects_oversized_page_size() {
    let app = TestApp::spawn().await;

    for page_size in ["101", "18446744073709551615"] {
        let mut request = format!("{}/documents/feed?page_size={}", app.ws_address, page_size)
            .into_client_request()
            .unwrap();
        request
            .headers_mut()
            .insert("X-User-ID", TEST_USER_ID.parse().unwrap());

        match tokio_tungstenite::connect_async(request).await {
            Err(WsError::Http(response)) => assert_eq!(response.status().as_u16(), 400),
            other => panic!("expected HTTP 400, got {:?}", other.map(|_| ())),
        }
    }
    assert_eq!(app.gateway.active_subscriptions(), 0);

    app.cleanup().await;
}
