use super::*;

use std::{net::SocketAddr, time::Duration};

use tokio::net::TcpListener;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

use chessroom_domain::{GameMode, GameStatus, Seat, SessionSeed, TimeControl};

use crate::config::RoomConfig;
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::ports::ClockPort;
use crate::infrastructure::sqlite::SqliteGameStore;
use crate::session::Hub;

pub(crate) type WsClient =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

pub(crate) struct TestEnv {
    pub(crate) app: Arc<App>,
    pub(crate) store: Arc<SqliteGameStore>,
}

/// In-memory store with game `g1` (alice vs bob, 10+0, active) seeded.
pub(crate) async fn test_env(transport: TransportConfig) -> TestEnv {
    let clock: Arc<dyn ClockPort> = Arc::new(SystemClock::new());
    let store = Arc::new(SqliteGameStore::in_memory(clock.clone()).await.unwrap());
    store
        .create_game(&SessionSeed::new(
            GameId::parse("g1").unwrap(),
            Seat::player(UserId::new(1), "alice"),
            Seat::player(UserId::new(2), "bob"),
            GameStatus::Active,
            GameMode::Rapid,
            TimeControl::default(),
        ))
        .await
        .unwrap();

    let hub = Hub::new(store.clone(), None, clock, RoomConfig::default());
    let app = Arc::new(App::new(Arc::new(hub), store.clone(), transport));
    TestEnv { app, store }
}

pub(crate) async fn spawn_ws_server(app: Arc<App>) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let router = crate::api::http::routes().with_state(app);

    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (addr, handle)
}

pub(crate) fn ws_url(addr: SocketAddr, game_id: &str, token: Option<&str>) -> String {
    match token {
        Some(token) => format!("ws://{}/api/v1/game/ws/{}?token={}", addr, game_id, token),
        None => format!("ws://{}/api/v1/game/ws/{}", addr, game_id),
    }
}

pub(crate) async fn ws_connect(addr: SocketAddr, game_id: &str, token: Option<&str>) -> WsClient {
    let (ws, _resp) = connect_async(ws_url(addr, game_id, token)).await.unwrap();
    ws
}

pub(crate) async fn ws_send_text(ws: &mut WsClient, text: &str) {
    ws.send(WsMessage::Text(text.to_string().into())).await.unwrap();
}

pub(crate) async fn ws_send_json(ws: &mut WsClient, value: serde_json::Value) {
    ws_send_text(ws, &value.to_string()).await;
}

pub(crate) async fn ws_recv_server(ws: &mut WsClient) -> ServerMessage {
    loop {
        let msg = ws.next().await.unwrap().unwrap();
        match msg {
            WsMessage::Text(text) => {
                return serde_json::from_str::<ServerMessage>(&text).unwrap();
            }
            WsMessage::Close(_) => panic!("connection closed by server"),
            _ => {}
        }
    }
}

pub(crate) async fn ws_expect_message<F>(
    ws: &mut WsClient,
    timeout: Duration,
    mut predicate: F,
) -> ServerMessage
where
    F: FnMut(&ServerMessage) -> bool,
{
    tokio::time::timeout(timeout, async {
        loop {
            let msg = ws_recv_server(ws).await;
            if predicate(&msg) {
                return msg;
            }
        }
    })
    .await
    .unwrap()
}

pub(crate) async fn ws_expect_no_message_matching<F>(
    ws: &mut WsClient,
    timeout: Duration,
    mut predicate: F,
) where
    F: FnMut(&ServerMessage) -> bool,
{
    let result = tokio::time::timeout(timeout, async {
        loop {
            let msg = ws_recv_server(ws).await;
            if predicate(&msg) {
                panic!("unexpected message: {:?}", msg);
            }
        }
    })
    .await;

    // We only succeed if we timed out without seeing a matching message.
    assert!(result.is_err());
}

/// Wait for the server to end the connection (close frame, error or EOF).
pub(crate) async fn ws_expect_closed(ws: &mut WsClient, timeout: Duration) {
    tokio::time::timeout(timeout, async {
        loop {
            match ws.next().await {
                None | Some(Err(_)) | Some(Ok(WsMessage::Close(_))) => return,
                Some(Ok(_)) => {}
            }
        }
    })
    .await
    .unwrap()
}
