//! Event bus bridge over a real WebSocket client.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use service_gateway::config::AddressRule;
use service_gateway::GatewayConfig;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

mod common;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn portfolio_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.bridge.outbound = vec![
        AddressRule::Exact("market".into()),
        AddressRule::Exact("circuit-breaker".into()),
    ];
    config.bridge.inbound = vec![AddressRule::Exact("service.portfolio".into())];
    config
}

async fn connect(gateway: &common::TestGateway) -> Client {
    let (ws, _) = connect_async(gateway.ws_url("/eventbus/websocket"))
        .await
        .expect("Bridge unreachable");
    ws
}

async fn send(ws: &mut Client, frame: Value) {
    ws.send(Message::text(frame.to_string())).await.unwrap();
}

async fn recv(ws: &mut Client) -> Value {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("No frame within 2s")
            .expect("Stream ended")
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Round-trip a ping so every earlier frame has been processed.
async fn sync(ws: &mut Client) {
    send(ws, json!({"type": "ping"})).await;
    assert_eq!(recv(ws).await, json!({"type": "pong"}));
}

#[tokio::test]
async fn test_outbound_filtering() {
    let gateway = common::start_gateway(portfolio_config()).await;
    let mut ws = connect(&gateway).await;

    send(&mut ws, json!({"type": "register", "address": "market"})).await;
    send(&mut ws, json!({"type": "register", "address": "portfolio"})).await;
    assert_eq!(
        recv(&mut ws).await,
        json!({"type": "err", "address": "portfolio", "message": "access_denied"})
    );
    sync(&mut ws).await;

    gateway.state.bus.publish("portfolio", json!({"secret": true}));
    gateway.state.bus.publish("market", json!({"price": 101}));

    assert_eq!(
        recv(&mut ws).await,
        json!({"type": "rec", "address": "market", "body": {"price": 101}})
    );
}

#[tokio::test]
async fn test_inbound_filtering() {
    let gateway = common::start_gateway(portfolio_config()).await;
    let mut portfolio = gateway.state.bus.consumer("service.portfolio");
    let mut market = gateway.state.bus.consumer("market");
    let mut ws = connect(&gateway).await;

    send(&mut ws, json!({"type": "publish", "address": "market", "body": {"forged": 1}})).await;
    assert_eq!(
        recv(&mut ws).await,
        json!({"type": "err", "address": "market", "message": "access_denied"})
    );

    send(&mut ws, json!({"type": "send", "address": "service.portfolio", "body": {"buy": "ACME"}})).await;
    let message = tokio::time::timeout(Duration::from_secs(2), portfolio.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.body, json!({"buy": "ACME"}));

    let forged = tokio::time::timeout(Duration::from_millis(100), market.recv()).await;
    assert!(forged.is_err(), "denied message reached the bus");
}

#[tokio::test]
async fn test_invalid_frames() {
    let gateway = common::start_gateway(portfolio_config()).await;
    let mut ws = connect(&gateway).await;

    ws.send(Message::text("{not json")).await.unwrap();
    assert_eq!(recv(&mut ws).await, json!({"type": "err", "message": "invalid_frame"}));

    ws.send(Message::binary(vec![1u8, 2, 3])).await.unwrap();
    assert_eq!(recv(&mut ws).await, json!({"type": "err", "message": "invalid_frame"}));

    // The session survives bad frames.
    sync(&mut ws).await;
}

#[tokio::test]
async fn test_disconnect_removes_session() {
    let gateway = common::start_gateway(portfolio_config()).await;
    let mut ws = connect(&gateway).await;
    send(&mut ws, json!({"type": "register", "address": "market"})).await;
    sync(&mut ws).await;

    let bridge = gateway.state.bridge.clone();
    assert_eq!(bridge.session_count(), 1);
    assert_eq!(bridge.sessions()[0].subscriptions, vec!["market".to_string()]);

    ws.close(None).await.unwrap();
    assert!(common::eventually(Duration::from_secs(2), || bridge.session_count() == 0).await);

    // Publishing to a former subscriber's address is harmless.
    gateway.state.bus.publish("market", json!(1));
    let mut other = connect(&gateway).await;
    sync(&mut other).await;
}

#[tokio::test]
async fn test_breaker_status_reaches_permitted_clients() {
    let mut config = portfolio_config();
    config.breaker.max_failures = 1;
    common::with_audit_service(&mut config, common::unused_addr().await);
    let gateway = common::start_gateway(config).await;

    let mut ws = connect(&gateway).await;
    send(&mut ws, json!({"type": "register", "address": "circuit-breaker"})).await;
    sync(&mut ws).await;

    let res = common::http_client().get(gateway.url("/operations")).send().await.unwrap();
    assert_eq!(res.status(), 200);

    assert_eq!(
        recv(&mut ws).await,
        json!({
            "type": "rec",
            "address": "circuit-breaker",
            "body": {"name": "http-breaker", "state": "OPEN", "failureCount": 1}
        })
    );
}

#[tokio::test]
async fn test_shutdown_closes_sessions() {
    let gateway = common::start_gateway(portfolio_config()).await;
    let mut ws = connect(&gateway).await;
    sync(&mut ws).await;

    gateway.shutdown.trigger();
    let stopped = tokio::time::timeout(Duration::from_secs(5), gateway.handle).await;
    assert!(matches!(stopped, Ok(Ok(Ok(())))));

    // The client observes the end of the stream.
    let end = tokio::time::timeout(Duration::from_secs(2), async {
        while let Some(Ok(message)) = ws.next().await {
            if message.is_close() {
                break;
            }
        }
    })
    .await;
    assert!(end.is_ok());
}
