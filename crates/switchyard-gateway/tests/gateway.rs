//! End-to-end tests against a running gateway over real WebSocket and HTTP
//! clients.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use switchyard_core::tools::RemoteToolDefinition;
use switchyard_gateway::bus::{MemoryBus, MessageBus};
use switchyard_gateway::{start, GatewayConfig, GatewayState, ServerHandle};
use switchyard_llm::MockProvider;
use switchyard_tools::mock::ScriptedRemoteClient;
use switchyard_tools::{register_builtins, ToolRegistry};

const TIMEOUT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(300);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

fn test_config() -> GatewayConfig {
    GatewayConfig {
        port: 0,
        bus_poll_interval_ms: 50,
        bus_reconnect_backoff_ms: 50,
        ..Default::default()
    }
}

async fn boot_with_bus(bus: Arc<dyn MessageBus>) -> (ServerHandle, Arc<GatewayState>) {
    boot_with(test_config(), bus).await
}

async fn boot_with(config: GatewayConfig, bus: Arc<dyn MessageBus>) -> (ServerHandle, Arc<GatewayState>) {
    let remote = ScriptedRemoteClient::new().with_server(
        "math",
        vec![RemoteToolDefinition {
            name: "add".into(),
            description: Some("Add two numbers".into()),
            input_schema: json!({"type": "object", "properties": {"a": {"type": "integer"}}}),
        }],
    );
    let tools = ToolRegistry::with_remote(Arc::new(remote));
    register_builtins(&tools).unwrap();

    let state = Arc::new(GatewayState::new(
        config,
        bus,
        Arc::new(tools),
        Arc::new(MockProvider::echo()),
    ));
    let handle = start(Arc::clone(&state)).await.unwrap();
    // Let the relay subscribe before any publish.
    tokio::time::sleep(Duration::from_millis(50)).await;
    (handle, state)
}

async fn boot() -> (ServerHandle, Arc<GatewayState>) {
    boot_with_bus(Arc::new(MemoryBus::new())).await
}

async fn connect(url: &str) -> WsStream {
    let (ws, _) = connect_async(url).await.unwrap();
    ws
}

async fn send_text(ws: &mut WsStream, text: &str) {
    ws.send(Message::text(text.to_string())).await.unwrap();
}

/// Read the next text message as JSON.
async fn read_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timeout waiting for message")
            .expect("stream closed")
            .expect("ws error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Next text message within `QUIET`, if any.
async fn try_read_json(ws: &mut WsStream) -> Option<Value> {
    loop {
        match timeout(QUIET, ws.next()).await {
            Err(_) => return None,
            Ok(Some(Ok(Message::Text(text)))) => return Some(serde_json::from_str(&text).unwrap()),
            Ok(Some(Ok(_))) => continue,
            Ok(_) => return None,
        }
    }
}

/// Send a request and read until the reply with the same id arrives.
/// Other frames seen on the way are returned too.
async fn rpc_call(ws: &mut WsStream, id: &str, method: &str, params: Option<Value>) -> (Value, Vec<Value>) {
    let mut req = json!({"jsonrpc": "2.0", "id": id, "method": method});
    if let Some(p) = params {
        req["params"] = p;
    }
    send_text(ws, &req.to_string()).await;

    let mut others = Vec::new();
    loop {
        let parsed = read_json(ws).await;
        if parsed.get("id").and_then(Value::as_str) == Some(id) {
            return (parsed, others);
        }
        others.push(parsed);
    }
}

async fn subscribe(ws: &mut WsStream, topic: &str) {
    let (resp, _) = rpc_call(ws, "sub", "topics/subscribe", Some(json!({"topic": topic}))).await;
    assert_eq!(resp["result"]["ok"], true, "subscribe failed: {resp}");
}

/// Wait for a notification on `topic`, skipping unrelated frames.
async fn expect_notification(ws: &mut WsStream, seen: Vec<Value>, topic: &str) -> Value {
    for frame in seen {
        if frame["type"] == "notification" && frame["topic"] == topic {
            return frame;
        }
    }
    loop {
        let frame = read_json(ws).await;
        if frame["type"] == "notification" && frame["topic"] == topic {
            return frame;
        }
    }
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    while !cond() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ids_are_preserved() {
    let (server, _state) = boot().await;
    let mut ws = connect(&server.ws_url()).await;

    send_text(&mut ws, r#"{"jsonrpc":"2.0","method":"ping","id":"abc"}"#).await;
    assert_eq!(read_json(&mut ws).await, json!({"jsonrpc": "2.0", "id": "abc", "result": "pong"}));

    send_text(&mut ws, r#"{"jsonrpc":"2.0","method":"ping","id":17}"#).await;
    assert_eq!(read_json(&mut ws).await["id"], json!(17));

    send_text(&mut ws, r#"{"jsonrpc":"2.0","method":"hello","id":null}"#).await;
    let resp = read_json(&mut ws).await;
    assert!(resp["id"].is_null());
    assert_eq!(resp["result"], "hello");

    server.shutdown(None).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_request_is_answered_with_a_tiny_send_queue() {
    let config = GatewayConfig {
        send_queue_size: 1,
        ..test_config()
    };
    let (server, _state) = boot_with(config, Arc::new(MemoryBus::new())).await;
    let mut ws = connect(&server.ws_url()).await;

    for id in 0..50 {
        send_text(&mut ws, &format!(r#"{{"jsonrpc":"2.0","method":"ping","id":{id}}}"#)).await;
    }
    let mut ids = Vec::new();
    for _ in 0..50 {
        let resp = read_json(&mut ws).await;
        assert_eq!(resp["result"], "pong");
        ids.push(resp["id"].as_i64().unwrap());
    }
    assert_eq!(ids, (0..50).collect::<Vec<i64>>());

    server.shutdown(None).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn protocol_errors() {
    let (server, _state) = boot().await;
    let mut ws = connect(&server.ws_url()).await;

    let (resp, _) = rpc_call(&mut ws, "e1", "echo", Some(json!({"x": 1}))).await;
    assert_eq!(resp["result"], json!({"x": 1}));

    let (resp, _) = rpc_call(&mut ws, "m1", "does/not/exist", None).await;
    assert_eq!(resp["error"]["code"], -32601);

    send_text(&mut ws, "{not json").await;
    let resp = read_json(&mut ws).await;
    assert_eq!(resp["error"]["code"], -32700);
    assert!(resp["id"].is_null());

    // A notification is never answered, so the next frame is the ping reply.
    send_text(&mut ws, r#"{"jsonrpc":"2.0","method":"ping"}"#).await;
    let (resp, others) = rpc_call(&mut ws, "p1", "ping", None).await;
    assert_eq!(resp["result"], "pong");
    assert!(others.is_empty());

    server.shutdown(None).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn mixed_batch_is_answered_as_one_array() {
    let (server, _state) = boot().await;
    let mut ws = connect(&server.ws_url()).await;

    send_text(
        &mut ws,
        r#"[{"jsonrpc":"2.0","method":"ping","id":1},
            {"jsonrpc":"2.0","method":"nope","id":2},
            {"jsonrpc":"2.0","method":"hello"},
            {"jsonrpc":"2.0","method":"echo","params":{"k":"v"},"id":3}]"#,
    )
    .await;
    let replies = read_json(&mut ws).await;
    let replies = replies.as_array().expect("batch reply is an array");
    assert_eq!(replies.len(), 3);
    assert_eq!(replies[0]["result"], "pong");
    assert_eq!(replies[1]["error"]["code"], -32601);
    assert_eq!(replies[2]["result"], json!({"k": "v"}));

    server.shutdown(None).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn subscribe_then_publish_delivers_exactly_once() {
    let (server, _state) = boot().await;
    let mut ws = connect(&server.ws_url()).await;
    subscribe(&mut ws, "orders").await;

    let (resp, seen) = rpc_call(
        &mut ws,
        "pub",
        "topics/publish",
        Some(json!({"topic": "orders", "message": {"id": 1}})),
    )
    .await;
    assert_eq!(resp["result"], json!({"ok": true, "published": "topic:orders"}));

    let note = expect_notification(&mut ws, seen, "topic:orders").await;
    assert_eq!(
        note,
        json!({"type": "notification", "topic": "topic:orders", "payload": {"id": 1}})
    );
    assert!(try_read_json(&mut ws).await.is_none(), "duplicate delivery");

    server.shutdown(None).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unsubscribe_stops_delivery() {
    let (server, _state) = boot().await;
    let mut ws = connect(&server.ws_url()).await;
    subscribe(&mut ws, "orders").await;

    let (resp, _) = rpc_call(&mut ws, "u", "topics/unsubscribe", Some(json!({"topic": "orders"}))).await;
    assert_eq!(resp["result"], json!({"ok": true, "unsubscribed": "topic:orders"}));

    rpc_call(
        &mut ws,
        "pub",
        "topics/publish",
        Some(json!({"topic": "orders", "message": "late"})),
    )
    .await;
    assert!(try_read_json(&mut ws).await.is_none());

    server.shutdown(None).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn disconnect_clears_subscriptions() {
    let (server, state) = boot().await;
    let mut ws = connect(&server.ws_url()).await;
    subscribe(&mut ws, "orders").await;
    subscribe(&mut ws, "shipping").await;
    assert_eq!(state.topics.topic_count(), 2);
    assert_eq!(state.connections.count(), 1);

    ws.close(None).await.unwrap();
    drop(ws);

    wait_until(|| state.topics.topic_count() == 0 && state.connections.count() == 0).await;
    server.shutdown(None).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn orders_and_shipping() {
    let (server, _state) = boot().await;
    let url = server.ws_url();
    let mut a = connect(&url).await;
    let mut b = connect(&url).await;
    let mut c = connect(&url).await;

    subscribe(&mut a, "orders").await;
    subscribe(&mut b, "shipping").await;
    subscribe(&mut c, "orders").await;
    subscribe(&mut c, "shipping").await;

    let (_, seen_b) = rpc_call(
        &mut b,
        "p1",
        "topics/publish",
        Some(json!({"topic": "orders", "message": {"order": 1}})),
    )
    .await;
    assert!(seen_b.is_empty());

    let note = expect_notification(&mut a, Vec::new(), "topic:orders").await;
    assert_eq!(note["payload"], json!({"order": 1}));
    let note = expect_notification(&mut c, Vec::new(), "topic:orders").await;
    assert_eq!(note["payload"], json!({"order": 1}));
    assert!(try_read_json(&mut b).await.is_none());

    let (_, seen_a) = rpc_call(
        &mut a,
        "p2",
        "topics/publish",
        Some(json!({"topic": "topic:shipping", "message": "shipped"})),
    )
    .await;
    assert!(seen_a.is_empty());

    let note = expect_notification(&mut b, Vec::new(), "topic:shipping").await;
    assert_eq!(note["payload"], "shipped");
    let note = expect_notification(&mut c, Vec::new(), "topic:shipping").await;
    assert_eq!(note["payload"], "shipped");
    assert!(try_read_json(&mut a).await.is_none());
    assert!(try_read_json(&mut c).await.is_none());

    server.shutdown(None).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn publishes_cross_gateways_on_a_shared_bus() {
    let bus = Arc::new(MemoryBus::new());
    let (left, _) = boot_with_bus(bus.clone()).await;
    let (right, _) = boot_with_bus(bus).await;

    let mut listener = connect(&left.ws_url()).await;
    subscribe(&mut listener, "events").await;

    let mut publisher = connect(&right.ws_url()).await;
    rpc_call(
        &mut publisher,
        "p",
        "topics/publish",
        Some(json!({"topic": "events", "message": [1, 2, 3]})),
    )
    .await;

    let note = expect_notification(&mut listener, Vec::new(), "topic:events").await;
    assert_eq!(note["payload"], json!([1, 2, 3]));

    left.shutdown(None).await;
    right.shutdown(None).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn tools_over_rpc() {
    let (server, _state) = boot().await;
    let mut ws = connect(&server.ws_url()).await;

    let (resp, _) = rpc_call(
        &mut ws,
        "t1",
        "tools/call",
        Some(json!({"name": "echo", "arguments": {"message": "hi"}})),
    )
    .await;
    assert_eq!(resp["result"], json!({"ok": true, "result": "Echo: hi"}));

    let (resp, _) = rpc_call(&mut ws, "t2", "tools/call", Some(json!({"name": "missing"}))).await;
    assert_eq!(resp["error"]["code"], -32602);

    let (resp, _) = rpc_call(&mut ws, "t3", "tools/discover", Some(json!({"server": "math"}))).await;
    assert_eq!(resp["result"]["registered"], json!(["math_add"]));

    let (resp, _) = rpc_call(
        &mut ws,
        "t4",
        "tools/call",
        Some(json!({"name": "math_add", "arguments": {"a": 1}})),
    )
    .await;
    assert_eq!(resp["result"]["ok"], true);
    assert_eq!(resp["result"]["result"]["tool"], "add");

    let (resp, _) = rpc_call(&mut ws, "t5", "tools/list", Some(json!({"format": "nested"}))).await;
    let names: Vec<&str> = resp["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["function"]["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"math_add"));
    assert!(names.contains(&"greet"));

    server.shutdown(None).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn completion_and_blocking_methods() {
    let (server, _state) = boot().await;
    let mut ws = connect(&server.ws_url()).await;

    let (resp, _) = rpc_call(&mut ws, "ai", "ai/completion", Some(json!({"prompt": "hi"}))).await;
    assert_eq!(resp["result"]["text"], "echo: hi");

    let (resp, _) = rpc_call(&mut ws, "s", "sleep", Some(json!({"timeout": 0.05}))).await;
    assert_eq!(resp["result"]["status"], "completed");

    let (resp, _) = rpc_call(&mut ws, "l", "loop", Some(json!({"count": 2, "interval": 0}))).await;
    assert_eq!(resp["result"]["loops"], 2);

    server.shutdown(None).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn http_side_channels() {
    let (server, _state) = boot().await;
    let http = reqwest::Client::new();

    let mut a = connect(&server.ws_url()).await;
    let mut b = connect(&server.ws_url()).await;
    subscribe(&mut a, "alerts").await;
    rpc_call(&mut b, "warm", "ping", None).await;

    let health: Value = http
        .get(server.http_url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["connections"], 2);
    assert_eq!(health["topics"], 1);
    assert!(health["tools"].as_u64().unwrap() >= 8);

    let resp: Value = http
        .post(server.http_url("/ws/broadcast"))
        .query(&[("message", "maintenance")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resp, json!({"message": "Broadcasted: maintenance", "delivered": 2}));
    for ws in [&mut a, &mut b] {
        assert_eq!(
            read_json(ws).await,
            json!({"type": "broadcast", "message": "maintenance"})
        );
    }

    let resp = http
        .post(server.http_url("/ps/publish/alerts"))
        .json(&json!({"level": "high"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body,
        json!({"status": "success", "topic": "topic:alerts", "payload": {"level": "high"}})
    );
    let note = expect_notification(&mut a, Vec::new(), "topic:alerts").await;
    assert_eq!(note["payload"], json!({"level": "high"}));

    let tools: Value = http
        .get(server.http_url("/api/v1/tools"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let tools = tools.as_array().unwrap();
    assert!(tools.iter().all(|t| t["type"] == "function"));
    assert!(tools.iter().any(|t| t["name"] == "execute_command"));

    server.shutdown(None).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shutdown_closes_sockets() {
    let (server, state) = boot().await;
    let mut ws = connect(&server.ws_url()).await;
    rpc_call(&mut ws, "p", "ping", None).await;

    server.shutdown(Some(Duration::from_secs(2))).await;
    assert!(state.shutdown.is_cancelled());

    let closed = timeout(TIMEOUT, async {
        loop {
            match ws.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok());
}
