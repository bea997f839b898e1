//! Integration tests: start the gateway on a free port, probe HTTP health,
//! and run one submit round-trip over WebSocket with zero stage delays.
//! The server tasks are left running when the tests end.

use futures_util::{SinkExt, StreamExt};
use lib::config::Config;
use lib::gateway;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

fn test_config(port: u16) -> Config {
    let mut config = Config::default();
    config.gateway.port = port;
    config.gateway.bind = "127.0.0.1".to_string();
    config.pipeline.classify_delay_ms = 0;
    config.pipeline.reply_delay_ms = 0;
    config.pipeline.escalate_delay_ms = 0;
    config
}

#[tokio::test]
async fn gateway_health_http_responds_with_running() {
    let port = free_port();
    let config = test_config(port);

    tokio::spawn(async move {
        let _ = gateway::run_gateway(config).await;
    });

    let url = format!("http://127.0.0.1:{}/health", port);
    let client = reqwest::Client::new();
    let mut last_err = None;
    for _ in 0..100 {
        match client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                let json: serde_json::Value = resp.json().await.expect("parse JSON");
                assert_eq!(json.get("runtime").and_then(|v| v.as_str()), Some("running"));
                assert_eq!(json.get("protocol").and_then(|v| v.as_u64()), Some(1));
                assert_eq!(json.get("port").and_then(|v| v.as_u64()), Some(port as u64));
                return;
            }
            Ok(_) => {}
            Err(e) => last_err = Some(e),
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    panic!(
        "GET {} did not return 200 with health JSON within 5s; last error: {:?}",
        url, last_err
    );
}

#[tokio::test]
async fn gateway_serves_the_chat_ui_at_root() {
    let port = free_port();
    let config = test_config(port);

    tokio::spawn(async move {
        let _ = gateway::run_gateway(config).await;
    });

    let url = format!("http://127.0.0.1:{}/", port);
    let client = reqwest::Client::new();
    for _ in 0..100 {
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                let body = resp.text().await.expect("body");
                assert!(body.contains("Multi-Agent Support Assistant"));
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("GET {} did not return the chat UI within 5s", url);
}

#[tokio::test]
async fn ws_submit_runs_the_pipeline_and_streams_stage_events() {
    let port = free_port();
    let config = test_config(port);

    tokio::spawn(async move {
        let _ = gateway::run_gateway(config).await;
    });

    // wait for the listener
    let ws_url = format!("ws://127.0.0.1:{}/ws", port);
    let mut ws = None;
    for _ in 0..100 {
        if let Ok((socket, _)) = tokio_tungstenite::connect_async(&ws_url).await {
            ws = Some(socket);
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let mut ws = ws.expect("websocket connect within 5s");

    let connect = serde_json::json!({
        "type": "req", "id": "1", "method": "connect",
        "params": { "client": { "id": "test" }, "maxProtocol": 1 }
    });
    ws.send(Message::Text(connect.to_string())).await.expect("send connect");

    let hello = next_response(&mut ws, "1", &mut Vec::new()).await;
    assert_eq!(hello.get("ok").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(
        hello
            .pointer("/payload/type")
            .and_then(|v| v.as_str()),
        Some("hello-ok")
    );

    let submit = serde_json::json!({
        "type": "req", "id": "2", "method": "submit",
        "params": { "message": "I need an URGENT refund" }
    });
    ws.send(Message::Text(submit.to_string())).await.expect("send submit");

    let mut stages: Vec<Option<String>> = Vec::new();
    let res = next_response(&mut ws, "2", &mut stages).await;
    assert_eq!(res.get("ok").and_then(|v| v.as_bool()), Some(true));

    let payload = res.get("payload").expect("payload");
    assert_eq!(
        payload.get("intent").and_then(|v| v.as_str()),
        Some("refund_request")
    );
    assert_eq!(payload.get("escalation").and_then(|v| v.as_bool()), Some(true));

    let messages = payload
        .get("messages")
        .and_then(|v| v.as_array())
        .expect("messages array");
    assert_eq!(messages.len(), 3);
    assert_eq!(
        messages[0].get("agent").and_then(|v| v.as_str()),
        Some("intent")
    );
    assert_eq!(
        messages[0].get("content").and_then(|v| v.as_str()),
        Some("Intent identified: refund request")
    );
    assert_eq!(
        messages[1].get("agent").and_then(|v| v.as_str()),
        Some("reply")
    );
    assert_eq!(
        messages[2].get("agent").and_then(|v| v.as_str()),
        Some("escalation")
    );

    // stage events observed before the response, in pipeline order
    assert_eq!(
        stages,
        vec![
            Some("intent".to_string()),
            Some("reply".to_string()),
            Some("escalation".to_string()),
            None
        ]
    );
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Read frames until the response with the given id; agent.active stages seen
/// on the way are appended to `stages`.
async fn next_response(
    ws: &mut WsStream,
    id: &str,
    stages: &mut Vec<Option<String>>,
) -> serde_json::Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("frame within 5s")
            .expect("stream open")
            .expect("frame ok");
        let Message::Text(text) = msg else { continue };
        let frame: serde_json::Value = serde_json::from_str(&text).expect("json frame");
        match frame.get("type").and_then(|v| v.as_str()) {
            Some("event") => {
                if frame.get("event").and_then(|v| v.as_str()) == Some("agent.active") {
                    let stage = frame
                        .pointer("/payload/agent")
                        .and_then(|v| v.as_str())
                        .map(|s| s.to_string());
                    stages.push(stage);
                }
            }
            Some("res") if frame.get("id").and_then(|v| v.as_str()) == Some(id) => {
                return frame;
            }
            _ => {}
        }
    }
}
