use clap::{Parser, Subcommand};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser)]
#[command(name = "deskcrew")]
#[command(about = "Deskcrew CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config file.
    Init {
        /// Config file path (default: DESKCREW_CONFIG_PATH or ~/.deskcrew/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the gateway (HTTP + WebSocket, serves the browser chat UI).
    Gateway {
        /// Config file path (default: DESKCREW_CONFIG_PATH or ~/.deskcrew/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// WebSocket and HTTP port (default from config or 15880)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Chat with the support assistant via the gateway (interactive).
    Chat {
        /// Config file path (default: DESKCREW_CONFIG_PATH or ~/.deskcrew/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Optional existing session id to continue.
        #[arg(long, value_name = "ID")]
        session: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("deskcrew {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Gateway { config, port }) => {
            if let Err(e) = run_gateway(config, port).await {
                log::error!("gateway failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Chat { config, session }) => {
            if let Err(e) = run_chat(config, session).await {
                log::error!("chat failed: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(lib::config::default_config_path);
    let dir = lib::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_gateway(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, _path) = lib::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!(
        "starting gateway on {}:{}",
        config.gateway.bind,
        config.gateway.port
    );
    println!(
        "chat UI: http://{}:{}/",
        config.gateway.bind, config.gateway.port
    );
    lib::gateway::run_gateway(config).await
}

/// Payload of a successful submit response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitPayload {
    session_id: String,
    #[serde(default)]
    escalation: bool,
    #[serde(default)]
    messages: Vec<MessagePayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagePayload {
    role: String,
    content: String,
    #[serde(default)]
    agent: Option<String>,
}

async fn run_chat(
    config_path: Option<std::path::PathBuf>,
    session: Option<String>,
) -> anyhow::Result<()> {
    use std::io::{self, Write};

    let (config, _) = lib::config::load_config(config_path)?;
    let bind = config.gateway.bind.trim().to_string();
    let port = config.gateway.port;
    let token = lib::config::resolve_gateway_token(&config);
    let ws_url = format!("ws://{}:{}/ws", bind, port);

    let (mut ws, _) = tokio_tungstenite::connect_async(&ws_url)
        .await
        .map_err(|e| anyhow::anyhow!("connecting to {}: {}", ws_url, e))?;

    let mut connect_params = serde_json::json!({
        "client": { "id": "deskcrew-cli" },
        "maxProtocol": 1
    });
    if let Some(ref t) = token {
        connect_params["auth"] = serde_json::json!({ "token": t });
    }
    let connect_req = serde_json::json!({
        "type": "req",
        "id": "connect",
        "method": "connect",
        "params": connect_params
    });
    ws.send(Message::Text(connect_req.to_string())).await?;
    wait_for_response(&mut ws, "connect", |_| {}).await?;

    let mut current_session = session;
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut request_id: u64 = 0;

    println!("connected to {} (/exit to quit)", ws_url);
    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("/exit") || input.eq_ignore_ascii_case("/quit") {
            break;
        }

        request_id += 1;
        let id = format!("submit-{}", request_id);
        let mut params = serde_json::json!({ "message": input });
        if let Some(ref sid) = current_session {
            params["sessionId"] = serde_json::Value::String(sid.clone());
        }
        let req = serde_json::json!({
            "type": "req",
            "id": id,
            "method": "submit",
            "params": params
        });
        ws.send(Message::Text(req.to_string())).await?;

        // While the pipeline runs, agent.active events tell us which stage
        // is working; print them as progress lines.
        let payload = wait_for_response(&mut ws, &id, |event| {
            if event.get("event").and_then(|v| v.as_str()) == Some("agent.active") {
                if let Some(agent) = event
                    .get("payload")
                    .and_then(|p| p.get("agent"))
                    .and_then(|a| a.as_str())
                {
                    println!("  … {} agent working", agent);
                }
            }
        })
        .await;

        match payload {
            Ok(payload) => {
                let parsed: SubmitPayload = match serde_json::from_value(payload) {
                    Ok(p) => p,
                    Err(e) => {
                        eprintln!("chat error: bad submit payload: {}", e);
                        continue;
                    }
                };
                current_session = Some(parsed.session_id);
                for msg in &parsed.messages {
                    let tag = msg.agent.as_deref().unwrap_or(msg.role.as_str());
                    println!("[{}] {}", tag, msg.content.trim());
                }
                if parsed.escalation {
                    println!("(flagged for human follow-up)");
                }
            }
            Err(e) => {
                eprintln!("chat error: {}", e);
            }
        }
    }

    Ok(())
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Read frames until a response with the given id arrives; events seen on the
/// way are handed to `on_event`. Returns the payload or the error string.
async fn wait_for_response(
    ws: &mut WsStream,
    id: &str,
    mut on_event: impl FnMut(&serde_json::Value),
) -> anyhow::Result<serde_json::Value> {
    while let Some(msg) = ws.next().await {
        let msg = msg?;
        let Message::Text(text) = msg else { continue };
        let Ok(frame) = serde_json::from_str::<serde_json::Value>(&text) else {
            continue;
        };
        match frame.get("type").and_then(|v| v.as_str()) {
            Some("event") => on_event(&frame),
            Some("res") if frame.get("id").and_then(|v| v.as_str()) == Some(id) => {
                if frame.get("ok").and_then(|v| v.as_bool()).unwrap_or(false) {
                    return Ok(frame.get("payload").cloned().unwrap_or_default());
                }
                let err = frame
                    .get("error")
                    .and_then(|v| v.as_str())
                    .unwrap_or("request failed");
                anyhow::bail!("{}", err);
            }
            _ => {}
        }
    }
    anyhow::bail!("connection closed before response to {}", id)
}
