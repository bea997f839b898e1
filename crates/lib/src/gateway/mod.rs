//! Gateway: HTTP + WebSocket control plane, plus the embedded browser UI.
//!
//! Single port serves the chat UI, a health probe, and WebSocket. Protocol:
//! first frame must be `connect`; then requests (req/res) and events.

mod protocol;
mod server;

pub use protocol::{ConnectParams, HelloOk, HistoryParams, SubmitParams, WsRequest, WsResponse};
pub use server::run_gateway;
