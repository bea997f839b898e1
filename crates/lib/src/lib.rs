//! Deskcrew core library — pipeline, sessions, config, and gateway
//! used by the CLI and the browser chat UI.

pub mod config;
pub mod gateway;
pub mod init;
pub mod pipeline;
pub mod session;
