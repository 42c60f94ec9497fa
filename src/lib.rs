//! Teeproxy is a transparent single-upstream HTTP reverse proxy that
//! records every exchange.
//!
//! Every incoming request is forwarded once to the configured upstream
//! origin with method, path, query, headers, and body preserved (only
//! `host` is rewritten). The upstream response is streamed back to the
//! caller chunk by chunk while a copy is accumulated and, once the
//! exchange resolves, handed to a background writer that appends it as a
//! JSON line to a rotating capture log. Capture never delays or alters
//! the caller's response.
//!
//! # Architecture
//!
//! - [`cli`] -- Command-line argument parsing with clap derive macros.
//! - [`cmd`] -- Subcommand dispatch and execution (run, health).
//! - [`config`] -- Runtime configuration built from flags and environment.
//! - [`capture`] -- Capture records, the asynchronous sink, and the
//!   rotating log writer.
//! - [`error`] -- Unified error types using `thiserror`, including the
//!   timeout / transport / unexpected failure taxonomy.
//! - [`health`] -- Optional local health endpoint returning runtime counters.
//! - [`logging`] -- Structured tracing setup with JSON and pretty-print output.
//! - [`proxy`] -- Request forwarding, response relay, and failure mapping.
//! - [`server`] -- Axum server setup, shared application state, and
//!   graceful shutdown.
//! - [`upstream`] -- The pooled upstream HTTP client and its lifecycle.

// Binary crate: public functions are internal, not consumed by external users.
#![allow(clippy::missing_errors_doc)]

pub mod capture;
pub mod cli;
pub mod cmd;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod proxy;
pub mod server;
pub mod upstream;
