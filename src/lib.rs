// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Headroom - local-first AI assistant for the terminal.
//!
//! This crate exposes the runtime used by the `headroom` CLI (`src/main.rs`).
//!
//! Architecture highlights:
//! - `chat`: conversation session, history curation, display formatting
//! - `llm`: content generator abstraction, Ollama and Gemini backends, retry
//! - `context`: hierarchical `HEADROOM.md` discovery
//! - `telemetry`: request/response/error events
//! - `config`: settings file and environment overrides

pub mod chat;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod llm;
pub mod telemetry;

pub use error::{HeadroomError, Result};
