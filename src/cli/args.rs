// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! CLI argument definitions using Clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::llm::factory::AuthType;

/// Headroom - local-first AI assistant for your terminal
#[derive(Parser, Debug)]
#[command(name = "headroom")]
#[command(version, about = "Local-first AI assistant for your terminal")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Working directory (defaults to current)
    #[arg(short = 'C', long, global = true)]
    pub directory: Option<PathBuf>,

    /// Settings file path (defaults to ~/.headroom/settings.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start interactive chat session (default when no command given)
    Chat(ChatArgs),

    /// Ask a single question (non-interactive)
    Ask(AskArgs),

    /// Show or change the stored defaults
    Config(ConfigArgs),
}

/// Backend selection shared by all commands
#[derive(clap::Args, Debug, Default, Clone)]
pub struct ModelArgs {
    /// Model to use (e.g. ollama/mistral, gemini-2.0-flash)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Backend to use (gemini-api-key, vertex-ai, ollama)
    #[arg(short = 'a', long)]
    pub auth_type: Option<AuthType>,

    /// Sampling temperature
    #[arg(short, long)]
    pub temperature: Option<f32>,

    /// Disable streaming output
    #[arg(long)]
    pub no_stream: bool,
}

/// Arguments for the chat subcommand
#[derive(clap::Args, Debug, Default)]
pub struct ChatArgs {
    /// Initial prompt (optional)
    pub prompt: Option<String>,

    #[command(flatten)]
    pub model: ModelArgs,
}

/// Arguments for the ask subcommand
#[derive(clap::Args, Debug)]
pub struct AskArgs {
    /// The question to ask
    pub prompt: Option<String>,

    #[command(flatten)]
    pub model: ModelArgs,

    /// Include file contents in the prompt
    #[arg(short, long, num_args = 1..)]
    pub file: Vec<PathBuf>,

    /// Read prompt from stdin
    #[arg(long)]
    pub stdin: bool,
}

/// Arguments for the config subcommand; with no flags the current defaults
/// are printed
#[derive(clap::Args, Debug, Default)]
pub struct ConfigArgs {
    /// Default model
    #[arg(short, long)]
    pub model: Option<String>,

    /// Default backend (gemini-api-key, vertex-ai, ollama)
    #[arg(short = 'a', long)]
    pub auth_type: Option<AuthType>,

    /// Default sampling temperature
    #[arg(short, long)]
    pub temperature: Option<f32>,
}
