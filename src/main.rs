// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Headroom - local-first AI assistant for your terminal
//!
//! Entry point for the Headroom CLI application.

use clap::Parser;

use headroom::cli::{ChatArgs, Cli, Commands};
use headroom::config::Settings;
use headroom::error::Result;

#[path = "main/chat_runtime.rs"]
mod chat_runtime;
#[path = "main/cli_commands.rs"]
mod cli_commands;

use chat_runtime::initialize_chat_runtime;
use cli_commands::{run_ask, run_chat, run_config};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::WARN.into());

    // `-v` turns on session and retry diagnostics; `-vv` everything in the crate.
    let directives: &[&str] = match cli.verbose {
        0 => &[],
        1 => &[
            "headroom.chat.session=debug",
            "headroom.llm.retry=debug",
            "headroom.llm.factory=debug",
        ],
        _ => &["headroom=debug", "headroom.telemetry=info"],
    };
    for directive in directives {
        if let Ok(parsed) = directive.parse() {
            env_filter = env_filter.add_directive(parsed);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let settings_path = cli.config.clone().unwrap_or_else(Settings::default_path);
    let settings = Settings::load_from(&settings_path)?;
    Settings::ensure_directories()?;

    let working_dir = match &cli.directory {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()?,
    };

    let verbose = cli.verbose;
    match cli.command {
        None => {
            let args = ChatArgs::default();
            let runtime =
                initialize_chat_runtime(&args.model, &settings, &working_dir, verbose).await?;
            run_chat(runtime, args.prompt, verbose).await?;
        }
        Some(Commands::Chat(args)) => {
            let runtime =
                initialize_chat_runtime(&args.model, &settings, &working_dir, verbose).await?;
            run_chat(runtime, args.prompt, verbose).await?;
        }
        Some(Commands::Ask(args)) => {
            let runtime =
                initialize_chat_runtime(&args.model, &settings, &working_dir, verbose).await?;
            run_ask(runtime, args, verbose).await?;
        }
        Some(Commands::Config(args)) => run_config(settings, &settings_path, args)?,
    }

    Ok(())
}
