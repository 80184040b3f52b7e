// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::io;
use std::path::Path;
use std::sync::Arc;

use crossterm::{
    style::{Color, ResetColor, SetForegroundColor},
    ExecutableCommand,
};

use headroom::chat::ChatSession;
use headroom::cli::ModelArgs;
use headroom::config::Settings;
use headroom::context::{ContextSource, HierarchicalMemory};
use headroom::error::Result;
use headroom::llm::factory::{
    create_content_generator, create_content_generator_config, AuthType,
};
use headroom::llm::providers::OllamaGenerator;
use headroom::llm::retry::RetryConfig;
use headroom::llm::GenerationConfig;
use headroom::telemetry::{persistent_user_id, LogTelemetry};

/// Everything a chat or ask command needs
pub(super) struct ChatRuntime {
    pub session: ChatSession,
    pub auth_type: AuthType,
    pub context_files: usize,
    pub stream: bool,
}

/// Resolve the backend, load context files, and build the session.
pub(super) async fn initialize_chat_runtime(
    args: &ModelArgs,
    settings: &Settings,
    working_dir: &Path,
    verbose: u8,
) -> Result<ChatRuntime> {
    let auth_type = args.auth_type.unwrap_or(settings.defaults.auth_type);
    let config = create_content_generator_config(args.model.as_deref(), auth_type, settings);

    if auth_type == AuthType::Ollama {
        check_ollama(settings).await?;
    }

    let generator = create_content_generator(&config)?;

    let memory = HierarchicalMemory::from_settings(&settings.context).load(working_dir)?;
    if verbose > 0 {
        eprintln!(
            "[verbose] Loaded {} context file(s) from {}",
            memory.file_count,
            working_dir.display()
        );
    }

    let mut generation_config = GenerationConfig {
        temperature: args.temperature.or(settings.defaults.temperature),
        max_output_tokens: settings.defaults.max_output_tokens,
        ..Default::default()
    };
    generation_config.system_instruction = memory.system_instruction();

    let telemetry = LogTelemetry::from_config(&settings.telemetry, persistent_user_id());
    tracing::debug!(session_id = %telemetry.session_id(), "telemetry session started");

    let session = ChatSession::builder(generator)
        .with_model(config.model)
        .with_generation_config(generation_config)
        .with_auth_type(auth_type)
        .with_retry_config(RetryConfig::from(&settings.resilience))
        .with_telemetry(Arc::new(telemetry))
        .build()?;

    Ok(ChatRuntime {
        session,
        auth_type,
        context_files: memory.file_count,
        stream: settings.defaults.stream && !args.no_stream,
    })
}

/// Warn early when the local server is not reachable.
async fn check_ollama(settings: &Settings) -> Result<()> {
    let ollama = OllamaGenerator::with_base_url(settings.get_ollama_base_url());
    if !ollama.health_check().await.unwrap_or(false) {
        let mut stdout = io::stdout();
        stdout.execute(SetForegroundColor(Color::Yellow))?;
        println!(
            "Warning: Ollama is not reachable at {}. Start it with `ollama serve`.",
            ollama.base_url()
        );
        stdout.execute(ResetColor)?;
    }
    Ok(())
}
