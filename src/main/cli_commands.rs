// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::io::{self, Read, Write};
use std::path::Path;

use crossterm::{
    style::{Color, ResetColor, SetForegroundColor},
    ExecutableCommand,
};
use futures::StreamExt;

use headroom::chat::display::{
    format_help, format_history_entry, format_usage, format_welcome,
};
use headroom::chat::{final_usage_metadata, format_api_error};
use headroom::cli::ConfigArgs;
use headroom::config::Settings;
use headroom::error::{HeadroomError, Result};
use headroom::llm::content::UsageMetadata;

use super::chat_runtime::ChatRuntime;

/// What the REPL should do with a line of input
#[derive(Debug, PartialEq, Eq)]
pub(super) enum ReplAction {
    Send(String),
    Help,
    History,
    Clear,
    Quit,
    Unknown(String),
    Nothing,
}

pub(super) fn parse_repl_input(input: &str) -> ReplAction {
    let input = input.trim();
    if input.is_empty() {
        return ReplAction::Nothing;
    }
    match input {
        "/help" | "/?" => ReplAction::Help,
        "/history" => ReplAction::History,
        "/clear" => ReplAction::Clear,
        "/quit" | "/exit" | "exit" | "quit" => ReplAction::Quit,
        cmd if cmd.starts_with('/') => ReplAction::Unknown(cmd.to_string()),
        text => ReplAction::Send(text.to_string()),
    }
}

pub(super) async fn run_chat(
    runtime: ChatRuntime,
    initial_prompt: Option<String>,
    verbose: u8,
) -> Result<()> {
    print_welcome(&runtime)?;

    if let Some(prompt) = initial_prompt.filter(|p| !p.trim().is_empty()) {
        respond(&runtime, prompt, verbose).await?;
    }

    loop {
        let input = match read_user_input()? {
            Some(input) => input,
            None => break,
        };

        match parse_repl_input(&input) {
            ReplAction::Nothing => continue,
            ReplAction::Quit => break,
            ReplAction::Help => println!("{}", format_help()),
            ReplAction::History => {
                let history = runtime.session.get_history(false);
                if history.is_empty() {
                    println!("(no history yet)");
                }
                for (i, content) in history.iter().enumerate() {
                    println!("{}", format_history_entry(i, content));
                }
            }
            ReplAction::Clear => {
                runtime.session.clear_history();
                println!("Conversation cleared.");
            }
            ReplAction::Unknown(cmd) => {
                println!("Unknown command: {}. Type /help for commands.", cmd);
            }
            ReplAction::Send(prompt) => {
                respond(&runtime, prompt, verbose).await?;
            }
        }
    }

    Ok(())
}

pub(super) async fn run_ask(
    runtime: ChatRuntime,
    args: headroom::cli::AskArgs,
    verbose: u8,
) -> Result<()> {
    let mut prompt = args.prompt.unwrap_or_default();
    if args.stdin {
        let mut input = String::new();
        io::stdin().read_to_string(&mut input)?;
        if prompt.is_empty() {
            prompt = input;
        } else {
            prompt = format!("{}\n\n{}", prompt, input);
        }
    }

    for file_path in &args.file {
        match std::fs::read_to_string(file_path) {
            Ok(content) => {
                prompt = format!(
                    "{}\n\n<file path=\"{}\">\n{}\n</file>",
                    prompt,
                    file_path.display(),
                    content
                );
            }
            Err(e) => {
                tracing::warn!("Skipping {}: {}", file_path.display(), e);
            }
        }
    }

    if prompt.trim().is_empty() {
        return Err(HeadroomError::InvalidInput(
            "no prompt given (pass one as an argument or use --stdin)".to_string(),
        ));
    }

    if !respond(&runtime, prompt, verbose).await? {
        std::process::exit(1);
    }
    Ok(())
}

/// Send one message and print the reply. Returns false if the backend failed.
/// Apply any `config` flags, persist them, then print the defaults in effect.
pub(super) fn run_config(mut settings: Settings, path: &Path, args: ConfigArgs) -> Result<()> {
    if settings.update_defaults(args.model.as_deref(), args.auth_type, args.temperature) {
        settings.save_to(path)?;
        tracing::info!(target: "headroom.config", path = %path.display(), "saved defaults");
        println!("Saved to {}", path.display());
    }
    println!("{}", format_defaults(&settings));
    Ok(())
}

pub(super) fn format_defaults(settings: &Settings) -> String {
    let defaults = &settings.defaults;
    let temperature = defaults
        .temperature
        .map_or_else(|| "backend default".to_string(), |t| t.to_string());
    format!(
        "auth type:   {}\nmodel:       {}\ntemperature: {}\nstreaming:   {}",
        defaults.auth_type,
        defaults.model,
        temperature,
        if defaults.stream { "on" } else { "off" }
    )
}

async fn respond(runtime: &ChatRuntime, prompt: String, verbose: u8) -> Result<bool> {
    print_response_prefix()?;
    let mut stdout = io::stdout();

    if !runtime.stream {
        return match runtime.session.send_message(prompt).await {
            Ok(response) => {
                println!("{}", response.text().unwrap_or_default());
                if verbose > 0 {
                    print_usage(response.usage_metadata.as_ref())?;
                }
                Ok(true)
            }
            Err(e) => {
                println!();
                print_error(&e, runtime)?;
                Ok(false)
            }
        };
    }

    let mut stream = match runtime.session.send_message_stream(prompt).await {
        Ok(stream) => stream,
        Err(e) => {
            println!();
            print_error(&e, runtime)?;
            return Ok(false);
        }
    };

    let mut chunks = Vec::new();
    while let Some(item) = stream.next().await {
        match item {
            Ok(chunk) => {
                if let Some(content) = chunk.first_content() {
                    print!("{}", content.text());
                    stdout.flush()?;
                }
                chunks.push(chunk);
            }
            Err(e) => {
                println!();
                print_error(&e, runtime)?;
                return Ok(false);
            }
        }
    }
    println!();

    if verbose > 0 {
        print_usage(final_usage_metadata(&chunks).as_ref())?;
    }
    Ok(true)
}

fn print_welcome(runtime: &ChatRuntime) -> Result<()> {
    let mut stdout = io::stdout();
    stdout.execute(SetForegroundColor(Color::Cyan))?;
    print!(
        "{}",
        format_welcome(
            runtime.auth_type.as_str(),
            runtime.session.model(),
            runtime.context_files
        )
    );
    stdout.execute(ResetColor)?;
    stdout.flush()?;
    Ok(())
}

fn print_response_prefix() -> Result<()> {
    let mut stdout = io::stdout();
    stdout.execute(SetForegroundColor(Color::Cyan))?;
    print!("\nheadroom: ");
    stdout.execute(ResetColor)?;
    stdout.flush()?;
    Ok(())
}

fn print_error(error: &HeadroomError, runtime: &ChatRuntime) -> Result<()> {
    let mut stdout = io::stdout();
    stdout.execute(SetForegroundColor(Color::Red))?;
    println!("{}", format_api_error(error, Some(runtime.auth_type)));
    stdout.execute(ResetColor)?;
    Ok(())
}

fn print_usage(usage: Option<&UsageMetadata>) -> Result<()> {
    let mut stdout = io::stdout();
    stdout.execute(SetForegroundColor(Color::DarkGrey))?;
    println!("{}", format_usage(&usage.cloned().unwrap_or_default()));
    stdout.execute(ResetColor)?;
    Ok(())
}

/// Read a line from stdin; `None` on end of input.
fn read_user_input() -> Result<Option<String>> {
    let mut stdout = io::stdout();
    stdout.execute(SetForegroundColor(Color::Green))?;
    print!("\nyou: ");
    stdout.execute(ResetColor)?;
    stdout.flush()?;

    let mut input = String::new();
    if io::stdin().read_line(&mut input)? == 0 {
        return Ok(None);
    }
    Ok(Some(input.trim().to_string()))
}
