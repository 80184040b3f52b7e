// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chat session management
//!
//! Conversation state, history curation, and display formatting for the
//! interactive chat.

pub mod display;
mod session;
pub mod validation;

pub use display::format_api_error;
pub use session::{
    final_usage_metadata, ChatSession, ChatSessionBuilder, ResponseStream, SendMessageParams,
};
pub use validation::{extract_curated_history, is_valid_content, is_valid_response};
