// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Turn validation and history curation
//!
//! Models occasionally return empty or malformed turns (safety filters,
//! recitation, dropped streams). The curated view removes those turns along
//! with the user turn they answered, so the next request is still accepted.

use crate::error::{HeadroomError, Result};
use crate::llm::content::{Content, GenerateContentResponse, Part, Role};

/// A turn is valid when it has at least one part, no empty parts, and no
/// empty visible text. Thought parts may be empty.
pub fn is_valid_content(content: &Content) -> bool {
    if content.parts.is_empty() {
        return false;
    }
    content.parts.iter().all(|part| match part {
        Part::Empty => false,
        Part::Text(text) => !text.is_empty(),
        _ => true,
    })
}

/// A response is valid when its first candidate carries valid content.
pub fn is_valid_response(response: &GenerateContentResponse) -> bool {
    response.first_content().is_some_and(is_valid_content)
}

/// Every turn of a supplied history must be authored by `user` or `model`.
pub fn validate_history(history: &[Content]) -> Result<()> {
    for content in history {
        match &content.role {
            Some(Role::User) | Some(Role::Model) => {}
            Some(Role::Other(role)) => {
                return Err(HeadroomError::InvalidHistory(format!(
                    "Role must be user or model, but got {}.",
                    role
                )))
            }
            None => {
                return Err(HeadroomError::InvalidHistory(
                    "Role must be user or model, but got undefined.".to_string(),
                ))
            }
        }
    }
    Ok(())
}

/// Derive the curated history.
///
/// User turns are kept. Each run of consecutive non-user turns is kept only
/// if every turn in it is valid; otherwise the run is dropped together with
/// the preceding user turn.
pub fn extract_curated_history(history: &[Content]) -> Vec<Content> {
    let mut curated: Vec<Content> = Vec::with_capacity(history.len());
    let mut i = 0;

    while i < history.len() {
        if history[i].is_user() {
            curated.push(history[i].clone());
            i += 1;
            continue;
        }

        let start = i;
        let mut valid = true;
        while i < history.len() && !history[i].is_user() {
            valid &= is_valid_content(&history[i]);
            i += 1;
        }

        if valid {
            curated.extend_from_slice(&history[start..i]);
        } else {
            curated.pop();
        }
    }

    curated
}
