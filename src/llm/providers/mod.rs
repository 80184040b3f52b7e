// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Generation backend implementations

pub(crate) mod common;
pub mod gemini;
pub mod ollama;

pub use gemini::GeminiGenerator;
pub use ollama::OllamaGenerator;
