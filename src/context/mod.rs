// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Context injection
//!
//! Instructions kept in `HEADROOM.md` files are gathered from the user's home
//! directory, the current project, and its subdirectories, then handed to the
//! chat session as the system instruction.

pub mod memory;

use std::path::Path;

use crate::error::Result;

pub use memory::HierarchicalMemory;

/// Default name of a context file
pub const DEFAULT_CONTEXT_FILENAME: &str = "HEADROOM.md";

/// Directory holding per-user and per-directory context files
pub const CONTEXT_DIR_NAME: &str = ".headroom";

/// Concatenated context ready to be used as a system instruction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadedMemory {
    pub content: String,
    /// Number of files that were read successfully
    pub file_count: usize,
}

impl LoadedMemory {
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }

    /// Content as a system instruction, or `None` if nothing was loaded
    pub fn system_instruction(&self) -> Option<String> {
        (!self.is_empty()).then(|| self.content.clone())
    }
}

/// Something that can produce context for a working directory
pub trait ContextSource: Send + Sync {
    fn load(&self, current_dir: &Path) -> Result<LoadedMemory>;
}
