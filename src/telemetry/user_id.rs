// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Persistent anonymous user id

use std::path::Path;

use uuid::Uuid;

use crate::config::Settings;
use crate::error::Result;

/// User id stored at `~/.headroom/user_id`, created on first use.
pub fn persistent_user_id() -> String {
    persistent_user_id_at(&Settings::user_id_path())
}

/// User id stored at `path`. Falls back to an ephemeral id if the file
/// cannot be read or written.
pub fn persistent_user_id_at(path: &Path) -> String {
    match read_or_create(path) {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(
                target: "headroom.telemetry",
                path = %path.display(),
                error = %e,
                "cannot access persistent user id, using ephemeral id"
            );
            Uuid::new_v4().to_string()
        }
    }
}

fn read_or_create(path: &Path) -> Result<String> {
    if path.exists() {
        let existing = std::fs::read_to_string(path)?;
        let existing = existing.trim();
        if !existing.is_empty() {
            return Ok(existing.to_string());
        }
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let id = Uuid::new_v4().to_string();
    std::fs::write(path, &id)?;
    Ok(id)
}
