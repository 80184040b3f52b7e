// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Reading and writing `settings.json`

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::Result;

use super::merge;
use super::Settings;

impl Settings {
    /// `<headroom home>/settings.json`
    pub fn default_path() -> PathBuf {
        Self::headroom_home().join("settings.json")
    }

    /// Parse the file at `path`; a missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write to `path`, keeping keys the file already has that these
    /// settings do not model. An unparseable file is replaced.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let current = serde_json::to_value(self)?;
        let contents = match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(on_disk) => merge::overlay(on_disk, current),
                Err(e) => {
                    tracing::warn!(
                        target: "headroom.config",
                        path = %path.display(),
                        error = %e,
                        "replacing unreadable settings file"
                    );
                    current
                }
            },
            Err(_) => current,
        };

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let staging = path.with_extension("json.tmp");
        std::fs::write(&staging, serde_json::to_string_pretty(&contents)?)?;
        std::fs::rename(&staging, path)?;
        Ok(())
    }

    /// `$HEADROOM_HOME`, else `~/.headroom`.
    pub fn headroom_home() -> PathBuf {
        match std::env::var_os("HEADROOM_HOME").filter(|v| !v.is_empty()) {
            Some(home) => PathBuf::from(home),
            None => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".headroom"),
        }
    }

    pub fn user_id_path() -> PathBuf {
        Self::headroom_home().join("user_id")
    }

    pub fn ensure_directories() -> Result<()> {
        std::fs::create_dir_all(Self::headroom_home())?;
        Ok(())
    }
}
