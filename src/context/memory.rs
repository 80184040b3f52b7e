// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Hierarchical `HEADROOM.md` discovery
//!
//! Files are loaded in this order, broadest first:
//! 1. Global: `~/.headroom/HEADROOM.md`
//! 2. Project: `<dir>/.headroom/HEADROOM.md` for every directory from the
//!    project root (nearest ancestor containing `.git`) down to the working
//!    directory
//! 3. Subdirectories: `**/.headroom/HEADROOM.md` below the working directory,
//!    shallowest first
//! 4. Extension files listed in settings

use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::{ContextSource, LoadedMemory, CONTEXT_DIR_NAME, DEFAULT_CONTEXT_FILENAME};
use crate::config::{ContextConfig, Settings};
use crate::error::Result;

/// Directories never descended into when scanning below the working directory
const SKIP_DIRS: &[&str] = &[".git", "node_modules", "target"];

const DEFAULT_MAX_DEPTH: usize = 8;
const DEFAULT_MAX_SCAN_DIRS: usize = 200;

/// Loads context files from the global, project, and subdirectory scopes
#[derive(Debug, Clone)]
pub struct HierarchicalMemory {
    /// Directory holding the global context file; `None` disables it
    global_dir: Option<PathBuf>,
    file_name: String,
    extension_files: Vec<PathBuf>,
    max_scan_dirs: usize,
    max_depth: usize,
}

impl Default for HierarchicalMemory {
    fn default() -> Self {
        Self {
            global_dir: Some(Settings::headroom_home()),
            file_name: DEFAULT_CONTEXT_FILENAME.to_string(),
            extension_files: Vec::new(),
            max_scan_dirs: DEFAULT_MAX_SCAN_DIRS,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl HierarchicalMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(config: &ContextConfig) -> Self {
        Self::default()
            .with_file_name(config.file_name.clone())
            .with_extension_files(config.extension_files.clone())
            .with_max_scan_dirs(config.max_scan_dirs)
    }

    pub fn with_global_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.global_dir = dir;
        self
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        let file_name = file_name.into();
        if !file_name.trim().is_empty() {
            self.file_name = file_name;
        }
        self
    }

    pub fn with_extension_files(mut self, files: Vec<PathBuf>) -> Self {
        self.extension_files = files;
        self
    }

    pub fn with_max_scan_dirs(mut self, max: usize) -> Self {
        self.max_scan_dirs = max;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Ordered, deduplicated paths of the context files that exist
    pub fn discover(&self, current_dir: &Path) -> Vec<PathBuf> {
        let current_dir = normalize(current_dir);
        let mut paths = Vec::new();
        let mut seen = HashSet::new();

        let mut add = |path: PathBuf| {
            if path.is_file() {
                let path = normalize(&path);
                if seen.insert(path.clone()) {
                    tracing::debug!("Found context file: {}", path.display());
                    paths.push(path);
                }
            }
        };

        if let Some(global_dir) = &self.global_dir {
            add(global_dir.join(&self.file_name));
        }

        let root = find_project_root(&current_dir);
        let mut upward: Vec<&Path> = Vec::new();
        for dir in current_dir.ancestors() {
            upward.push(dir);
            if dir == root {
                break;
            }
        }
        for dir in upward.into_iter().rev() {
            add(dir.join(CONTEXT_DIR_NAME).join(&self.file_name));
        }

        for path in self.scan_subdirectories(&current_dir) {
            add(path);
        }

        for ext in &self.extension_files {
            let path = if ext.is_absolute() {
                ext.clone()
            } else {
                current_dir.join(ext)
            };
            add(path);
        }

        paths
    }

    fn scan_subdirectories(&self, current_dir: &Path) -> Vec<PathBuf> {
        let file_name = OsStr::new(&self.file_name);
        let mut found = Vec::new();
        let mut dirs_scanned = 0usize;

        let walker = WalkDir::new(current_dir)
            .max_depth(self.max_depth)
            .into_iter()
            .filter_entry(|e| {
                !(e.depth() > 0
                    && e.file_type().is_dir()
                    && e.file_name().to_str().is_some_and(|n| SKIP_DIRS.contains(&n)))
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!("Skipping unreadable path during context scan: {}", e);
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                dirs_scanned += 1;
                if dirs_scanned > self.max_scan_dirs {
                    tracing::debug!(
                        "Context scan stopped after {} directories",
                        self.max_scan_dirs
                    );
                    break;
                }
                continue;
            }

            let in_context_dir = entry
                .path()
                .parent()
                .and_then(Path::file_name)
                .is_some_and(|n| n == CONTEXT_DIR_NAME);
            if entry.file_type().is_file() && in_context_dir && entry.file_name() == file_name {
                found.push(entry.into_path());
            }
        }

        found.sort_by(|a, b| {
            a.components()
                .count()
                .cmp(&b.components().count())
                .then_with(|| a.cmp(b))
        });
        found
    }

    /// Read and concatenate every discovered file
    pub fn load_from(&self, current_dir: &Path) -> LoadedMemory {
        let current_dir = normalize(current_dir);
        let mut sections = Vec::new();

        for path in self.discover(&current_dir) {
            match std::fs::read_to_string(&path) {
                Ok(content) => {
                    let shown = path
                        .strip_prefix(&current_dir)
                        .unwrap_or(&path)
                        .display()
                        .to_string();
                    sections.push(format!("--- Context from: {} ---\n{}", shown, content));
                }
                Err(e) => {
                    tracing::warn!("Could not read context file {}: {}", path.display(), e);
                }
            }
        }

        LoadedMemory {
            file_count: sections.len(),
            content: sections.join("\n\n"),
        }
    }
}

impl ContextSource for HierarchicalMemory {
    fn load(&self, current_dir: &Path) -> Result<LoadedMemory> {
        Ok(self.load_from(current_dir))
    }
}

/// Nearest ancestor containing `.git`, or `start` itself
pub fn find_project_root(start: &Path) -> PathBuf {
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .unwrap_or(start)
        .to_path_buf()
}

fn normalize(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
