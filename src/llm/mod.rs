// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Model backend layer for Headroom
//!
//! Content types, the generator abstraction, retry policy and backends.

pub mod content;
pub mod factory;
pub mod mock_provider;
pub mod provider;
pub mod providers;
pub mod retry;

pub use content::*;
pub use provider::*;
