// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use serde_json::Value;

/// Lay `update` over `on_disk`, recursing into objects. Keys only present on
/// disk survive; everything else takes the value from `update`.
pub(super) fn overlay(on_disk: Value, update: Value) -> Value {
    match (on_disk, update) {
        (Value::Object(mut kept), Value::Object(incoming)) => {
            for (key, value) in incoming {
                let merged = match kept.remove(&key) {
                    Some(previous) => overlay(previous, value),
                    None => value,
                };
                kept.insert(key, merged);
            }
            Value::Object(kept)
        }
        (_, update) => update,
    }
}
