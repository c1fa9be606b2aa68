// Copyright (c) 2026 Easel Labs
// SPDX-License-Identifier: AGPL-3.0
//! # Provider Response Extraction
//!
//! Providers (and provider API versions) disagree on where the task id
//! and the result reference live in a response document. Each known
//! shape is one pure extractor function; callers try them in fixed
//! priority order. An extraction miss reports every shape attempted,
//! never an empty or placeholder value.

use serde_json::Value;

pub type Extractor = fn(&Value) -> Option<String>;

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

// -- task id shapes, oldest API versions last --

fn task_id_nested(v: &Value) -> Option<String> {
    v.get("data")?.get("task_id")?.as_str().and_then(non_empty)
}

fn task_id_flat(v: &Value) -> Option<String> {
    v.get("task_id")?.as_str().and_then(non_empty)
}

fn request_id_flat(v: &Value) -> Option<String> {
    v.get("request_id")?.as_str().and_then(non_empty)
}

fn id_flat(v: &Value) -> Option<String> {
    v.get("id")?.as_str().and_then(non_empty)
}

fn id_nested(v: &Value) -> Option<String> {
    v.get("data")?.get("id")?.as_str().and_then(non_empty)
}

/// Task-id shapes in priority order, with the key path each one reads.
pub const TASK_ID_SHAPES: &[(&str, Extractor)] = &[
    ("data.task_id", task_id_nested),
    ("task_id", task_id_flat),
    ("request_id", request_id_flat),
    ("id", id_flat),
    ("data.id", id_nested),
];

/// Extract the external task id from a submission response. On a miss,
/// returns the list of shapes attempted for the error message.
pub fn external_task_id(v: &Value) -> Result<String, Vec<&'static str>> {
    for (_, extractor) in TASK_ID_SHAPES {
        if let Some(id) = extractor(v) {
            return Ok(id);
        }
    }
    Err(TASK_ID_SHAPES.iter().map(|(name, _)| *name).collect())
}

// -- result shapes --

const URL_KEYS: &[&str] = &["url", "video_url", "image_url", "audio_url", "output", "result_url"];

const ARRAY_KEYS: &[&str] = &["output", "images", "videos", "outputs", "urls"];

const OBJECT_KEYS: &[&str] = &["image", "video", "audio", "result", "output", "data"];

fn looks_like_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Shape 1: a direct URL string field at the root.
fn direct_url_field(v: &Value) -> Option<String> {
    URL_KEYS
        .iter()
        .filter_map(|k| v.get(k)?.as_str())
        .find(|s| looks_like_url(s))
        .map(str::to_string)
}

/// Shape 2: an array of URL strings or `{url: ...}` objects.
fn url_array(v: &Value) -> Option<String> {
    for key in ARRAY_KEYS {
        let Some(arr) = v.get(key).and_then(Value::as_array) else {
            continue;
        };
        for item in arr {
            if let Some(s) = item.as_str().filter(|s| looks_like_url(s)) {
                return Some(s.to_string());
            }
            if let Some(s) = item.get("url").and_then(Value::as_str).filter(|s| looks_like_url(s)) {
                return Some(s.to_string());
            }
        }
    }
    None
}

/// Shape 3: a JSON document encoded as a string, needing a nested parse.
fn json_encoded_string(v: &Value) -> Option<String> {
    for key in ["result", "output", "data"] {
        let Some(s) = v.get(key).and_then(Value::as_str) else {
            continue;
        };
        let trimmed = s.trim_start();
        if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
            continue;
        }
        if let Ok(inner) = serde_json::from_str::<Value>(s) {
            if let Some(url) = result_ref(&inner) {
                return Some(url);
            }
        }
    }
    None
}

/// Shape 4: an object carrying a `url` field.
fn object_with_url(v: &Value) -> Option<String> {
    OBJECT_KEYS
        .iter()
        .filter_map(|k| v.get(k)?.get("url")?.as_str())
        .find(|s| looks_like_url(s))
        .map(str::to_string)
}

/// Result shapes in priority order.
pub const RESULT_SHAPES: &[(&str, Extractor)] = &[
    ("direct url field", direct_url_field),
    ("url array", url_array),
    ("json-encoded string", json_encoded_string),
    ("object with url", object_with_url),
];

/// Extract the artifact reference from a terminal-success document.
pub fn result_ref(v: &Value) -> Option<String> {
    RESULT_SHAPES.iter().find_map(|(_, extractor)| extractor(v))
}
