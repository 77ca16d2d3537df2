//! Turn a raw model completion into a `{name, description}` pair.
//!
//! The chain is fence-strip → strict JSON parse → raw-text fallback. Each
//! step is exposed on its own; [`normalize`] never fails.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::{ScribeError, ScribeResult};

/// Name used when the completion does not supply one.
pub const DEFAULT_NAME: &str = "User Journey";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Described {
    pub name: String,
    pub description: String,
}

#[derive(Deserialize)]
struct RawDescribed {
    #[serde(default)]
    name: Option<String>,
    description: String,
}

fn opening_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^```[A-Za-z0-9_+.-]*").expect("static regex"))
}

/// Trim and remove a surrounding Markdown code fence, with or without a
/// language tag. An unterminated fence only loses its opening marker.
pub fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(open) = opening_fence().find(trimmed) else {
        return trimmed;
    };
    let body = &trimmed[open.end()..];
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Strict parse of `{"name"?: string, "description": string}`.
pub fn parse_strict(text: &str, default_name: &str) -> ScribeResult<Described> {
    let raw: RawDescribed = serde_json::from_str(text).map_err(|e| ScribeError::Parse(e.to_string()))?;
    let name = raw
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| default_name.to_string());
    Ok(Described {
        name,
        description: raw.description.trim().to_string(),
    })
}

pub fn normalize(raw: &str) -> Described {
    normalize_with_default(raw, DEFAULT_NAME)
}

/// Like [`normalize`] but with a caller-chosen placeholder name.
pub fn normalize_with_default(raw: &str, default_name: &str) -> Described {
    let body = strip_fences(raw);
    match parse_strict(body, default_name) {
        Ok(described) => described,
        Err(e) => {
            tracing::warn!(error = %e, "completion is not JSON; using raw text as description");
            Described {
                name: default_name.to_string(),
                description: body.to_string(),
            }
        }
    }
}
