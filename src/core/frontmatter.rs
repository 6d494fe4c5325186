//! Front-matter codec for markdown documents and YAML sidecars.
//!
//! Text records are stored as a single markdown file with a leading
//! `---` YAML block; binary records carry the same metadata in a
//! `*.metadata.yaml` sidecar next to the content file. The codec also
//! exposes the `{{ key }}` substitution hook used when template
//! front-matter is rendered against a context map.
//!
//! Writes are normalized to LF and always end with a trailing newline.
//! Unset optional fields are omitted from the YAML rather than written as
//! `null` or empty lists; serde field order keeps the output stable.

use crate::core::error::OapsError;
use regex::Regex;
use serde::Serialize;
use serde_yaml::{Mapping, Value};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Parse a markdown document into `(front_matter, body)`.
///
/// Returns `(None, text)` when the document does not start with `---` or
/// the closing marker is missing. Malformed YAML or a non-mapping
/// top-level value is a `Format` error. CR/LF input is accepted; the body
/// comes back trimmed.
pub fn parse_markdown(content: &str) -> Result<(Option<Mapping>, String), OapsError> {
    let text = content.replace("\r\n", "\n");
    if !text.starts_with("---") {
        return Ok((None, text));
    }

    let rest = &text[3..];
    let Some(end) = rest.find("\n---") else {
        // No closing marker: the whole document is body.
        return Ok((None, text));
    };

    let yaml_str = rest[..end].trim();
    let mut after = &rest[end + 4..];
    if let Some(stripped) = after.strip_prefix('\n') {
        after = stripped;
    }
    let body = after.trim().to_string();

    let value: Value = serde_yaml::from_str(yaml_str)
        .map_err(|e| OapsError::Format(format!("malformed front-matter: {e}")))?;
    match value {
        Value::Mapping(mapping) => Ok((Some(mapping), body)),
        Value::Null => Ok((Some(Mapping::new()), body)),
        other => Err(OapsError::Format(format!(
            "front-matter must be a mapping, got {}",
            yaml_kind(&other)
        ))),
    }
}

/// Parse front-matter and render `{{ key }}` placeholders in string values
/// against `context`. Mapping entries whose keys render to an empty string
/// are dropped. Used by template front-matter, not by artifact storage.
pub fn parse_markdown_rendered(
    content: &str,
    context: &HashMap<String, String>,
) -> Result<(Option<Mapping>, String), OapsError> {
    let (frontmatter, body) = parse_markdown(content)?;
    let rendered = frontmatter.map(|mapping| {
        match render_value(Value::Mapping(mapping), context) {
            Value::Mapping(m) => m,
            _ => Mapping::new(),
        }
    });
    Ok((rendered, body))
}

/// Serialize metadata and body into a markdown document.
pub fn serialize_markdown<T: Serialize>(metadata: &T, body: &str) -> Result<String, OapsError> {
    let yaml = serde_yaml::to_string(metadata)?;
    let body = body.replace("\r\n", "\n");
    let body = body.trim();
    if body.is_empty() {
        Ok(format!("---\n{yaml}---\n"))
    } else {
        Ok(format!("---\n{yaml}---\n\n{body}\n"))
    }
}

/// Parse a YAML sidecar document into a mapping.
pub fn parse_sidecar_str(content: &str) -> Result<Mapping, OapsError> {
    let text = content.replace("\r\n", "\n");
    let value: Value = serde_yaml::from_str(&text)
        .map_err(|e| OapsError::Format(format!("malformed sidecar: {e}")))?;
    match value {
        Value::Mapping(mapping) => Ok(mapping),
        other => Err(OapsError::Format(format!(
            "sidecar must be a mapping, got {}",
            yaml_kind(&other)
        ))),
    }
}

/// Serialize metadata into sidecar YAML (no body, trailing newline).
pub fn serialize_sidecar<T: Serialize>(metadata: &T) -> Result<String, OapsError> {
    Ok(serde_yaml::to_string(metadata)?)
}

fn yaml_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.]*)\s*\}\}").unwrap())
}

/// Substitute `{{ key }}` placeholders in a string; unknown keys render to
/// the empty string.
pub fn render_str(template: &str, context: &HashMap<String, String>) -> String {
    placeholder_re()
        .replace_all(template, |caps: &regex::Captures<'_>| {
            context.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned()
}

/// Recursively render placeholders in a YAML value. Mapping entries whose
/// rendered key is empty are removed.
pub fn render_value(value: Value, context: &HashMap<String, String>) -> Value {
    match value {
        Value::String(s) => Value::String(render_str(&s, context)),
        Value::Sequence(items) => Value::Sequence(
            items
                .into_iter()
                .map(|item| render_value(item, context))
                .collect(),
        ),
        Value::Mapping(mapping) => {
            let mut rendered = Mapping::new();
            for (key, val) in mapping {
                let key = match key {
                    Value::String(s) => Value::String(render_str(&s, context)),
                    other => other,
                };
                if matches!(&key, Value::String(s) if s.is_empty()) {
                    continue;
                }
                rendered.insert(key, render_value(val, context));
            }
            Value::Mapping(rendered)
        }
        other => other,
    }
}
