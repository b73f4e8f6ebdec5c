use crate::agent::AgentClient;
use crate::error::{Result, VideoForgeError};
use crate::spec::VideoSpec;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// JSON-schema document the AI validator reasons over, loaded at startup.
const SPEC_SCHEMA: &str = include_str!("../schema/video_spec.schema.json");

/// Structural check of the raw specification. Collects every violation with
/// its path rather than stopping at the first.
pub fn validate_structure(data: &Value) -> std::result::Result<(), Vec<String>> {
    let mut errors = Vec::new();

    let Some(obj) = data.as_object() else {
        return Err(vec!["input must be a JSON object".to_string()]);
    };

    for field in ["title", "description", "segments"] {
        if !obj.contains_key(field) {
            errors.push(format!("missing required field: '{}'", field));
        }
    }

    if let Some(segments) = obj.get("segments") {
        match segments.as_array() {
            None => errors.push("'segments' must be a list".to_string()),
            Some(list) if list.is_empty() => {
                errors.push("'segments' cannot be empty".to_string())
            }
            Some(list) => {
                let mut seen_ids = HashSet::new();
                for (i, segment) in list.iter().enumerate() {
                    let Some(seg_obj) = segment.as_object() else {
                        errors.push(format!("segments[{}] must be an object", i));
                        continue;
                    };
                    match seg_obj.get("id").and_then(Value::as_str) {
                        None => errors.push(format!(
                            "segments[{}] is missing required 'id' field",
                            i
                        )),
                        Some(id) => {
                            if !seen_ids.insert(id.to_string()) {
                                errors.push(format!(
                                    "segments[{}].id '{}' is not unique",
                                    i, id
                                ));
                            }
                        }
                    }
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[derive(Debug, Deserialize)]
struct SchemaVerdict {
    is_valid: bool,
    #[serde(default)]
    normalized_data: Option<Value>,
    #[serde(default)]
    errors: Option<Vec<String>>,
}

const SCHEMA_SYSTEM_PROMPT: &str = "You are a strict JSON schema validator for video creation \
requests. Validate the input data against the provided JSON schema. Respond with a JSON object: \
{\"is_valid\": true, \"normalized_data\": <data>} when the data is valid or can be auto-corrected \
(trimming strings, filling defaults), or {\"is_valid\": false, \"errors\": [<messages>]} when it \
cannot. Never invent required data.";

/// Best-effort schema validation through the AI agent. Returns the
/// (possibly normalized) value; any agent failure falls back to the input
/// unchanged. Normalization that drops or re-identifies segments is
/// discarded.
pub async fn validate_schema(agent: &AgentClient, data: Value) -> Result<Value> {
    if !agent.is_available() {
        debug!("AI schema validation disabled, passing structural result through");
        return Ok(data);
    }

    let prompt = format!(
        "Schema:\n{}\n\nData:\n{}",
        SPEC_SCHEMA,
        serde_json::to_string_pretty(&data)?
    );

    match agent
        .run_json::<SchemaVerdict>(SCHEMA_SYSTEM_PROMPT, &prompt)
        .await
    {
        Ok(verdict) => {
            if !verdict.is_valid {
                let errors = verdict.errors.unwrap_or_default();
                return Err(VideoForgeError::Validation(errors.join("; ")));
            }
            match verdict.normalized_data {
                Some(normalized) if normalization_preserves_segments(&data, &normalized) => {
                    info!("schema validator normalized the specification");
                    Ok(normalized)
                }
                Some(_) => {
                    warn!("schema validator altered segment identity, discarding normalization");
                    Ok(data)
                }
                None => Ok(data),
            }
        }
        Err(e) => {
            warn!("AI schema validation unavailable ({}), passing through", e);
            Ok(data)
        }
    }
}

/// Normalization may trim and default-fill, but must keep every segment and
/// its id.
fn normalization_preserves_segments(original: &Value, normalized: &Value) -> bool {
    let ids = |v: &Value| -> Option<Vec<String>> {
        Some(
            v.get("segments")?
                .as_array()?
                .iter()
                .filter_map(|s| s.get("id").and_then(Value::as_str).map(str::to_string))
                .collect(),
        )
    };
    match (ids(original), ids(normalized)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Full validation: structural first, then best-effort schema validation,
/// then a typed parse.
pub async fn validate_spec(agent: &AgentClient, data: Value) -> Result<VideoSpec> {
    if let Err(errors) = validate_structure(&data) {
        return Err(VideoForgeError::Validation(errors.join("; ")));
    }

    let normalized = validate_schema(agent, data).await?;
    let spec: VideoSpec = serde_json::from_value(normalized)
        .map_err(|e| VideoForgeError::Validation(format!("specification parse failed: {}", e)))?;
    Ok(spec)
}
