//! Caller-facing job input and its validation.

use serde::Deserialize;
use serde_json::Value;

use crate::error::CoreError;
use crate::generation::{
    resolve_seed, AspectRatio, GenerationParams, DEFAULT_ASPECT_RATIO, DEFAULT_FRAME_COUNT,
    SEED_RANDOM,
};

const MISSING_PROMPT: &str = "Missing required parameter: prompt";

/// Raw `input` object of a job request.
///
/// Fields are kept as untyped JSON so that a missing or wrongly typed value
/// is reported by [`JobInput::validate`] as a validation message instead of
/// failing deserialization of the whole request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobInput {
    #[serde(default)]
    pub prompt: Option<Value>,
    #[serde(default, alias = "aspectRatio")]
    pub aspect_ratio: Option<Value>,
}

impl JobInput {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(Value::String(prompt.into())),
            aspect_ratio: None,
        }
    }

    pub fn with_aspect_ratio(mut self, aspect_ratio: impl Into<String>) -> Self {
        self.aspect_ratio = Some(Value::String(aspect_ratio.into()));
        self
    }

    /// Validate the input and resolve internal defaults (frame count, seed).
    ///
    /// Any non-empty string is a valid prompt. Empty or falsy values
    /// (`null`, `""`, `false`, `0`, `[]`, `{}`) count as missing.
    pub fn validate(&self) -> Result<GenerationParams, CoreError> {
        let prompt = match self.prompt.as_ref() {
            Some(Value::String(p)) if !p.is_empty() => p.clone(),
            None => return Err(CoreError::Validation(MISSING_PROMPT.into())),
            Some(value) if is_falsy(value) => {
                return Err(CoreError::Validation(MISSING_PROMPT.into()))
            }
            Some(other) => {
                return Err(CoreError::Validation(format!(
                    "Invalid prompt: expected a string, got {other}"
                )))
            }
        };

        let aspect_ratio = match self.aspect_ratio.as_ref() {
            None | Some(Value::Null) => AspectRatio::parse(DEFAULT_ASPECT_RATIO)?,
            Some(Value::String(s)) => AspectRatio::parse(s)?,
            Some(other) => AspectRatio::parse(&other.to_string())?,
        };
        let (width, height) = aspect_ratio.dimensions();

        Ok(GenerationParams {
            prompt,
            aspect_ratio,
            width,
            height,
            frame_count: DEFAULT_FRAME_COUNT,
            seed: resolve_seed(SEED_RANDOM),
        })
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}
