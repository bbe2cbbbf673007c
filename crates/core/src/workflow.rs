//! ComfyUI workflow template loading and parameter injection.
//!
//! The workflow is an API-format graph: a map from node id to
//! `{"class_type": ..., "inputs": {...}}`. The template is treated as
//! opaque apart from the named input slots below, which are the only
//! places node ids appear in the code base.

use std::path::Path;

use serde_json::Value;

use crate::error::CoreError;
use crate::generation::GenerationParams;

/// One writable input field on one workflow node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSlot {
    pub node: &'static str,
    pub field: &'static str,
}

const fn slot(node: &'static str, field: &'static str) -> InputSlot {
    InputSlot { node, field }
}

/// Stage-1 positive prompt.
pub const PROMPT_SLOTS: &[InputSlot] = &[slot("92:3", "text")];
/// Noise seeds for both sampling stages.
pub const SEED_SLOTS: &[InputSlot] = &[slot("92:11", "noise_seed"), slot("92:67", "noise_seed")];
/// Empty image feeding the size calculation chain.
pub const WIDTH_SLOTS: &[InputSlot] = &[slot("92:89", "width")];
pub const HEIGHT_SLOTS: &[InputSlot] = &[slot("92:89", "height")];
/// Latent length and frame-number inputs.
pub const FRAME_COUNT_SLOTS: &[InputSlot] =
    &[slot("92:43", "length"), slot("92:51", "frames_number")];

/// A loaded workflow graph, cloned for every job.
#[derive(Debug, Clone)]
pub struct WorkflowTemplate {
    graph: Value,
}

impl WorkflowTemplate {
    /// Read and parse a workflow JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Template(format!("failed to read {}: {e}", path.display()))
        })?;
        let graph: Value = serde_json::from_str(&raw).map_err(|e| {
            CoreError::Template(format!("failed to parse {}: {e}", path.display()))
        })?;
        Self::from_value(graph)
    }

    /// Wrap an already-parsed workflow graph.
    pub fn from_value(graph: Value) -> Result<Self, CoreError> {
        if !graph.is_object() {
            return Err(CoreError::Template(
                "workflow root must be a JSON object".into(),
            ));
        }
        Ok(Self { graph })
    }

    pub fn graph(&self) -> &Value {
        &self.graph
    }

    /// Produce a job-specific workflow with every parameter slot filled.
    ///
    /// The template itself is never modified.
    pub fn inject(&self, params: &GenerationParams) -> Result<Value, CoreError> {
        let mut graph = self.graph.clone();

        set_inputs(&mut graph, PROMPT_SLOTS, Value::from(params.prompt.as_str()))?;
        set_inputs(&mut graph, SEED_SLOTS, Value::from(params.seed))?;
        set_inputs(&mut graph, WIDTH_SLOTS, Value::from(params.width))?;
        set_inputs(&mut graph, HEIGHT_SLOTS, Value::from(params.height))?;
        set_inputs(&mut graph, FRAME_COUNT_SLOTS, Value::from(params.frame_count))?;

        Ok(graph)
    }
}

fn set_inputs(graph: &mut Value, slots: &[InputSlot], value: Value) -> Result<(), CoreError> {
    for slot in slots {
        set_input(graph, slot, value.clone())?;
    }
    Ok(())
}

/// Overwrite `slot` in `graph`, failing if the node or its `inputs`
/// object is absent.
pub fn set_input(graph: &mut Value, slot: &InputSlot, value: Value) -> Result<(), CoreError> {
    let inputs = graph
        .get_mut(slot.node)
        .and_then(|node| node.get_mut("inputs"))
        .and_then(Value::as_object_mut)
        .ok_or_else(|| {
            CoreError::Template(format!(
                "workflow has no inputs for node {} (slot {})",
                slot.node, slot.field
            ))
        })?;
    inputs.insert(slot.field.to_string(), value);
    Ok(())
}
