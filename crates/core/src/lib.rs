//! Domain logic for the LTX-2 text-to-video worker.
//!
//! Everything here is free of network I/O: job input validation,
//! generation parameter defaults, and injection of those parameters
//! into the ComfyUI workflow template.

pub mod error;
pub mod generation;
pub mod job_input;
pub mod workflow;
