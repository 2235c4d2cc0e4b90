//! Pipeline stages for turning a question into an answer.
//!
//! Each submodule implements exactly one step, so each is testable on its
//! own and the service can be swapped without touching input handling.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ encode ──▶ llm
//! (text/image)  (base64)  (model call)
//! ```
//!
//! 1. [`input`] : validate the submission, load and type-check the image
//! 2. [`encode`]: base64-wrap the image bytes for the request body
//! 3. [`llm`]   : one call to the model; the only stage with network I/O
//!
//! Rendering the answer lives in [`crate::render`]; exports in
//! [`crate::export`].

pub mod encode;
pub mod input;
pub mod llm;
