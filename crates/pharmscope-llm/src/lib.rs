//! pharmscope-llm — AI text-model abstraction layer.
//! Implements the TextModel trait, the concrete API backends, and the
//! process-wide call pacer shared by every AI call site.

pub mod audit;
pub mod backend;
pub mod pacer;

pub use backend::{AiError, GenerateOptions, GeminiModel, OpenAiCompatModel, TextModel};
pub use pacer::Pacer;
