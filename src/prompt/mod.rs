//! The user-facing command mini-language and the workflow compiler.

mod parse;
mod workflow;

pub use parse::{parse_message, ParsedPrompt};
pub use workflow::{apply_model_config, WorkflowError, WorkflowLibrary};
