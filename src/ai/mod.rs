//! Script generation backends.

pub mod generator;

pub use generator::{GenerateError, OllamaGenerator, ScriptGenerator};
