//! Ollama-backed script generator.
//!
//! The generator produces raw, untrusted text from a shape description.
//! Everything it returns goes through the full repair pipeline; nothing
//! here is trusted to be valid code.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::GeneratorConfig;

/// Instructions sent ahead of every shape description. Kept strict so
/// the model has fewer ways to drift; the pipeline handles the drift
/// that happens anyway.
pub const SYSTEM_PROMPT: &str = r#"You are a specialized Text-to-CAD translator. Your ONLY goal is to output valid CadQuery Python code.

### CONSTRAINTS:
1. Output ONLY Python code. No conversational text, no markdown backticks, no explanations.
2. The final 3D object MUST be assigned to the variable 'result'.
3. Use 'mm' as the internal logic (CadQuery is unitless, assume 1 unit = 1mm).
4. Always start with 'import cadquery as cq'.

### CADQUERY SYNTAX RULES:
- Create base: `result = cq.Workplane("XY").box(length, width, height)`
- Select faces for features: Use `.faces(">Z")` for top, `"<Z"` for bottom, `">Y"` for back.
- To draw on a face: You MUST call `.workplane()` after selecting a face.
- Example for hole: `.faces(">Z").workplane().hole(diameter)`
- Filleting: `.edges().fillet(radius)`

### EXAMPLE OUTPUT FOR "A 10mm cube with a 5mm hole":
import cadquery as cq
result = cq.Workplane("XY").box(10, 10, 10).faces(">Z").workplane().hole(5)
"#;

/* ───────────────────────── errors ───────────────────────── */

#[derive(Debug)]
pub enum GenerateError {
    /// The backend could not be reached at all.
    Unavailable(String),
    /// The backend did not answer within the configured deadline.
    Timeout,
    /// The backend answered with something other than a usable completion.
    Protocol(String),
}

impl fmt::Display for GenerateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerateError::Unavailable(detail) => {
                write!(f, "generation backend unavailable: {detail}")
            }
            GenerateError::Timeout => write!(f, "generation backend timed out"),
            GenerateError::Protocol(detail) => {
                write!(f, "generation backend protocol error: {detail}")
            }
        }
    }
}

impl std::error::Error for GenerateError {}

/* ───────────────────────── trait ───────────────────────── */

/// Anything that turns a shape description into raw script text.
pub trait ScriptGenerator: Send + Sync {
    fn generate(&self, description: &str) -> Result<String, GenerateError>;
}

/* ───────────────────────── ollama ───────────────────────── */

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: String,
}

pub struct OllamaGenerator {
    client: reqwest::blocking::Client,
    cfg: GeneratorConfig,
}

impl OllamaGenerator {
    pub fn new(cfg: GeneratorConfig) -> Result<Self, GenerateError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| GenerateError::Unavailable(e.to_string()))?;
        Ok(Self { client, cfg })
    }
}

impl ScriptGenerator for OllamaGenerator {
    fn generate(&self, description: &str) -> Result<String, GenerateError> {
        let body = OllamaRequest {
            model: &self.cfg.model,
            prompt: format!("{SYSTEM_PROMPT}\n\nGenerate code for: {description}"),
            stream: false,
            options: OllamaOptions {
                temperature: 0.0,
                num_predict: self.cfg.num_predict,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.cfg.base_url))
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    GenerateError::Timeout
                } else if e.is_connect() {
                    GenerateError::Unavailable(e.to_string())
                } else {
                    GenerateError::Protocol(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(GenerateError::Protocol(format!(
                "status {}",
                response.status()
            )));
        }

        let parsed: OllamaResponse = response
            .json()
            .map_err(|e| GenerateError::Protocol(e.to_string()))?;
        if parsed.response.trim().is_empty() {
            return Err(GenerateError::Protocol("empty completion".to_string()));
        }
        Ok(parsed.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_name_the_failure() {
        assert!(GenerateError::Timeout.to_string().contains("timed out"));
        assert!(GenerateError::Unavailable("refused".into())
            .to_string()
            .contains("refused"));
        assert!(GenerateError::Protocol("status 500".into())
            .to_string()
            .contains("status 500"));
    }

    #[test]
    fn prompt_pins_the_output_contract() {
        assert!(SYSTEM_PROMPT.contains("'result'"));
        assert!(SYSTEM_PROMPT.contains("import cadquery as cq"));
    }
}
