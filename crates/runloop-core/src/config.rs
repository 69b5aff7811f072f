// Engine configuration
//
// EngineConfig bounds every external call: the turn loop (max_iterations),
// the backend request (backend_timeout), and each tool dispatch
// (tool_timeout). A missing timeout is treated as a resource leak, so all
// of them have defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the execution engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// System prompt prepended to every backend request
    pub system_prompt: String,

    /// Model identifier (e.g., "gpt-5.2", "claude-3-opus")
    pub model: String,

    /// Maximum number of tool-calling iterations (prevents unbounded cycles)
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Timeout for opening a backend request
    #[serde(default = "default_backend_timeout", with = "duration_secs")]
    pub backend_timeout: Duration,

    /// Timeout for a single tool invocation
    #[serde(default = "default_tool_timeout", with = "duration_secs")]
    pub tool_timeout: Duration,

    /// Temperature for backend sampling (0.0 - 2.0)
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate per response
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

fn default_max_iterations() -> usize {
    10
}

fn default_backend_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_tool_timeout() -> Duration {
    Duration::from_secs(60)
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

impl EngineConfig {
    /// Create a new engine configuration
    pub fn new(system_prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            model: model.into(),
            max_iterations: default_max_iterations(),
            backend_timeout: default_backend_timeout(),
            tool_timeout: default_tool_timeout(),
            temperature: None,
            max_tokens: None,
        }
    }

    /// Set maximum iterations
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the backend request timeout
    pub fn with_backend_timeout(mut self, timeout: Duration) -> Self {
        self.backend_timeout = timeout;
        self
    }

    /// Set the per-call tool timeout
    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Set temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set max tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new("You are a helpful assistant.", "gpt-5.2")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.backend_timeout, Duration::from_secs(120));
        assert_eq!(config.tool_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_builder_style() {
        let config = EngineConfig::new("Be terse.", "test-model")
            .with_max_iterations(3)
            .with_tool_timeout(Duration::from_secs(5));
        assert_eq!(config.max_iterations, 3);
        assert_eq!(config.tool_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_deserialization_fills_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"system_prompt": "", "model": "m"}"#).unwrap();
        assert_eq!(config.max_iterations, 10);
    }
}
