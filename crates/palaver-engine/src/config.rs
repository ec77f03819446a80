use serde::{Deserialize, Serialize};

/// Turn-pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Guardrail on model->tool->model round trips within one turn.
    /// Exceeding it ends the turn with `Failed("tool_loop_exceeded")`.
    pub max_tool_iterations: usize,
    /// Bound on the turn event channel
    pub channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            temperature: Some(0.7),
            max_tokens: Some(4096),
            system_prompt: None,
            max_tool_iterations: 10,
            channel_capacity: 256,
        }
    }
}

impl EngineConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = Some(tokens);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_tool_iterations(mut self, max: usize) -> Self {
        self.max_tool_iterations = max;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_bounded() {
        let config = EngineConfig::default();
        assert!(config.max_tool_iterations > 0);
        assert!(config.channel_capacity > 0);
    }

    #[test]
    fn builder_style_overrides() {
        let config = EngineConfig::new("gpt-4o-mini")
            .with_temperature(0.2)
            .with_max_tool_iterations(3);
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.temperature, Some(0.2));
        assert_eq!(config.max_tool_iterations, 3);
    }
}
