use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use palaver_llm::Tool;

/// A tool the model can call during a turn.
///
/// `invoke` returns `Ok` for anything the model should see, including
/// domain errors encoded as an `{"error": ...}` payload. An `Err` is
/// reserved for invocation-level failures (unknown tool, bad arguments)
/// and is converted into an error payload by the turn loop, never a
/// turn abort.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema for the tool's arguments object
    fn parameters(&self) -> Value;

    async fn invoke(&self, arguments: Value) -> Result<Value>;
}

/// Registry of tools exposed to the model for a turn.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool, replacing any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn ToolHandler>) {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
    }

    pub fn with_tool(mut self, tool: Arc<dyn ToolHandler>) -> Self {
        self.register(tool);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Function definitions in the shape the chat API expects.
    pub fn definitions(&self) -> Vec<Tool> {
        self.tools
            .iter()
            .map(|t| Tool::new(t.name(), t.description(), t.parameters()))
            .collect()
    }

    pub async fn invoke(&self, name: &str, arguments: Value) -> Result<Value> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| anyhow!("unknown tool '{name}'"))?;
        tool.invoke(arguments).await
    }
}

#[derive(Debug, Deserialize)]
struct CalculatorArgs {
    first_num: f64,
    second_num: f64,
    operation: String,
}

/// Four-function arithmetic over two operands.
///
/// Division by zero and unsupported operations come back as error
/// payloads so the model can relay them conversationally.
pub struct CalculatorTool;

#[async_trait]
impl ToolHandler for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Perform basic arithmetic (add, subtract, multiply, divide) on two numbers"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "first_num": {
                    "type": "number",
                    "description": "The first operand"
                },
                "second_num": {
                    "type": "number",
                    "description": "The second operand"
                },
                "operation": {
                    "type": "string",
                    "enum": ["add", "subtract", "multiply", "divide"],
                    "description": "The arithmetic operation to perform"
                }
            },
            "required": ["first_num", "second_num", "operation"]
        })
    }

    async fn invoke(&self, arguments: Value) -> Result<Value> {
        let args: CalculatorArgs = serde_json::from_value(arguments)?;

        let result = match args.operation.as_str() {
            "add" => args.first_num + args.second_num,
            "subtract" => args.first_num - args.second_num,
            "multiply" => args.first_num * args.second_num,
            "divide" => {
                if args.second_num == 0.0 {
                    return Ok(json!({ "error": "Division by zero is not allowed" }));
                }
                args.first_num / args.second_num
            }
            other => {
                return Ok(json!({ "error": format!("Unsupported operation '{other}'") }));
            }
        };

        Ok(json!({
            "first_num": args.first_num,
            "second_num": args.second_num,
            "operation": args.operation,
            "result": result,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn calculator_adds() {
        let result = CalculatorTool
            .invoke(json!({ "first_num": 2.0, "second_num": 3.0, "operation": "add" }))
            .await
            .unwrap();
        assert_eq!(result["result"], json!(5.0));
    }

    #[tokio::test]
    async fn calculator_division_by_zero_is_an_error_payload() {
        let result = CalculatorTool
            .invoke(json!({ "first_num": 1.0, "second_num": 0.0, "operation": "divide" }))
            .await
            .unwrap();
        assert_eq!(result["error"], json!("Division by zero is not allowed"));
    }

    #[tokio::test]
    async fn calculator_rejects_malformed_arguments() {
        let err = CalculatorTool
            .invoke(json!({ "first_num": "two" }))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid type"));
    }

    #[tokio::test]
    async fn registry_reports_unknown_tools() {
        let registry = ToolRegistry::new();
        let err = registry.invoke("missing", json!({})).await.unwrap_err();
        assert!(err.to_string().contains("unknown tool"));
    }

    #[tokio::test]
    async fn registry_replaces_tools_by_name() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(CalculatorTool));
        registry.register(Arc::new(CalculatorTool));
        assert_eq!(registry.len(), 1);
    }
}
