//! Tool trait and collection
//!
//! Tools are the narrow domain capabilities an analyst can invoke during a
//! run. The core treats them as opaque beyond this contract; concrete data
//! retrieval lives with external collaborators.

use crate::models::ToolResult;
use crate::Result;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Special tool name that ends an analyst's step loop.
pub const TERMINATE_TOOL: &str = "terminate";

/// Trait for a single tool invocation capability
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;

    /// JSON schema of the tool's parameters.
    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, arguments: &Value) -> Result<ToolResult>;
}

/// Ordered set of tools available to one analyst
#[derive(Clone, Default)]
pub struct ToolCollection {
    tools: Vec<Arc<dyn Tool>>,
    by_name: HashMap<String, Arc<dyn Tool>>,
}

impl ToolCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tools(tools: Vec<Arc<dyn Tool>>) -> Self {
        let mut collection = Self::new();
        for tool in tools {
            collection.register(tool);
        }
        collection
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.by_name.insert(tool.name().to_string(), tool.clone());
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.by_name.get(name).cloned()
    }

    pub fn list(&self) -> Vec<&str> {
        self.tools.iter().map(|tool| tool.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Chat-completion tool schemas for the whole collection.
    pub fn to_schemas(&self) -> Vec<Value> {
        self.tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name(),
                        "description": tool.description(),
                        "parameters": tool.parameters(),
                    }
                })
            })
            .collect()
    }

    /// Execute a named tool, capturing execution failures as a
    /// `ToolResult` error rather than propagating them.
    pub async fn execute(&self, name: &str, arguments: &Value) -> ToolResult {
        match self.get(name) {
            Some(tool) => match tool.execute(arguments).await {
                Ok(result) => result,
                Err(e) => ToolResult::err(e.to_string()),
            },
            None => ToolResult::err(format!("Tool not registered: {}", name)),
        }
    }
}

/// Built-in tool the model calls to end its run.
pub struct TerminateTool;

#[async_trait::async_trait]
impl Tool for TerminateTool {
    fn name(&self) -> &'static str {
        TERMINATE_TOOL
    }

    fn description(&self) -> &'static str {
        "End the current analysis once the report is complete"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "status": {
                    "type": "string",
                    "description": "Completion status",
                    "enum": ["success", "failure"]
                }
            },
            "required": ["status"]
        })
    }

    async fn execute(&self, arguments: &Value) -> Result<ToolResult> {
        let status = arguments
            .get("status")
            .and_then(|v| v.as_str())
            .unwrap_or("success");
        Ok(ToolResult::ok(json!({ "status": status })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait::async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn description(&self) -> &'static str {
            "Echo the arguments back"
        }

        async fn execute(&self, arguments: &Value) -> Result<ToolResult> {
            Ok(ToolResult::ok(arguments.clone()))
        }
    }

    struct BrokenTool;

    #[async_trait::async_trait]
    impl Tool for BrokenTool {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn description(&self) -> &'static str {
            "Always fails"
        }

        async fn execute(&self, _arguments: &Value) -> Result<ToolResult> {
            Err(crate::error::ResearchError::Tool(
                "upstream unavailable".to_string(),
            ))
        }
    }

    #[tokio::test]
    async fn collection_dispatches_by_name() {
        let collection =
            ToolCollection::with_tools(vec![Arc::new(EchoTool), Arc::new(TerminateTool)]);

        let result = collection.execute("echo", &json!({"k": 1})).await;
        assert_eq!(result.output, Some(json!({"k": 1})));
        assert_eq!(collection.list(), vec!["echo", "terminate"]);
    }

    #[tokio::test]
    async fn execution_failures_become_tool_result_errors() {
        let collection = ToolCollection::with_tools(vec![Arc::new(BrokenTool)]);

        let result = collection.execute("broken", &json!({})).await;
        assert!(result.is_error());
        assert!(result.error.unwrap().contains("upstream unavailable"));
    }

    #[tokio::test]
    async fn unknown_tool_is_a_tool_result_error() {
        let collection = ToolCollection::new();
        let result = collection.execute("missing", &json!({})).await;
        assert!(result.is_error());
    }

    #[test]
    fn schemas_carry_type_discriminator() {
        let collection = ToolCollection::with_tools(vec![Arc::new(TerminateTool)]);
        let schemas = collection.to_schemas();
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0]["type"], "function");
        assert_eq!(schemas[0]["function"]["name"], "terminate");
    }
}
