//! Tool registry for managing available tools.

use std::convert::AsRef;
use std::sync::Arc;

use super::{Tool, ToolDescriptor};

type ToolList = Arc<Vec<Arc<dyn Tool>>>;

/// Registry mapping tool names to implementations.
///
/// Populated explicitly at agent construction; lookups after that are
/// read-only, so the registry is cheap to clone and share.
#[derive(Clone)]
pub struct ToolRegistry {
    tools: ToolList,
}

impl ToolRegistry {
    /// Create a new empty tool registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tools: Arc::new(Vec::new()),
        }
    }

    /// Add a tool to the registry.
    #[must_use]
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        Arc::make_mut(&mut self.tools).push(tool);
        self
    }

    /// Get a tool by name, if it exists.
    #[must_use]
    pub fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .iter()
            .find(|tool_ref| tool_ref.name() == name)
            .cloned()
    }

    /// List all available tools.
    #[must_use]
    pub fn list_tools(&self) -> Vec<&dyn Tool> {
        self.tools.iter().map(AsRef::as_ref).collect()
    }

    /// Build provider-agnostic descriptors for every registered tool.
    #[must_use]
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools
            .iter()
            .map(|tool| ToolDescriptor {
                name: tool.name().to_owned(),
                description: tool.description().to_owned(),
                parameters: tool.parameters(),
            })
            .collect()
    }

    /// Get number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ToolInput, ToolOutput, ToolResult};
    use async_trait::async_trait;
    use serde_json::{Value, json};

    struct MockTool {
        name: &'static str,
    }

    #[async_trait]
    impl Tool for MockTool {
        fn name(&self) -> &'static str {
            self.name
        }

        fn description(&self) -> &'static str {
            "A mock tool for testing"
        }

        fn parameters(&self) -> Value {
            json!({ "type": "object" })
        }

        async fn execute(&self, _input: ToolInput) -> ToolResult<ToolOutput> {
            Ok(ToolOutput::success("test"))
        }
    }

    /// Tests empty registry initialization.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_empty_registry() {
        let registry = ToolRegistry::default();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
        assert!(registry.descriptors().is_empty());
    }

    /// Tests adding a tool to the registry.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_add_tool() {
        let tool = Arc::new(MockTool { name: "test_tool" });
        let registry = ToolRegistry::default().with_tool(tool);

        assert_eq!(registry.len(), 1);
        assert!(!registry.is_empty());
    }

    /// Tests retrieving tools from the registry by name.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_get_tool() {
        let tool = Arc::new(MockTool { name: "test_tool" });
        let registry = ToolRegistry::default().with_tool(tool);

        assert!(registry.get_tool("test_tool").is_some());
        assert!(registry.get_tool("nonexistent").is_none());
    }

    /// Tests descriptor generation for registered tools.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_descriptors() {
        let tool1 = Arc::new(MockTool { name: "tool1" });
        let tool2 = Arc::new(MockTool { name: "tool2" });
        let registry = ToolRegistry::default().with_tool(tool1).with_tool(tool2);

        let descriptors = registry.descriptors();
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].name, "tool1");
        assert_eq!(descriptors[1].name, "tool2");
        assert!(descriptors[0].parameters.is_object());
    }
}
