use serde::Serialize;

use crate::dag::DagNode;

/// One tool invocation inside a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolCallNode {
    /// Unique, non-empty identity
    pub call_id: String,
    pub tool_name: String,
    /// Free-form description of why the call is made
    pub call_intent: String,
    /// Declared dependencies, verbatim (duplicates and dangling ids kept)
    pub depends_on: Vec<String>,
    /// Whether a failure of this call still lets dependents run
    pub allow_failed: bool,
}

impl ToolCallNode {
    pub fn new(call_id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            call_intent: String::new(),
            depends_on: Vec::new(),
            allow_failed: false,
        }
    }

    pub fn with_call_intent(mut self, intent: impl Into<String>) -> Self {
        self.call_intent = intent.into();
        self
    }

    pub fn with_depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_allow_failed(mut self, allow_failed: bool) -> Self {
        self.allow_failed = allow_failed;
        self
    }

    /// `call_id(tool_name)`
    pub fn display_name(&self) -> String {
        format!("{}({})", self.call_id, self.tool_name)
    }
}

impl DagNode for ToolCallNode {
    fn id(&self) -> &str {
        &self.call_id
    }

    fn dependencies(&self) -> &[String] {
        &self.depends_on
    }

    fn allow_failed(&self) -> bool {
        self.allow_failed
    }

    fn label(&self) -> String {
        self.display_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name() {
        let node = ToolCallNode::new("call123", "search_tool");
        assert_eq!(node.display_name(), "call123(search_tool)");
        assert_eq!(node.label(), "call123(search_tool)");
    }

    #[test]
    fn test_builder_and_dag_node_view() {
        let node = ToolCallNode::new("b", "http_get")
            .with_call_intent("fetch the page")
            .with_depends_on(["a", "a"])
            .with_allow_failed(true);
        assert_eq!(node.id(), "b");
        assert_eq!(node.dependencies(), &["a".to_string(), "a".to_string()]);
        assert!(DagNode::allow_failed(&node));
        assert_eq!(node.call_intent, "fetch the page");
    }
}
