use std::collections::HashMap;
use std::future::ready;

use quill_model::{ModelTool, ToolCallRequest};

use crate::tool::{BoxedToolFuture, Error, ToolObject};

/// An executor that handles tool call requests from the model.
///
/// Tools keep their registration order, which is also the order they are
/// presented to the model.
#[derive(Default)]
pub struct Executor {
    tools: Vec<Box<dyn ToolObject>>,
    index: HashMap<String, usize>,
}

impl Executor {
    pub fn with_tools(tools: Vec<Box<dyn ToolObject>>) -> Self {
        let mut executor = Self::default();
        for tool in tools {
            executor.add(tool);
        }
        executor
    }

    fn add(&mut self, tool: Box<dyn ToolObject>) {
        let name = tool.name().to_owned();
        match self.index.get(&name) {
            Some(&idx) => {
                warn!("tool {name} is registered twice, the last one wins");
                self.tools[idx] = tool;
            }
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    #[inline]
    pub fn definitions(&self) -> Vec<ModelTool> {
        self.tools.iter().map(|tool| tool.definition()).collect()
    }

    /// Starts every request through `spawner`, in order.
    ///
    /// Requests for unknown tools are still spawned, with a future that
    /// resolves to an error the model can read.
    pub fn handle_requests<'a, S>(
        &self,
        requests: impl IntoIterator<Item = &'a ToolCallRequest>,
        mut spawner: S,
    ) where
        S: FnMut(&'a ToolCallRequest, BoxedToolFuture),
    {
        let span = debug_span!("tool executor");
        let _enter = span.enter();
        for req in requests {
            let fut = match self.index.get(&req.name) {
                Some(&idx) => {
                    trace!(
                        "spawning a tool ({}) with args: {:?}",
                        req.id, req.arguments
                    );
                    self.tools[idx].execute(req.arguments.clone())
                }
                None => {
                    warn!("tool not found: {}", req.name);
                    Box::pin(ready(Err(Error::unknown_tool(&req.name))))
                        as BoxedToolFuture
                }
            };
            spawner(req, fut);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future::ready;

    use serde_json::{Value, json};

    use super::*;
    use crate::tool::{AnyTool, Tool, ToolResult};

    struct TestTool {
        name: &'static str,
        parameter_schema: Value,
    }

    impl TestTool {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                parameter_schema: json!({ "type": "object" }),
            }
        }
    }

    impl Tool for TestTool {
        type Input = serde_json::Value;

        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "A test tool"
        }

        fn parameter_schema(&self) -> &Value {
            &self.parameter_schema
        }

        fn execute(
            &self,
            _input: Self::Input,
        ) -> impl Future<Output = ToolResult> + Send + 'static {
            ready(Ok(format!("{} succeeded", self.name)))
        }
    }

    #[tokio::test]
    async fn test_handle_requests() {
        let executor = Executor::with_tools(vec![
            Box::new(AnyTool(TestTool::new("test_tool"))),
            Box::new(AnyTool(TestTool::new("other_tool"))),
        ]);
        let names: Vec<_> =
            executor.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, ["test_tool", "other_tool"]);

        let requests = vec![
            ToolCallRequest {
                id: "tool:1".to_owned(),
                name: "test_tool".to_owned(),
                arguments: json!({}),
            },
            ToolCallRequest {
                id: "tool:2".to_owned(),
                name: "read_tool".to_owned(),
                arguments: json!({}),
            },
        ];

        let mut spawned = vec![];
        executor.handle_requests(&requests, |req, fut| {
            spawned.push((req.id.clone(), fut));
        });
        assert_eq!(spawned.len(), 2);

        let (id, fut) = spawned.remove(0);
        assert_eq!(id, "tool:1");
        assert_eq!(fut.await, Ok("test_tool succeeded".to_owned()));

        // Unknown tools resolve to an error instead of being skipped.
        let (id, fut) = spawned.remove(0);
        assert_eq!(id, "tool:2");
        let err = fut.await.unwrap_err();
        assert_eq!(err.kind(), crate::tool::ErrorKind::UnknownTool);
    }

    #[test]
    fn test_duplicate_tools() {
        let executor = Executor::with_tools(vec![
            Box::new(AnyTool(TestTool::new("test_tool"))),
            Box::new(AnyTool(TestTool::new("test_tool"))),
        ]);
        assert_eq!(executor.definitions().len(), 1);
    }
}
