use std::marker::PhantomData;

use schemars::{JsonSchema, schema_for};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::tool::{Tool, ToolResult};

/// A tool backed by an async function.
///
/// The parameter schema is derived from the input type with `schemars`:
///
/// ```
/// use quill_core::tool::FunctionTool;
/// use schemars::JsonSchema;
/// use serde::Deserialize;
///
/// #[derive(Deserialize, JsonSchema)]
/// struct Input {
///     /// The text to reverse.
///     text: String,
/// }
///
/// let tool = FunctionTool::new("reverse", "Reverses text.", |input: Input| async move {
///     let reversed: String = input.text.chars().rev().collect();
///     Ok::<_, quill_core::tool::Error>(reversed)
/// });
/// ```
pub struct FunctionTool<I, F> {
    name: String,
    description: String,
    parameter_schema: Value,
    func: F,
    _input: PhantomData<fn(I)>,
}

impl<I, F, Fut> FunctionTool<I, F>
where
    I: JsonSchema + DeserializeOwned + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ToolResult> + Send + 'static,
{
    /// Creates a tool named `name` that runs `func`.
    pub fn new<N, D>(name: N, description: D, func: F) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameter_schema: schema_for!(I).to_value(),
            func,
            _input: PhantomData,
        }
    }
}

impl<I, F, Fut> Tool for FunctionTool<I, F>
where
    I: JsonSchema + DeserializeOwned + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ToolResult> + Send + 'static,
{
    type Input = I;

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        input: I,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        (self.func)(input)
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::tool::{AnyTool, Error, ToolObject};

    #[derive(Deserialize, JsonSchema)]
    struct AddInput {
        /// The first operand.
        a: i64,
        /// The second operand.
        b: i64,
    }

    fn add_tool() -> FunctionTool<AddInput, impl Fn(AddInput) -> std::future::Ready<ToolResult> + Send + Sync>
    {
        FunctionTool::new("add", "Adds two integers.", |input: AddInput| {
            std::future::ready(
                input
                    .a
                    .checked_add(input.b)
                    .map(|sum| sum.to_string())
                    .ok_or_else(|| {
                        Error::execution_error().with_reason("overflow")
                    }),
            )
        })
    }

    #[test]
    fn test_schema_is_derived() {
        let definition = AnyTool(add_tool()).definition();
        assert_eq!(definition.name, "add");
        assert_eq!(definition.description, "Adds two integers.");
        assert_eq!(definition.parameters["type"], "object");
        assert_eq!(
            definition.parameters["properties"]["a"]["description"],
            "The first operand."
        );
        assert_eq!(definition.parameters["required"], json!(["a", "b"]));
    }

    #[tokio::test]
    async fn test_execute() {
        let tool = AnyTool(add_tool());
        assert_eq!(
            tool.execute(json!({ "a": 2, "b": 2 })).await,
            Ok("4".to_owned())
        );

        let err = tool.execute(json!({ "a": 2 })).await.unwrap_err();
        assert_eq!(err.kind(), crate::tool::ErrorKind::InvalidInput);

        let err = tool
            .execute(json!({ "a": i64::MAX, "b": 1 }))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "overflow");
    }
}
