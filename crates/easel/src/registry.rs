//! Tool registry and dispatcher.
//!
//! A [`Registry`] owns a set of named tools. Invocation goes through one
//! data-driven pipeline: look up the tool, conform every supplied argument
//! against its declared schema, bind defaults for omitted optional
//! parameters, run the handler, and conform the returned value against the
//! declared return schema. The registry is immutable once the server is up
//! and holds no lock across an invocation.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::schema::{object_schema_parts, ParamSpec, ValueSchema};
use crate::types::tool::{Tool, ToolSchema};

/// Argument map as received from and handed to tools.
pub type Arguments = Map<String, Value>;

type Handler = Arc<dyn Fn(Arguments) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Structured dispatch failures. Every caller-visible error is one of these;
/// nothing escapes unstructured.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("unknown tool `{0}`")]
    UnknownTool(String),

    #[error("duplicate tool `{0}`")]
    DuplicateTool(String),

    #[error("tool name collision on `{0}`")]
    NameCollision(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("operation failed: {0}")]
    OperationFailed(String),

    #[error("unexpected result type: {0}")]
    UnexpectedResultType(String),

    #[error("invalid tool definition: {0}")]
    InvalidDefinition(String),
}

impl ToolError {
    /// Stable machine-readable kind, preserved in error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::UnknownTool(_) => "unknown_tool",
            ToolError::DuplicateTool(_) => "duplicate_tool",
            ToolError::NameCollision(_) => "tool_name_collision",
            ToolError::InvalidArgument(_) => "invalid_argument",
            ToolError::OperationFailed(_) => "operation_failed",
            ToolError::UnexpectedResultType(_) => "unexpected_result_type",
            ToolError::InvalidDefinition(_) => "invalid_definition",
        }
    }
}

/// A named operation with its declared parameter set and return schema.
pub struct ToolDef {
    name: String,
    description: String,
    params: Vec<ParamSpec>,
    returns: ValueSchema,
    handler: Handler,
}

impl ToolDef {
    /// Define a tool. The handler receives the fully-resolved argument map
    /// (defaults bound, opaque wire policies enforced).
    ///
    /// A handler failure becomes `OperationFailed` unless the error is
    /// already a [`ToolError`], which passes through unchanged so result
    /// extraction can report `UnexpectedResultType` from inside a handler.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        returns: ValueSchema,
        handler: F,
    ) -> Self
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |args| Box::pin(handler(args)));
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
            returns,
            handler,
        }
    }

    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    pub fn params(mut self, specs: impl IntoIterator<Item = ParamSpec>) -> Self {
        self.params.extend(specs);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The discovery descriptor: name, description, and full schemas.
    pub fn descriptor(&self) -> Tool {
        let (properties, required) = object_schema_parts(&self.params);
        Tool::new(&self.name, &self.description)
            .with_input_schema(ToolSchema::object(properties, required))
            .with_output_schema(self.returns.json_schema())
    }

    /// Validate supplied arguments and bind defaults for everything omitted.
    fn resolve_arguments(&self, arguments: Arguments) -> Result<Arguments, ToolError> {
        let mut resolved = Arguments::new();

        for (key, value) in &arguments {
            let spec = self
                .params
                .iter()
                .find(|p| p.name == *key)
                .ok_or_else(|| {
                    ToolError::InvalidArgument(format!(
                        "unknown argument `{}` for tool `{}`",
                        key, self.name
                    ))
                })?;
            let conformed = spec.schema.conform(value).map_err(|e| {
                ToolError::InvalidArgument(format!("argument `{}`: {}", key, e))
            })?;
            resolved.insert(key.clone(), conformed);
        }

        for spec in &self.params {
            if resolved.contains_key(&spec.name) {
                continue;
            }
            match spec.omitted_value() {
                Some(value) => {
                    resolved.insert(spec.name.clone(), value);
                }
                None => {
                    return Err(ToolError::InvalidArgument(format!(
                        "missing required argument `{}` for tool `{}`",
                        spec.name, self.name
                    )));
                }
            }
        }

        Ok(resolved)
    }
}

impl std::fmt::Debug for ToolDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDef")
            .field("name", &self.name)
            .field("params", &self.params.len())
            .finish()
    }
}

/// An owned collection of tools for one capability group.
#[derive(Debug, Default)]
pub struct Registry {
    name: String,
    tools: Vec<ToolDef>,
    index: HashMap<String, usize>,
}

impl Registry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a tool. Tools are immutable once registered.
    pub fn register(&mut self, def: ToolDef) -> Result<(), ToolError> {
        let mut seen = HashSet::new();
        for param in &def.params {
            if !seen.insert(param.name.as_str()) {
                return Err(ToolError::InvalidDefinition(format!(
                    "parameter `{}` declared twice on tool `{}`",
                    param.name, def.name
                )));
            }
        }
        if self.index.contains_key(&def.name) {
            return Err(ToolError::DuplicateTool(def.name.clone()));
        }
        self.index.insert(def.name.clone(), self.tools.len());
        self.tools.push(def);
        Ok(())
    }

    /// Discovery descriptors in registration order.
    pub fn descriptors(&self) -> Vec<Tool> {
        self.tools.iter().map(ToolDef::descriptor).collect()
    }

    /// Execute an invocation request against a registered tool.
    pub async fn dispatch(&self, name: &str, arguments: Arguments) -> Result<Value, ToolError> {
        let def = self
            .index
            .get(name)
            .map(|&i| &self.tools[i])
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        let resolved = def.resolve_arguments(arguments)?;

        tracing::debug!(tool = %name, "dispatching tool call");
        let result = (def.handler)(resolved).await.map_err(|error| {
            match error.downcast::<ToolError>() {
                Ok(tool_error) => tool_error,
                Err(other) => ToolError::OperationFailed(format!("{:#}", other)),
            }
        })?;

        def.returns.conform(&result).map_err(|e| {
            ToolError::UnexpectedResultType(format!("tool `{}` returned {}", name, e))
        })
    }
}
