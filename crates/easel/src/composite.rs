//! Tool-set composition.
//!
//! A [`Composite`] merges independently-owned tool sources into one flat
//! namespace. Sources are registry-shaped: anything implementing
//! [`ToolSource`] mounts the same way, whether it dispatches in-process or
//! forwards across a subprocess boundary. The composite never special-cases
//! by origin.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::registry::{Arguments, Registry, ToolError};
use crate::types::tool::Tool;

/// The registry-shaped seam between the dispatch surface and tool owners.
///
/// Descriptors are fixed at mount time (proxies fetch the remote list when
/// they are constructed), so `tools` is synchronous; only `invoke` crosses
/// an await point.
#[async_trait]
pub trait ToolSource: Send + Sync {
    /// Name of this source, for logs and mount errors.
    fn source_name(&self) -> &str;

    /// Discovery descriptors for every tool this source owns.
    fn tools(&self) -> Vec<Tool>;

    /// Execute an invocation request against one of this source's tools.
    async fn invoke(&self, name: &str, arguments: Arguments) -> Result<Value, ToolError>;
}

#[async_trait]
impl ToolSource for Registry {
    fn source_name(&self) -> &str {
        self.name()
    }

    fn tools(&self) -> Vec<Tool> {
        self.descriptors()
    }

    async fn invoke(&self, name: &str, arguments: Arguments) -> Result<Value, ToolError> {
        self.dispatch(name, arguments).await
    }
}

/// Union of several tool sources under one dispatch surface.
///
/// Mounting happens once during startup; there is no runtime remounting.
pub struct Composite {
    name: String,
    sources: Vec<Arc<dyn ToolSource>>,
    owners: HashMap<String, usize>,
}

impl Composite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sources: Vec::new(),
            owners: HashMap::new(),
        }
    }

    /// Mount every tool of `source` into the composite.
    ///
    /// The mount is atomic: if any incoming name is already owned (or appears
    /// twice in the incoming set), nothing is mounted and the composite is
    /// left exactly as it was.
    pub fn mount(&mut self, source: Arc<dyn ToolSource>) -> Result<(), ToolError> {
        let incoming = source.tools();

        let mut names = Vec::with_capacity(incoming.len());
        for tool in &incoming {
            if self.owners.contains_key(&tool.name) || names.contains(&tool.name) {
                return Err(ToolError::NameCollision(tool.name.clone()));
            }
            names.push(tool.name.clone());
        }

        let slot = self.sources.len();
        tracing::info!(
            source = source.source_name(),
            tools = names.len(),
            "mounting tool source"
        );
        for name in names {
            self.owners.insert(name, slot);
        }
        self.sources.push(source);
        Ok(())
    }

    /// The source that owns `name`, for dispatch.
    pub fn resolve(&self, name: &str) -> Result<&Arc<dyn ToolSource>, ToolError> {
        self.owners
            .get(name)
            .map(|&slot| &self.sources[slot])
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))
    }

    /// Union of descriptors across all mounted sources, in mount order.
    pub fn descriptors(&self) -> Vec<Tool> {
        self.sources.iter().flat_map(|s| s.tools()).collect()
    }
}

#[async_trait]
impl ToolSource for Composite {
    fn source_name(&self) -> &str {
        &self.name
    }

    fn tools(&self) -> Vec<Tool> {
        self.descriptors()
    }

    async fn invoke(&self, name: &str, arguments: Arguments) -> Result<Value, ToolError> {
        let source = self.resolve(name)?;
        source.invoke(name, arguments).await
    }
}
