//! easel - a tool-serving library for MCP-style servers
//!
//! Everything a server needs to expose schema-described tools to remote
//! callers:
//!
//! - **Schemas**: declare parameter sets as data ([`ValueSchema`] /
//!   [`ParamSpec`]) and get validation, default binding, and discovery
//!   schemas from one place
//! - **Registry**: own a set of tools and dispatch invocations against them
//! - **Composition**: merge registries — local or reached through a
//!   subprocess proxy — into one flat namespace
//! - **Transport**: streamable HTTP with `Mcp-Session-Id` sessions
//!
//! # Example
//!
//! ```rust,ignore
//! use easel::{Composite, McpState, ParamSpec, Registry, ToolDef, ValueSchema};
//! use std::sync::Arc;
//!
//! let mut tools = Registry::new("demo");
//! tools.register(
//!     ToolDef::new("greet", "Greet someone", ValueSchema::String, |args| async move {
//!         Ok(serde_json::json!(format!("hello {}", args["name"])))
//!     })
//!     .param(ParamSpec::new("name", ValueSchema::String)),
//! )?;
//!
//! let mut composite = Composite::new("server");
//! composite.mount(Arc::new(tools))?;
//!
//! let state = Arc::new(McpState::new(Arc::new(composite), "demo", "0.1.0"));
//! let router = easel::streamable_router(state);
//! ```

pub mod composite;
pub mod protocol;
pub mod proxy;
pub mod registry;
pub mod schema;
pub mod session;
pub mod transport;
pub mod types;

// Re-export commonly used types at crate root
pub use composite::{Composite, ToolSource};
pub use proxy::{ProxyError, ProxySource};
pub use registry::{Arguments, Registry, ToolDef, ToolError};
pub use schema::{OpaqueType, ParamSpec, SchemaError, ValueSchema, WireForm};
pub use session::{spawn_cleanup_task, InMemorySessionStore, Session, SessionStore};
pub use transport::{streamable_router, McpState, SESSION_HEADER};
pub use types::content::Content;
pub use types::error::ErrorData;
pub use types::jsonrpc::{JsonRpcMessage, RequestId};
pub use types::protocol::{Implementation, InitializeResult, ServerCapabilities};
pub use types::tool::{CallToolParams, CallToolResult, ListToolsResult, Tool, ToolSchema};
