//! Wire types shared by the transports and the dispatch layer.

pub mod content;
pub mod error;
pub mod jsonrpc;
pub mod protocol;
pub mod tool;

pub use content::Content;
pub use error::ErrorData;
pub use jsonrpc::{JsonRpcMessage, RequestId};
pub use protocol::{Implementation, InitializeParams, InitializeResult, ServerCapabilities};
pub use tool::{CallToolParams, CallToolResult, ListToolsResult, Tool, ToolSchema};
