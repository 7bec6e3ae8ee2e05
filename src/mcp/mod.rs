//! Model Context Protocol (MCP) server implementation.
//!
//! Exposes preview-environment operations as MCP tools and service logs as
//! MCP resources. The server speaks JSON-RPC 2.0 over a line-delimited
//! transport (stdio by default).
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                          MCP Server                           │
//! │                                                               │
//! │   ┌─────────────┐    ┌──────────────┐    ┌──────────────┐     │
//! │   │  Transport  │───▶│    Server    │───▶│ Tools /      │     │
//! │   │   (stdio)   │    │ (middleware, │    │ Resources    │     │
//! │   └─────────────┘    │  dispatch)   │    └──────┬───────┘     │
//! │                      └──────────────┘           │             │
//! │                                                 ▼             │
//! │                                        ┌────────────────┐     │
//! │                                        │  Backend API   │     │
//! │                                        └────────────────┘     │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Collaborator failures are turned into [`error::ToolError`]s, which carry
//! the JSON-RPC code and a suggestion for the caller.
//!
//! # Protocol Version
//!
//! This implementation targets MCP protocol version 2024-11-05.

pub mod error;
pub mod middleware;
pub mod protocol;
pub mod resources;
pub mod server;
pub mod tools;
pub mod transport;

pub use error::{CallError, ErrorKind, ToolError};
pub use protocol::{
    ErrorCode, JsonRpcErrorData, JsonRpcRequest, JsonRpcResponse, RequestId, MCP_PROTOCOL_VERSION,
};
pub use server::{McpServer, ServerState};
pub use transport::{LineTransport, StdioTransport, Transport, TransportError};
