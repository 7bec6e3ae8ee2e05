//! envops-mcp: MCP server exposing preview-environment operations to AI agents
//!
//! An AI assistant connects over stdio and gets tools for inspecting and
//! driving ephemeral preview environments hosted by a remote platform, plus
//! a resource for reading service logs.
//!
//! # Architecture
//!
//! - **Protocol**: JSON-RPC 2.0 framing, lifecycle and dispatch
//! - **Tools**: environment lifecycle, organizations, services, volumes,
//!   snapshots, logs and Telepresence guidance
//! - **Backend**: an HTTP client for the platform API, behind a trait so
//!   tests can replace it
//!
//! Every failure reaching the client is classified (validation, not found,
//! permission, conflict, network, server) and carries a suggestion.
//!
//! # Modules
//!
//! - [`api`]: Backend API client and domain managers
//! - [`config`]: Configuration loading and validation
//! - [`error`]: Error types
//! - [`mcp`]: MCP protocol implementation

pub mod api;
pub mod config;
pub mod error;
pub mod mcp;
