//! Faust MCP Server
//!
//! Exposes the Faust compiler (version, help, C++ compilation, block
//! diagrams, spectrograms) to AI assistants via the Model Context Protocol.
//! Implements MCP over stdio using JSON-RPC 2.0.

pub mod protocol;
pub mod server;
pub mod tools;

pub use server::McpServer;
