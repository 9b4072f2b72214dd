//! MCP (Model Context Protocol) client side.
//!
//! - [`protocol`]: JSON-RPC envelopes and capability descriptors
//! - [`transport`]: stdio, HTTP and SSE transports
//! - [`client`]: handshake, discovery and id-correlated requests
//! - [`manager`]: connects configured servers and registers their tools
//! - [`wrapper`]: exposes one remote tool through the `Tool` trait

pub mod client;
pub mod manager;
pub mod protocol;
pub mod transport;
pub mod wrapper;

pub use client::McpClient;
pub use manager::McpManager;
pub use protocol::{Envelope, RemotePrompt, RemoteResource, RemoteTool, RequestId, RpcError};
pub use transport::{HttpTransport, SseTransport, StdioTransport, Transport};
pub use wrapper::McpToolWrapper;
