//! Gateway: dispatch, discovery operations and the MCP request surface

mod dispatch;
mod envelope;
pub mod meta;
mod server;

pub use dispatch::Gateway;
pub use envelope::{Envelope, Failure};
pub use server::McpServer;
