//! Protocol gateway seam.
//!
//! The router only needs "call tool T with arguments A and get a payload or
//! an error back". Session setup, capability discovery and transport framing
//! stay behind this trait.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Descriptor for a remote capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object.
    pub input_schema: serde_json::Value,
}

/// Narrow surface the invoker depends on.
///
/// Implementations must treat every `call_tool` as independent: if a pooled
/// connection was lost, the next call re-acquires one instead of failing.
#[async_trait]
pub trait ProtocolGateway: Send + Sync {
    /// Capabilities currently exposed by the backend side.
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ProtocolError>;

    /// Invoke `name` with a JSON arguments object.
    ///
    /// `timeout` is advisory for the transport; the invoker enforces its own
    /// deadline around the whole call.
    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
        timeout: Duration,
    ) -> Result<String, ProtocolError>;
}
