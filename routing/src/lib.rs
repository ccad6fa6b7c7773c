//! Multi-model task routing library
//!
//! Routes a natural-language task to one of several specialized model
//! backends, invoked as named tools through a protocol gateway.
//!
//! # Pipeline
//!
//! ```text
//! Query ─→ TaskClassifier ─→ BackendRegistry ─→ ResilientInvoker ─→ RouterResponse
//!          (category)         (profile)          (timeout, retry,
//!                                                 backoff, cancel)
//! ```
//!
//! # Categories
//!
//! | Category          | Tool         | Triggered by                                  |
//! |-------------------|--------------|-----------------------------------------------|
//! | `vision_language` | `vl_mode`    | any image attachment                          |
//! | `math_code`       | `math_code`  | proofs, complexity, debugging, code, numerics |
//! | `light`           | `light_mode` | everything else                               |
//!
//! # Usage
//!
//! ```bash
//! # MCP server on stdio
//! routing-mcp --config router.toml
//!
//! # Environment overrides
//! ROUTER_BASE_URL=http://localhost:8000/v1 ROUTER_MAX_ATTEMPTS=5 routing-mcp
//! ```

pub mod chat_gateway;
pub mod classifier;
pub mod config;
pub mod error;
pub mod gateway;
pub mod invoker;
pub mod prompts;
pub mod query;
pub mod registry;
pub mod router;
pub mod server;

pub use chat_gateway::ChatCompletionsGateway;
pub use classifier::{Classification, Signal, TaskCategory, TaskClassifier};
pub use config::{ApiConfig, ModelConfig, RetryPolicy, RouterConfig};
pub use error::{ErrorKind, ProtocolError, ProtocolErrorKind, RouterError};
pub use gateway::{ProtocolGateway, ToolDescriptor};
pub use invoker::{
    AttemptOutcome, InvocationAttempt, InvocationResult, InvocationState, ResilientInvoker,
};
pub use query::{Attachment, Query};
pub use registry::{BackendProfile, BackendRegistry};
pub use router::{ResponseStatus, Router, RouterResponse, RoutingDecision};
pub use server::RouterServer;
