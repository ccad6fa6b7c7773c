//! MCP tool server exposing the router over stdio.
//!
//! Tools:
//! - `route`: classify and dispatch
//! - `math_code`, `vl_mode`, `light_mode`: dispatch to one backend directly
//! - `list_backends`: registry contents

use std::sync::Arc;

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router, ServerHandler,
};
use serde::Deserialize;

use crate::classifier::TaskCategory;
use crate::query::{Attachment, Query};
use crate::router::{Router, RouterResponse};

/// Request parameters shared by every routing tool.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct RouteRequest {
    #[schemars(
        description = "The task in natural language. Inline image URLs (png, jpg, jpeg, gif, webp, bmp) are treated as attachments"
    )]
    pub query: String,
    #[schemars(description = "Optional: image URLs or data URIs to attach, in order")]
    pub image_urls: Option<Vec<String>>,
}

impl RouteRequest {
    fn into_query(self) -> Query {
        let mut query = Query::parse(&self.query);
        for url in self.image_urls.unwrap_or_default() {
            let url = url.trim();
            if !url.is_empty() {
                query = query.with_attachment(Attachment::image(url));
            }
        }
        query
    }
}

#[derive(Clone)]
pub struct RouterServer {
    router: Arc<Router>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl RouterServer {
    pub fn new(router: Arc<Router>) -> Self {
        Self {
            router,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        description = "Route a task to the best-suited model: image questions go to the vision model, math/proof/code/debugging to the reasoning model, everything else to the light model. Returns a JSON response with status, category, model_id and text."
    )]
    async fn route(
        &self,
        Parameters(req): Parameters<RouteRequest>,
    ) -> Result<String, String> {
        let query = req.into_query();
        render(self.router.route(&query).await)
    }

    #[tool(
        description = "Send a task straight to the math/code reasoning model. Best for proofs, algorithm analysis, step-by-step computation and debugging."
    )]
    async fn math_code(
        &self,
        Parameters(req): Parameters<RouteRequest>,
    ) -> Result<String, String> {
        self.dispatch(TaskCategory::MathCode, req).await
    }

    #[tool(
        description = "Ask the vision-language model about one or more images. At least one image (image_urls or an inline URL) is required."
    )]
    async fn vl_mode(
        &self,
        Parameters(req): Parameters<RouteRequest>,
    ) -> Result<String, String> {
        self.dispatch(TaskCategory::VisionLanguage, req).await
    }

    #[tool(
        description = "Send a task straight to the light model: polishing, translation, summarization, extraction and format conversion."
    )]
    async fn light_mode(
        &self,
        Parameters(req): Parameters<RouteRequest>,
    ) -> Result<String, String> {
        self.dispatch(TaskCategory::Light, req).await
    }

    #[tool(description = "List the configured backend profile for each task category.")]
    async fn list_backends(&self) -> Result<String, String> {
        let profiles: Vec<_> = self.router.registry().profiles().collect();
        serde_json::to_string_pretty(&profiles).map_err(|e| e.to_string())
    }
}

impl RouterServer {
    async fn dispatch(&self, category: TaskCategory, req: RouteRequest) -> Result<String, String> {
        let query = req.into_query();
        render(self.router.route_to(category, &query).await)
    }
}

/// Error responses go back as tool errors so clients flag them.
fn render(response: RouterResponse) -> Result<String, String> {
    let json = serde_json::to_string_pretty(&response).map_err(|e| e.to_string())?;
    if response.is_ok() {
        Ok(json)
    } else {
        Err(json)
    }
}

#[tool_handler]
impl ServerHandler for RouterServer {
    fn get_info(&self) -> ServerInfo {
        let instructions = "Task router over specialized model backends.\n\
             - route: automatic classification (vision > math/code > light)\n\
             - math_code: reasoning model for proofs, algorithms, computation, debugging\n\
             - vl_mode: vision-language model, requires at least one image\n\
             - light_mode: fast model for polishing, translation, summarization\n\
             - list_backends: configured model per category\n\
             Every routing tool returns JSON with request_id, status, category, model_id, \
             attempts and either text or error_kind/message.";

        ServerInfo {
            instructions: Some(instructions.to_string()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
