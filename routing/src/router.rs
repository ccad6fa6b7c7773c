//! Router: classify, resolve, invoke, wrap.
//!
//! The router is stateless per request: it holds the read-only registry and
//! the invoker, and every call to [`Router::route`] is independent. Failures
//! never escape as `Err`; they come back as a [`RouterResponse`] with
//! `status: error`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::classifier::{TaskCategory, TaskClassifier};
use crate::config::RouterConfig;
use crate::error::{ErrorKind, ProtocolError, RouterError};
use crate::gateway::ProtocolGateway;
use crate::invoker::ResilientInvoker;
use crate::query::Query;
use crate::registry::{BackendProfile, BackendRegistry};

/// Category and backend chosen for one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingDecision {
    pub category: TaskCategory,
    pub profile: BackendProfile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Ok,
    Error,
}

/// Caller-facing result of one routed query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterResponse {
    pub request_id: Uuid,
    pub status: ResponseStatus,
    pub category: TaskCategory,
    /// Absent only when no profile could be resolved.
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub attempts: u32,
}

impl RouterResponse {
    fn success(
        request_id: Uuid,
        category: TaskCategory,
        model_id: &str,
        text: String,
        attempts: u32,
    ) -> Self {
        Self {
            request_id,
            status: ResponseStatus::Ok,
            category,
            model_id: Some(model_id.to_string()),
            text: Some(text),
            error_kind: None,
            message: None,
            attempts,
        }
    }

    fn failure(
        request_id: Uuid,
        category: TaskCategory,
        model_id: Option<&str>,
        error: &RouterError,
        attempts: u32,
    ) -> Self {
        Self {
            request_id,
            status: ResponseStatus::Error,
            category,
            model_id: model_id.map(str::to_string),
            text: None,
            error_kind: Some(error.kind()),
            message: Some(error.to_string()),
            attempts,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }
}

/// Orchestrates classifier → registry → invoker.
#[derive(Clone)]
pub struct Router {
    classifier: TaskClassifier,
    registry: Arc<BackendRegistry>,
    invoker: ResilientInvoker,
}

impl Router {
    pub fn new(registry: BackendRegistry, invoker: ResilientInvoker) -> Self {
        Self {
            classifier: TaskClassifier::new(),
            registry: Arc::new(registry),
            invoker,
        }
    }

    /// Validated registry and retry policy from `config`, calls through `gateway`.
    pub fn from_config(
        config: &RouterConfig,
        gateway: Arc<dyn ProtocolGateway>,
    ) -> Result<Self, RouterError> {
        let registry = config.registry()?;
        Ok(Self::new(registry, ResilientInvoker::new(gateway, config.retry)))
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub fn invoker(&self) -> &ResilientInvoker {
        &self.invoker
    }

    /// Classify and resolve without invoking anything.
    pub fn decide(&self, query: &Query) -> Result<RoutingDecision, RouterError> {
        let category = self.classifier.classify(query);
        let profile = self.registry.resolve(category)?.clone();
        Ok(RoutingDecision { category, profile })
    }

    pub async fn route(&self, query: &Query) -> RouterResponse {
        self.route_with_cancel(query, &CancellationToken::new())
            .await
    }

    pub async fn route_with_cancel(
        &self,
        query: &Query,
        cancel: &CancellationToken,
    ) -> RouterResponse {
        let classification = self.classifier.classify_with_signals(query);
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "route",
            request_id = %request_id,
            category = %classification.category,
        );
        async {
            tracing::info!(
                signals = ?classification.signals,
                attachments = query.attachments.len(),
                preview = %query.preview(80),
                "query classified"
            );
            self.dispatch(request_id, classification.category, query, cancel)
                .await
        }
        .instrument(span)
        .await
    }

    /// Route to an explicitly named category, skipping classification.
    pub async fn route_to(&self, category: TaskCategory, query: &Query) -> RouterResponse {
        self.route_to_with_cancel(category, query, &CancellationToken::new())
            .await
    }

    pub async fn route_to_with_cancel(
        &self,
        category: TaskCategory,
        query: &Query,
        cancel: &CancellationToken,
    ) -> RouterResponse {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "route_to",
            request_id = %request_id,
            category = %category,
        );
        async {
            if category == TaskCategory::VisionLanguage && !query.has_image() {
                let err = RouterError::Protocol(ProtocolError::malformed(
                    "vision_language requires at least one image attachment",
                ));
                tracing::warn!(error = %err, "rejected before invocation");
                let model_id = self.registry.resolve(category).ok().map(|p| p.model_id.as_str());
                return RouterResponse::failure(request_id, category, model_id, &err, 0);
            }
            self.dispatch(request_id, category, query, cancel).await
        }
        .instrument(span)
        .await
    }

    async fn dispatch(
        &self,
        request_id: Uuid,
        category: TaskCategory,
        query: &Query,
        cancel: &CancellationToken,
    ) -> RouterResponse {
        let profile = match self.registry.resolve(category) {
            Ok(profile) => profile,
            Err(err) => return RouterResponse::failure(request_id, category, None, &err, 0),
        };

        let result = self.invoker.invoke_with_cancel(profile, query, cancel).await;
        let attempts = result.attempt_count();

        match result.outcome {
            Ok(text) => {
                tracing::info!(
                    model = %profile.model_id,
                    attempts,
                    state = %result.state,
                    "request completed"
                );
                RouterResponse::success(request_id, category, &profile.model_id, text, attempts)
            }
            Err(err) => {
                tracing::warn!(
                    model = %profile.model_id,
                    attempts,
                    state = %result.state,
                    error_kind = %err.kind(),
                    error = %err,
                    "request failed"
                );
                RouterResponse::failure(
                    request_id,
                    category,
                    Some(&profile.model_id),
                    &err,
                    attempts,
                )
            }
        }
    }
}
