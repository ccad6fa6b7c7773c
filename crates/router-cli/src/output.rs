//! Terminal rendering for router responses.

use routing::{ResponseStatus, RouterResponse, ToolDescriptor};

/// Human-readable block for one response.
pub fn render_response(response: &RouterResponse) -> String {
    let model = response.model_id.as_deref().unwrap_or("-");
    let header = format!(
        "[{} → {}] attempts: {}",
        response.category, model, response.attempts
    );
    match response.status {
        ResponseStatus::Ok => format!(
            "{header}\n\n{}",
            response.text.as_deref().unwrap_or_default()
        ),
        ResponseStatus::Error => {
            let kind = response
                .error_kind
                .map(|k| k.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            format!(
                "{header}\nerror ({kind}): {}",
                response.message.as_deref().unwrap_or("no details")
            )
        }
    }
}

/// Pretty JSON, falling back to the human form if serialization fails.
pub fn render_json(response: &RouterResponse) -> String {
    serde_json::to_string_pretty(response).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to serialize response");
        render_response(response)
    })
}

pub fn render_tools(tools: &[ToolDescriptor]) -> String {
    let width = tools.iter().map(|t| t.name.len()).max().unwrap_or(0);
    tools
        .iter()
        .map(|t| format!("  {:<width$}  {}", t.name, t.description))
        .collect::<Vec<_>>()
        .join("\n")
}
