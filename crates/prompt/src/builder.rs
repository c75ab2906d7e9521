//! Prompt builder for rendering templates.

use crate::types::{BuiltPrompt, BuiltPromptMetadata, PromptDefinition};
use feedmind_core::{AppError, AppResult};
use handlebars::Handlebars;
use serde_json::Value;

/// Build a prompt from a definition and a JSON object of variables.
///
/// Both the system and the user template are rendered against the same
/// variables. Missing variables render as empty strings.
///
/// # Example
/// ```no_run
/// use feedmind_prompt::{build_prompt, builtin_prompt};
/// use serde_json::json;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let def = builtin_prompt("agentic.aggregate")?;
/// let built = build_prompt(&def, &json!({ "query": "What is RxJS?" }))?;
/// println!("User prompt: {}", built.user);
/// # Ok(())
/// # }
/// ```
pub fn build_prompt(definition: &PromptDefinition, variables: &Value) -> AppResult<BuiltPrompt> {
    tracing::debug!("Building prompt: {}", definition.id);

    let system = match definition.system {
        Some(ref template) => Some(render_template(template, variables)?),
        None => None,
    };
    let user = render_template(&definition.template, variables)?;

    let resolved_variables = variables
        .as_object()
        .map(|map| map.keys().cloned().collect())
        .unwrap_or_default();

    Ok(BuiltPrompt {
        system,
        user,
        metadata: BuiltPromptMetadata {
            source_prompt_id: definition.id.clone(),
            resolved_variables,
        },
    })
}

/// Render a Handlebars template with variables.
fn render_template(template: &str, variables: &Value) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Plain text output, no HTML escaping
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    handlebars
        .render("prompt", variables)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))
}
