//! Prompt rendering for raw `completions` deployments.
//!
//! Chat-style deployments send structured messages; plain completion servers
//! need the conversation flattened into a single prompt string. The template
//! is handlebars, overridable per model, defaulting to ChatML.

use handlebars::Handlebars;
use serde::Serialize;

use super::{EndpointError, EndpointMessage};

pub(crate) const DEFAULT_PROMPT_TEMPLATE: &str = "\
{{#if preprompt}}<|im_start|>system\n{{preprompt}}<|im_end|>\n{{/if}}\
{{#each messages}}<|im_start|>{{role}}\n{{content}}<|im_end|>\n{{/each}}\
<|im_start|>assistant\n";

#[derive(Serialize)]
struct PromptContext<'a> {
    preprompt: &'a str,
    messages: Vec<PromptMessage<'a>>,
}

#[derive(Serialize)]
struct PromptMessage<'a> {
    role: &'static str,
    content: &'a str,
}

pub(crate) struct PromptTemplate {
    registry: Handlebars<'static>,
}

impl PromptTemplate {
    /// Compile the model's template, or the ChatML default when none is set.
    /// Fails at construction so a broken template never reaches request time.
    pub(crate) fn compile(template: Option<&str>) -> anyhow::Result<Self> {
        let mut registry = Handlebars::new();
        // Prompts are model input, not HTML.
        registry.register_escape_fn(handlebars::no_escape);
        registry.register_template_string("prompt", template.unwrap_or(DEFAULT_PROMPT_TEMPLATE))?;
        Ok(Self { registry })
    }

    pub(crate) fn render(
        &self,
        preprompt: Option<&str>,
        messages: &[EndpointMessage],
    ) -> Result<String, EndpointError> {
        let context = PromptContext {
            preprompt: preprompt.unwrap_or(""),
            messages: messages
                .iter()
                .map(|message| PromptMessage {
                    role: message.role.as_str(),
                    content: &message.content,
                })
                .collect(),
        };
        self.registry
            .render("prompt", &context)
            .map_err(|err| EndpointError::InvalidRequest(format!("prompt template: {err}")))
    }
}
