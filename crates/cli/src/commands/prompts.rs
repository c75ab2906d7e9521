//! Prompts command handler.

use clap::Args;
use feedmind_core::{config::AppConfig, AppResult};
use feedmind_prompt::{list_prompts, load_prompt};

/// List the prompt definitions available in this workspace
#[derive(Args, Debug)]
pub struct PromptsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl PromptsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let ids = list_prompts(&config.workspace)?;
        tracing::debug!("Found {} prompt(s)", ids.len());

        let mut rows = Vec::with_capacity(ids.len());
        for id in ids {
            match load_prompt(&config.workspace, &id) {
                Ok(def) => rows.push((id, def.title)),
                Err(e) => tracing::warn!("Skipping prompt {}: {}", id, e),
            }
        }

        if self.json {
            let output: Vec<_> = rows
                .iter()
                .map(|(id, title)| serde_json::json!({ "id": id, "title": title }))
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            for (id, title) in rows {
                println!("{:<24} {}", id, title);
            }
        }

        Ok(())
    }
}
