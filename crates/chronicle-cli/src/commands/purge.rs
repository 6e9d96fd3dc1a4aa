use chronicle_memory::lifecycle::purge_conversation;
use clap::Parser;

use crate::context::{Context, collection_id};
use crate::error::CliResult;
use crate::output::{OutputFormat, print_json};

#[derive(Parser)]
pub struct PurgeCommand {
    #[clap(help = "Conversation id")]
    pub conversation: String,
}

impl PurgeCommand {
    pub async fn execute(&self, ctx: &Context, format: OutputFormat) -> CliResult<()> {
        let collection = collection_id(&self.conversation)?;
        let store = ctx.store().await?;
        let outcomes = purge_conversation(store.as_ref(), &[collection]).await;

        match format {
            OutputFormat::Json => print_json(&outcomes)?,
            OutputFormat::Table => {
                for outcome in &outcomes {
                    match &outcome.error {
                        None => println!("Purged {}", outcome.collection_id),
                        Some(e) => println!("Failed to purge {}: {}", outcome.collection_id, e),
                    }
                }
            }
        }

        if outcomes.iter().all(|o| o.is_ok()) {
            Ok(())
        } else {
            Err("Purge incomplete".into())
        }
    }
}
