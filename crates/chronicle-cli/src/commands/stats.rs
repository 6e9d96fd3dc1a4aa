use chronicle_memory::storage::VectorStore;
use clap::Parser;

use crate::context::{Context, collection_id};
use crate::error::CliResult;
use crate::output::{OutputFormat, new_table, print_json};

#[derive(Parser)]
pub struct StatsCommand {
    #[clap(help = "Conversation id")]
    pub conversation: String,
}

impl StatsCommand {
    pub async fn execute(&self, ctx: &Context, format: OutputFormat) -> CliResult<()> {
        let collection = collection_id(&self.conversation)?;
        let store = ctx.store().await?;
        let stats = store.stats(&collection).await?;

        match format {
            OutputFormat::Json => print_json(&stats),
            OutputFormat::Table => {
                println!("Chronicle Statistics: {}", stats.collection_id);
                println!("======================\n");

                if stats.total_chunks == 0 {
                    println!("No chunks stored.");
                    return Ok(());
                }

                let mut table = new_table(["Behavior", "Count"]);
                for (behavior, count) in &stats.by_behavior {
                    table.add_row([behavior.as_str(), &count.to_string()]);
                }
                println!("{table}\n");
                println!("Total: {} chunks", stats.total_chunks);
                Ok(())
            }
        }
    }
}
