use std::path::PathBuf;

use chronicle_memory::lifecycle::Reconciler;
use clap::Parser;

use crate::context::{Context, collection_id, read_summary};
use crate::error::CliResult;
use crate::output::{OutputFormat, new_table, print_json};

#[derive(Parser)]
pub struct IngestCommand {
    #[clap(help = "Conversation id")]
    pub conversation: String,

    #[clap(help = "Summary text file")]
    pub file: PathBuf,

    #[clap(long, help = "First message index the summary covers")]
    pub start: u64,

    #[clap(long, help = "Last message index the summary covers")]
    pub end: u64,

    #[clap(long = "keyword", help = "Keyword attached to every chunk (repeatable)")]
    pub keywords: Vec<String>,
}

impl IngestCommand {
    pub async fn execute(&self, ctx: &Context, format: OutputFormat) -> CliResult<()> {
        if self.end < self.start {
            return Err(format!("--end ({}) is before --start ({})", self.end, self.start).into());
        }
        let collection = collection_id(&self.conversation)?;
        let text = read_summary(&self.file)?;

        let store = ctx.store().await?;
        let reconciler = Reconciler::new(store, ctx.config.lifecycle.clone());
        let report = reconciler
            .index_summary(&collection, &text, self.start, self.end, &self.keywords)
            .await?;

        match format {
            OutputFormat::Json => print_json(&serde_json::json!({
                "collection_id": collection,
                "report": report,
            })),
            OutputFormat::Table => {
                let mut table = new_table(["Change", "Count"]);
                table.add_row(["Superseding replaced", &report.superseding_replaced.to_string()]);
                table.add_row(["Cumulative added", &report.cumulative_added.to_string()]);
                table.add_row(["Rolling updated", &report.rolling_updated.to_string()]);
                table.add_row(["Rolling purged", &report.rolling_purged.to_string()]);
                println!("Ingested into {collection}\n");
                println!("{table}");
                Ok(())
            }
        }
    }
}
