use anyhow::Result;
use clap::Parser;
use commerce_assistant::assistant::AssistantManager;
use commerce_assistant::config::Settings;
use commerce_assistant::health;
use commerce_assistant::llm::LlmClient;
use commerce_assistant::registry::SchemaRegistry;
use commerce_assistant::warehouse::{MemoryWarehouse, RetryingWarehouse};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "commerce-assistant")]
#[command(about = "Natural-language analytics assistant for e-commerce data")]
struct Args {
    /// The question to ask, in plain language
    message: String,

    /// Active platforms (repeatable)
    #[arg(short, long, default_value = "shopify")]
    platform: Vec<String>,

    /// Conversation identifier
    #[arg(short, long, default_value = "cli")]
    conversation: String,

    /// Path to the schema document tree
    #[arg(long)]
    schema_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut settings = Settings::from_env();
    if let Some(dir) = args.schema_dir {
        settings.schema_dir = dir;
    }

    let registry = SchemaRegistry::new();
    registry.initialize(&settings.schema_dir)?;

    // The CLI runs against the in-memory warehouse; a deployment wires in
    // the real warehouse client behind the same trait.
    let warehouse = Arc::new(RetryingWarehouse::new(
        MemoryWarehouse::new(),
        settings.max_retries,
        settings.retry_backoff,
    ));
    let llm = Arc::new(LlmClient::new(&settings));

    let status = health::health(&registry, warehouse.as_ref()).await;
    info!(?status, "assistant starting");

    let manager = AssistantManager::new(registry, warehouse, llm, settings);
    manager.load_memory().await.ok();

    let platforms: HashSet<String> = args.platform.into_iter().collect();
    let reply = manager
        .process_message(&args.message, &args.conversation, &platforms, None)
        .await;

    println!("{}", reply.message);
    if let Some(sql) = &reply.sql {
        println!("\n-- generated SQL --\n{}", sql);
    }

    manager.save_memory().await?;
    Ok(())
}
