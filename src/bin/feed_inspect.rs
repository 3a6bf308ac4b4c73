use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use discourse_notifier::config;
use discourse_notifier::feed::{DiscourseClient, FeedSource};

/// Fetch the live taxonomy and print it without touching the database.
#[derive(Parser, Debug)]
struct Args {
    /// Path to YAML config
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let cfg = config::load(Some(&args.config))?;
    let client = DiscourseClient::from_config(&cfg.discourse)?;

    let feed = client.fetch().await?;
    println!("Categories ({}):", feed.categories.len());
    for name in &feed.categories {
        println!("  {}", name);
    }
    println!("Tags ({}):", feed.tags.len());
    for name in &feed.tags {
        println!("  {}", name);
    }
    Ok(())
}
