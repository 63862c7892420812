use std::sync::Arc;

use anyhow::Result;
use console::{style, Emoji};

use crate::config::AppConfig;
use crate::pipeline::{load_encoder, DurableHolder, IndexHolder, Resolver, VideoIndex};

static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "");
static CLOCK: Emoji<'_, '_> = Emoji("⏱  ", "");

pub async fn run_search(config: &AppConfig, query: &str, top_k: usize) -> Result<()> {
    if !VideoIndex::artifacts_present(&config.index_prefix()) {
        anyhow::bail!("No index found. Run `framefinder process <video>` first to build one.");
    }

    let encoder = load_encoder(&config.encoder)?;
    let holder: Arc<dyn IndexHolder> = Arc::new(DurableHolder::open(config.index_prefix())?);
    let resolver = Resolver::new(encoder, holder, config.resolver.clone());

    let results = resolver.resolve_top_k(query, top_k.max(1))?;

    println!(
        "\n{}Best {} for: {}\n",
        SEARCH,
        if results.len() == 1 { "moment" } else { "moments" },
        style(query).yellow().bold()
    );
    for (i, result) in results.iter().enumerate() {
        println!(
            "{} {}. {} to {}",
            CLOCK,
            style(i + 1).dim(),
            style(format!("{:.2}s", result.start_time)).green(),
            style(format!("{:.2}s", result.end_time)).green(),
        );
    }
    println!();

    Ok(())
}
