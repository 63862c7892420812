use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use console::{style, Emoji};
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::AppConfig;
use crate::pipeline::{load_encoder, DurableHolder, Extractor, IndexHolder, Indexer, VideoIndex};

static INDEXING: Emoji<'_, '_> = Emoji("🎞  ", "");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "");

pub async fn run_process(config: &AppConfig, file: &Path) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("video file not found: {}", file.display());
    }
    std::fs::create_dir_all(&config.data_dir)?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.enable_steady_tick(std::time::Duration::from_millis(100));

    pb.set_message("Loading encoder...");
    let encoder = load_encoder(&config.encoder)?;

    let holder: Arc<dyn IndexHolder> = Arc::new(DurableHolder::open(config.index_prefix())?);
    let indexer = Indexer::new(
        Extractor::new(config.chunking.clone()),
        encoder,
        holder,
    );

    pb.set_message(format!("{}Indexing {}...", INDEXING, file.display()));
    let report = indexer.index_video(file)?;
    pb.finish_and_clear();

    let (vectors_path, timestamps_path) = VideoIndex::artifact_paths(&config.index_prefix());
    println!("\n{}Video indexed!\n", SUCCESS);
    println!("  Chunks indexed:  {}", style(report.chunks_indexed).green());
    println!(
        "  Chunk window:    {}s every {}s",
        style(config.chunking.chunk_duration).cyan(),
        style(config.chunking.chunk_duration - config.chunking.overlap).cyan()
    );
    println!("  Artifacts:       {}", vectors_path.display());
    println!("                   {}", timestamps_path.display());

    Ok(())
}
