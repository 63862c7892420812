use anyhow::Result;
use console::{style, Emoji};

use crate::config::AppConfig;
use crate::db::{MetadataStore, SqliteMetadataStore, VideoStatus};
use crate::pipeline::VideoIndex;

static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "");

pub async fn run_status(config: &AppConfig) -> Result<()> {
    let prefix = config.index_prefix();

    if !VideoIndex::artifacts_present(&prefix) {
        println!("{}No active index at {}", INFO, prefix.display());
        println!("Run `framefinder process <video>` to build one.");
        return Ok(());
    }

    let index = VideoIndex::load(&prefix)?;
    println!("\n{}Active index: {}\n", INFO, prefix.display());
    println!("  Chunks:          {}", style(index.len()).green());
    println!("  Dimensions:      {}", style(index.dimensions()).cyan());
    if let (Some(first), Some(last)) = (index.timestamps().first(), index.timestamps().last()) {
        println!(
            "  Time range:      {:.1}s to {:.1}s",
            style(first).dim(),
            style(last).dim()
        );
    }

    // Metadata is best-effort here; the index artifacts are the source of
    // truth for what is searchable.
    if let Ok(store) = SqliteMetadataStore::connect(&config.database_url()).await {
        let videos = store.list_videos().await?;
        if !videos.is_empty() {
            println!("\n{}Processed videos:", INFO);
            for video in videos {
                let status = match video.status {
                    VideoStatus::Indexed => style(format!("{:?}", video.status)).green(),
                    VideoStatus::Pending => style(format!("{:?}", video.status)).yellow(),
                    VideoStatus::Failed => style(format!("{:?}", video.status)).red(),
                };
                println!(
                    "  {} [{}] {} chunks",
                    style(&video.file_name).bold(),
                    status,
                    video.total_chunks
                );
            }
        }
    }

    Ok(())
}
