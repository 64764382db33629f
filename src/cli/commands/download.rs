//! The download command: submit one job and follow it to completion.

use std::sync::Arc;

use anyhow::{anyhow, bail, Context};

use crate::config::Config;
use crate::model::ContentType;
use crate::pipeline::Pipeline;
use crate::quality::Quality;
use crate::queue::{DownloadQueue, QueueEvent};

/// Submit the request, stream progress to stdout, and exit when the job
/// reaches a terminal state. Ctrl-C cancels the job instead of killing the
/// process mid-write.
pub async fn cmd_download(
    config: &Config,
    content_type: ContentType,
    content_id: &str,
    quality: Quality,
) -> anyhow::Result<()> {
    if config.credentials.app_id.is_empty() || config.credentials.app_secret.is_empty() {
        bail!(
            "catalog credentials are not configured; set credentials.app_id / app_secret / user_auth_token in {}",
            crate::config::config_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "the config file".to_string())
        );
    }

    let pipeline = Arc::new(Pipeline::from_config(config));
    let queue = DownloadQueue::new(pipeline, config.download.concurrency);
    let mut events = queue.subscribe();

    let receipt = queue
        .submit(content_type, content_id, quality, None)
        .context("submission rejected")?;
    println!("Queued {content_type} {content_id} at {quality} (position {})", receipt.queue_position);

    let mut last_reported = 0u8;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\nCancelling...");
                queue.cancel(receipt.id);
            }
            event = events.recv() => match event {
                Ok(QueueEvent::ItemProgress { id, percent, status }) if id == receipt.id => {
                    // One line per decile keeps batch output readable
                    if percent >= last_reported + 10 || percent == 100 {
                        last_reported = percent - percent % 10;
                        println!("  {status} {percent}%");
                    }
                    if status == crate::model::QueueStatus::Cancelled {
                        bail!("download cancelled");
                    }
                }
                Ok(QueueEvent::ItemCompleted { id, path }) if id == receipt.id => {
                    match path {
                        Some(path) => println!("Completed: {}", path.display()),
                        None => println!("Completed"),
                    }
                    return Ok(());
                }
                Ok(QueueEvent::ItemFailed { id, reason }) if id == receipt.id => {
                    if let Some(item) = queue.item(receipt.id) {
                        if let Some(title) = item.title {
                            eprintln!("Failed: {title}");
                        }
                    }
                    return Err(anyhow!("download failed: {reason}"));
                }
                Ok(_) => {}
                Err(e) => return Err(anyhow!("event stream closed: {e}")),
            }
        }
    }
}
