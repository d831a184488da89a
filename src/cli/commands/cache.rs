//! Cache command - inspect and clear cache volumes and layer images

use crate::cache::CacheVolume;
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::config::Config;
use crate::container::LAYER_PREFIX;
use crate::error::MlpipeResult;
use crate::orchestration::{create_runtime, ContainerRuntime};
use crate::ui::{self, TaskSpinner, UiContext};
use console::style;
use serde::Serialize;
use tracing::debug;

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> MlpipeResult<()> {
    let runtime = create_runtime(config).await?;
    let ctx = UiContext::detect();

    match args.action {
        CacheAction::List { format } => {
            let inventory = Inventory::collect(runtime.as_ref()).await?;
            match format {
                OutputFormat::Table => inventory.print_table(),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&inventory)?),
                OutputFormat::Plain => inventory.print_plain(),
            }
            Ok(())
        }
        CacheAction::Clear { images, yes } => {
            clear(runtime.as_ref(), &ctx.with_auto_yes(yes), images).await?;
            Ok(())
        }
    }
}

/// Everything mlpipe has left in the engine
#[derive(Debug, Serialize)]
struct Inventory {
    volumes: Vec<CacheVolume>,
    images: Vec<String>,
}

impl Inventory {
    async fn collect(runtime: &dyn ContainerRuntime) -> MlpipeResult<Self> {
        let volumes = runtime
            .volume_list("")
            .await?
            .iter()
            .filter_map(|v| CacheVolume::from_labels(&v.name, &v.labels))
            .collect();
        let images = runtime.image_list_prefixed(LAYER_PREFIX).await?;

        Ok(Self { volumes, images })
    }

    fn is_empty(&self) -> bool {
        self.volumes.is_empty() && self.images.is_empty()
    }

    fn print_table(&self) {
        if self.volumes.is_empty() {
            println!("No cache volumes found.");
        } else {
            println!("{:<32} {:<28} {:<20}", "VOLUME", "PATH", "CREATED");
            println!("{}", "-".repeat(80));
            for volume in &self.volumes {
                println!(
                    "{:<32} {:<28} {:<20}",
                    volume.name,
                    volume.path,
                    volume.created_at.format("%Y-%m-%d %H:%M")
                );
            }
        }

        println!();
        println!(
            "Total: {} volume(s), {} layer image(s)",
            self.volumes.len(),
            self.images.len()
        );
    }

    fn print_plain(&self) {
        for volume in &self.volumes {
            println!("{}", volume.name);
        }
        for image in &self.images {
            println!("{}", image);
        }
    }
}

/// Remove cache volumes, and layer images when `images` is set.
///
/// Returns the number of removed objects; zero when the user declined.
async fn clear(runtime: &dyn ContainerRuntime, ctx: &UiContext, images: bool) -> MlpipeResult<usize> {
    let mut inventory = Inventory::collect(runtime).await?;
    if !images {
        inventory.images.clear();
    }

    if inventory.is_empty() {
        ui::step_info(ctx, "Nothing to clear");
        return Ok(0);
    }

    ui::section(ctx, "This will remove:");
    for volume in &inventory.volumes {
        eprintln!("  {} volume {}", style("•").red(), volume.name);
    }
    if !inventory.images.is_empty() {
        eprintln!(
            "  {} {} layer image(s)",
            style("•").red(),
            inventory.images.len()
        );
    }

    if !ui::confirm(ctx, "Remove these?", false).await? {
        ui::remark(ctx, "Aborted. Pass --yes to skip the prompt.");
        return Ok(0);
    }

    let mut spinner = TaskSpinner::new(ctx);
    spinner.start("Clearing caches...");

    let mut removed = 0;
    let result: MlpipeResult<()> = async {
        for volume in &inventory.volumes {
            debug!("Removing volume: {}", volume.name);
            runtime.volume_remove(&volume.name).await?;
            removed += 1;
        }
        for image in &inventory.images {
            debug!("Removing image: {}", image);
            runtime.image_remove(image).await?;
            removed += 1;
        }
        Ok(())
    }
    .await;

    if let Err(e) = result {
        spinner.stop_error(&format!("Stopped after removing {} object(s)", removed));
        return Err(e);
    }

    spinner.stop(&format!("Removed {} object(s)", removed));
    Ok(removed)
}
