use anyhow::{Context, Result, anyhow};
use casting::cli::ServiceOptions;
use casting::config::setup_logging;
use casting::download::{download_filename, fetch_poster};
use casting::poster::{PosterGenerator, Presentation};
use chrono::Utc;
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

/// Cast a headshot without the browser.
///
///   cast_photo me.jpg Explorer Mastermind Classic
#[derive(Parser, Debug)]
#[command(name = "cast_photo")]
#[command(about = "Pick an archetype for a set of answer tags and render a poster from a photo")]
struct Args {
    /// JPEG or PNG headshot
    photo: PathBuf,

    /// Answer tags, in the order they were picked
    #[arg(required = true)]
    tags: Vec<String>,

    /// How to cast the subject
    #[arg(long, value_enum, default_value = "actor")]
    presentation: Presentation,

    /// Where the poster is saved
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    #[command(flatten)]
    services: ServiceOptions,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(args.debug).map_err(|err| anyhow!("Logging setup failed: {err}"))?;

    let upload = fs::read(&args.photo)
        .with_context(|| format!("Failed to read {}", args.photo.display()))?;
    let photo = PosterGenerator::prepare(&upload)
        .with_context(|| format!("{} is not a usable headshot", args.photo.display()))?;
    let catalog = Arc::new(args.services.catalog()?);
    let services = args.services.services(catalog.clone())?;

    let verdict = services.resolver.resolve(&args.tags).await;
    eprintln!("Cast as {}: {}", verdict.label, verdict.reason);
    let archetype = catalog
        .archetype(&verdict.label)
        .ok_or_else(|| anyhow!("Verdict {} is not in the catalog", verdict.label))?;

    let poster_url = services
        .posters
        .generate(&photo, archetype, args.presentation)
        .await
        .context("Poster generation failed")?;
    let poster = fetch_poster(&services.http, &poster_url)
        .await
        .context("Poster download failed")?;

    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("Failed to create {}", args.out_dir.display()))?;
    let output_filename = args.out_dir.join(download_filename(
        &verdict.label,
        &poster.content_type,
        Utc::now().date_naive(),
    ));
    fs::write(&output_filename, &poster.bytes)
        .with_context(|| format!("Failed to write {}", output_filename.display()))?;

    eprintln!("Saved: {}", output_filename.display());
    Ok(())
}
