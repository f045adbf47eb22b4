use ai_topic_shorts::config::Config;
use ai_topic_shorts::generator::Studio;
use ai_topic_shorts::init;
use ai_topic_shorts::render::ProgressFn;
use ai_topic_shorts::scene::{AspectRatio, Topic};
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    init::ensure_directories().await?;
    if !init::check_ffmpeg().await {
        eprintln!("[WARNING] FFmpeg not found in PATH. Export will fail until it is installed.");
    }

    let mut args = std::env::args().skip(1);
    let Some(title) = args.next() else {
        eprintln!("usage: ai-topic-shorts <topic> [16:9|9:16] [language]");
        std::process::exit(2);
    };
    let aspect = match args.next().as_deref() {
        Some("9:16") => AspectRatio::Tall,
        _ => AspectRatio::Wide,
    };

    let config = Config::load("config.json").await?;
    let language = args.next().unwrap_or_else(|| config.narration_language.clone());

    let studio = Studio::new(config)?;
    let production = studio
        .run_production(Topic {
            title,
            language,
            aspect,
        })
        .await?;

    print!("{}", studio.summarize(&production));

    let manifest = Path::new("output").join("assets.txt");
    studio.write_asset_manifest(&production, &manifest).await?;

    let progress: ProgressFn = Arc::new(|frac: f32| {
        eprintln!("[RENDER] {:>3.0}%", frac * 100.0);
    });
    let artifact = studio.exporter().export(&production, progress).await?;
    println!("{}", artifact.display());

    Ok(())
}
