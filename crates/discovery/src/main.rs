/// Clip discovery binary: run the pipeline over a transcript JSON file
use std::path::PathBuf;

use anyhow::{bail, Context};
use tracing::info;

use clip_common::RawTranscript;
use clip_discovery::{ClipDiscovery, DiscoverOptions, DiscoveryConfig};
use clip_selection::Platform;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!(
            "Usage: {} <episode-id> <transcript.json> [config.yaml] [--platform <name>] [--no-llm]",
            args[0]
        );
        std::process::exit(1);
    }

    let episode_id = args[1].clone();
    let transcript_path = PathBuf::from(&args[2]);

    let mut config_path: Option<PathBuf> = None;
    let mut platform: Option<Platform> = None;
    let mut no_llm = false;

    let mut i = 3;
    while i < args.len() {
        match args[i].as_str() {
            "--platform" => {
                let name = args
                    .get(i + 1)
                    .context("--platform requires a platform name")?;
                platform = Some(
                    Platform::from_name(name)
                        .with_context(|| format!("unknown platform: {name}"))?,
                );
                i += 2;
            }
            "--no-llm" => {
                no_llm = true;
                i += 1;
            }
            other if config_path.is_none() => {
                config_path = Some(PathBuf::from(other));
                i += 1;
            }
            other => bail!("unexpected argument: {other}"),
        }
    }

    let mut config = match config_path {
        Some(path) => DiscoveryConfig::from_yaml(&path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => DiscoveryConfig::default(),
    };
    if no_llm {
        config = config.without_llm();
    }

    let json = std::fs::read_to_string(&transcript_path)
        .with_context(|| format!("failed to read {}", transcript_path.display()))?;
    let transcript: RawTranscript =
        serde_json::from_str(&json).context("transcript JSON did not match the input contract")?;

    info!(
        episode_id = %episode_id,
        transcript = %transcript_path.display(),
        words = transcript.words.len(),
        "Loaded transcript"
    );

    let engine = ClipDiscovery::new(config)?;
    let opts = DiscoverOptions {
        platform,
        ..DiscoverOptions::default()
    };

    let clips = engine.discover_clips(&episode_id, &transcript, &opts).await?;

    println!("\n=== Discovered Clips ===");
    println!("Episode: {episode_id}");
    println!("Clips: {}", clips.len());
    for clip in &clips {
        println!(
            "\n{} [{} - {}] ({:.1}s, score {:.2}, bucket {})",
            clip.id,
            format_ms(clip.start_ms),
            format_ms(clip.end_ms),
            clip.duration_ms as f64 / 1000.0,
            clip.score,
            clip.bucket_name
        );
        if let Some(title) = &clip.title {
            println!("  Title:   {title}");
        }
        if let Some(caption) = &clip.caption {
            println!("  Caption: {caption}");
        }
        if !clip.hashtags.is_empty() {
            println!("  Tags:    {}", clip.hashtags.join(" "));
        }
    }

    Ok(())
}

/// mm:ss.mmm for log-friendly timestamps
fn format_ms(ms: i64) -> String {
    let total_seconds = ms / 1000;
    format!(
        "{:02}:{:02}.{:03}",
        total_seconds / 60,
        total_seconds % 60,
        ms % 1000
    )
}
