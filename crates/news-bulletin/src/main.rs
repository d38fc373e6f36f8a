use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use shared::{
    build_oracle, load_feeds, BroadcastSynthesizer, BulletinGenerator, Config, ContentResolver,
    FeedFetcher, OracleRole, PdfRenderer, SimilarityJudge, SpeechSynthesizer, StoryClusterer,
};
use std::time::Duration;
use tracing::error;
use tracing_subscriber::EnvFilter;

const SECONDS_PER_HOUR: u64 = 3600;

#[derive(Parser)]
#[command(name = "news-bulletin")]
#[command(about = "Build a Greek news bulletin from the most covered stories in a set of RSS feeds")]
struct Args {
    /// Hours to wait between runs; omit for a single run
    #[arg(allow_hyphen_values = true)]
    interval: Option<String>,

    #[arg(hide = true, allow_hyphen_values = true)]
    extra: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Schedule {
    Once,
    EveryHours(u64),
}

impl Schedule {
    fn from_args(args: &Args) -> Result<Self, String> {
        if !args.extra.is_empty() {
            return Err("Expected at most one argument: the number of hours between runs".to_string());
        }

        match args.interval.as_deref() {
            None => Ok(Schedule::Once),
            Some(value) => match value.trim().parse::<u64>() {
                Ok(hours) if hours > 0 && hours.checked_mul(SECONDS_PER_HOUR).is_some() => {
                    Ok(Schedule::EveryHours(hours))
                }
                _ => Err(format!(
                    "Invalid interval '{}': give a positive whole number of hours",
                    value
                )),
            },
        }
    }
}

const DEFAULT_LOG_FILTER: &str = "shared=info,news_bulletin=info";

/// A valid `RUST_LOG` replaces the defaults entirely
fn log_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn init_tracing() {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(log_filter(rust_log.as_deref()))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // Usage problems are reported but never fail the process
            let _ = e.print();
            return Ok(());
        }
    };
    let schedule = match Schedule::from_args(&args) {
        Ok(schedule) => schedule,
        Err(message) => {
            eprintln!("✗ {}", message);
            return Ok(());
        }
    };

    let config = Config::from_env().context("Invalid configuration")?;

    match schedule {
        Schedule::Once => {
            println!("▶ Single bulletin run");
            run(&config).await
        }
        Schedule::EveryHours(hours) => {
            println!("▶ Running every {} hour(s)", hours);
            loop {
                if let Err(e) = run(&config).await {
                    error!(error = %format!("{:#}", e), "Bulletin run failed");
                }
                println!("\n⏸ Next run in {} hour(s)", hours);
                tokio::time::sleep(Duration::from_secs(hours * SECONDS_PER_HOUR)).await;
            }
        }
    }
}

async fn run(config: &Config) -> Result<()> {
    println!("\n🕒 Started: {}", Local::now().format("%Y-%m-%d %H:%M:%S"));

    let feed_urls = load_feeds(&config.feeds_file).context("Failed to load feed list")?;
    println!("\n📰 Fetching {} feeds...", feed_urls.len());
    let fetcher = FeedFetcher::new()?;
    let articles = fetcher
        .fetch_articles(&feed_urls, config.articles_per_feed)
        .await;
    println!("✓ Collected {} headlines", articles.len());

    let judge_oracle = build_oracle(config, OracleRole::Classification)?;
    let broadcast_oracle = build_oracle(config, OracleRole::Broadcast)?;

    println!(
        "\n🤖 Grouping headlines with {} ({:?})...",
        config.classification_model, config.engine
    );
    let judge = SimilarityJudge::new(judge_oracle.as_ref(), config.classification_model.clone());
    let clusterer = StoryClusterer::new(judge, config);
    let outcome = clusterer
        .cluster(&articles)
        .await
        .context("Clustering failed")?;
    println!(
        "✓ {} comparisons, {} merges, {} stories selected",
        outcome.comparisons,
        outcome.merges,
        outcome
            .selection
            .last()
            .map(|row| row.rank + 1)
            .unwrap_or(0)
    );

    let mut rows = outcome.selection;

    println!("\n✍ Writing bulletin with {}...", config.broadcast_model);
    let resolver = ContentResolver::new()?;
    let synthesizer = BroadcastSynthesizer::new(broadcast_oracle.as_ref(), config);
    let segments = synthesizer.synthesize(&resolver, &mut rows).await;
    println!("✓ {} stories written", segments.len());

    let now = Local::now().naive_local();
    let pdf = PdfRenderer::from_config(config);
    let artifacts = BulletinGenerator::save_bulletin(&segments, &config.output_dir, now, &pdf)
        .await
        .context("Failed to save bulletin")?;
    println!("\n💾 Saved {}", artifacts.markdown.display());
    if let Some(html) = &artifacts.html {
        println!("  ✓ {}", html.display());
    }
    match &artifacts.pdf {
        Some(pdf) => println!("  ✓ {}", pdf.display()),
        None => println!("  ⚠ PDF could not be produced"),
    }

    println!("\n🔊 Recording narration...");
    let narration = BulletinGenerator::prepare_for_speech(&BulletinGenerator::generate_narration(&segments));
    let audio_path = artifacts.audio_path();
    let tts = SpeechSynthesizer::from_config(config);
    match tts.synthesize(&narration, &audio_path).await {
        Ok(()) => println!("  ✓ {}", audio_path.display()),
        Err(e) => {
            error!(error = %format!("{:#}", e), "Speech synthesis failed");
            println!("  ⚠ Narration could not be produced");
        }
    }

    println!("\n🕒 Finished: {}", Local::now().format("%Y-%m-%d %H:%M:%S"));
    Ok(())
}
