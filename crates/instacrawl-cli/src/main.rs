use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use instacrawl_core::FetchError;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "instacrawl", version, about = "Download a profile's posts and build index.json")]
struct Cli {
    /// Profile to crawl
    username: String,

    /// Max posts to download (0 = no limit)
    #[arg(long, default_value_t = 10)]
    count: u32,

    /// Output directory root
    #[arg(long, default_value = "downloads")]
    output: PathBuf,

    /// Only rebuild index.json from existing downloads
    #[arg(long)]
    skip_fetch: bool,

    /// Fetcher program to run
    #[arg(long, default_value = "instaloader")]
    fetcher: PathBuf,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "instacrawl_core=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let t_total = std::time::Instant::now();

    let mut options = instacrawl_core::CrawlOptions::new(cli.username);
    options.output_root = cli.output;
    options.count = (cli.count > 0).then_some(cli.count);
    options.fetch = !cli.skip_fetch;

    let fetcher = instacrawl_core::InstaloaderFetcher::new(cli.fetcher);

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner} [{prefix}] {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(120));

    let spinner = pb.clone();
    let result = instacrawl_core::run(&options, &fetcher, &move |stage, current, total, message| {
        spinner.set_prefix(stage.to_string());
        if total > 0 {
            spinner.set_message(format!("{}/{} {}", current + 1, total, message));
        } else {
            spinner.set_message(message.to_string());
        }
    });
    pb.finish_and_clear();
    let result = result?;

    match &result.fetch_error {
        Some(err @ FetchError::Launch { .. }) => {
            println!("{}", err);
            println!("  Install instaloader or point --fetcher at it; indexing existing downloads.");
        }
        Some(err) => println!("{}", err),
        None => {}
    }
    if let Some(fetch) = &result.fetch {
        let note = if fetch.capped { " (count reached)" } else { "" };
        println!("Fetched {} posts for {}{}", fetch.posts_seen, options.username, note);
    }

    match &result.index {
        None => println!("Directory {} not found. Nothing to index.", options.target_dir().display()),
        Some(report) => {
            for outcome in &report.outcomes {
                if let instacrawl_core::ScanOutcome::SkippedMalformed { file, .. } = outcome {
                    println!("Skipping broken json {}", file);
                }
            }
            println!("Created {} with {} posts.", report.index_path.display(), report.included());
            if let Some((oldest, newest)) = report.date_range() {
                println!(
                    "  Posts from {} to {}",
                    oldest.format("%Y-%m-%d"),
                    newest.format("%Y-%m-%d")
                );
            }
        }
    }

    eprintln!("Done ({:.2}s)", t_total.elapsed().as_secs_f64());
    Ok(())
}
