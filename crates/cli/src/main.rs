//! Stringer CLI — the main entry point.
//!
//! One-shot mode researches a topic and prints the answer; `--chat` starts
//! an interactive session with `/quit`, `/reset`, `/depth`, `/srclang`,
//! and `/outlang` commands.

use clap::Parser;

mod commands;

#[derive(Parser)]
#[command(
    name = "stringer",
    about = "Stringer — a research agent that reads the local press",
    version,
    author
)]
struct Cli {
    /// Topic or query to research
    topic: Option<String>,

    /// Search depth
    #[arg(long, value_parser = ["standard", "deep"])]
    depth: Option<String>,

    /// Translate source snippets to this language code (for comprehension)
    #[arg(long = "source-lang")]
    source_lang: Option<String>,

    /// Translate the final answer to this language code
    #[arg(long = "output-lang")]
    output_lang: Option<String>,

    /// Start interactive chat mode
    #[arg(long)]
    chat: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let options = commands::SessionOptions {
        depth: cli.depth,
        source_lang: cli.source_lang,
        output_lang: cli.output_lang,
    };

    if cli.chat {
        return commands::chat::run(options).await;
    }

    let Some(topic) = cli.topic else {
        eprintln!("Please provide a topic, or run with --chat for interactive mode.");
        std::process::exit(2);
    };
    commands::research::run(&topic, options).await
}
