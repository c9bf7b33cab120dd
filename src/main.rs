use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use gleaner_core::config::AppConfig;
use gleaner_core::traits::LlmClient;
use gleaner_core::types::OutputSchema;
use gleaner_pipeline::{Collaborators, SmartScraper};

#[derive(Parser)]
#[command(name = "gleaner", version, about = "Ask questions about web pages and documents")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "gleaner.toml", env = "GLEANER_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question about a URL or local file
    Run {
        /// The question to answer
        question: String,
        /// URL or local path of the document
        source: String,
        /// JSON Schema file the answer must follow
        #[arg(long)]
        schema: Option<PathBuf>,
        /// Insert a reasoning stage before answering
        #[arg(long)]
        reasoning: bool,
        /// Convert the document to Markdown chunks before answering
        #[arg(long)]
        no_html_mode: bool,
        /// Token budget per chunk
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Show progress over chunk calls
        #[arg(short, long)]
        verbose: bool,
    },
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gleaner=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "gleaner", &mut std::io::stdout());
        return Ok(());
    }

    let mut config = AppConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    info!(
        provider = %config.model.provider,
        model = %config.model.model_id,
        "Config loaded"
    );

    match cli.command {
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Run {
            question,
            source,
            schema,
            reasoning,
            no_html_mode,
            chunk_size,
            verbose,
        } => {
            if let Some(path) = schema {
                config.scraper.schema = Some(OutputSchema::load(&path)?);
            }
            config.scraper.reasoning |= reasoning;
            config.scraper.html_mode &= !no_html_mode;
            config.scraper.verbose |= verbose;
            if let Some(size) = chunk_size {
                config.scraper.chunk_size = size;
            }
            config.validate()?;

            run(&question, &source, &config).await?;
        }
        Commands::Completions { .. } => unreachable!("handled before config load"),
    }

    Ok(())
}

async fn run(question: &str, source: &str, config: &AppConfig) -> anyhow::Result<()> {
    let llm: Arc<dyn LlmClient> = Arc::from(gleaner_llm::client_for(config)?);
    let collaborators = Collaborators::standard(llm, config.scraper.cut);
    let mut scraper = SmartScraper::new(question, source, config, collaborators)?;

    match scraper.run().await {
        Ok(answer) => {
            match answer.as_str() {
                Some(text) => println!("{}", text),
                None => println!("{}", serde_json::to_string_pretty(&answer)?),
            }
            if let Some(report) = scraper.execution_report() {
                eprintln!("{}", report);
            }
            Ok(())
        }
        Err(failure) => {
            error!(stage = %failure.stage, error = %failure.error, "Run failed");
            eprintln!("{}", failure.report);
            Err(failure.into())
        }
    }
}
