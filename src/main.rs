use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use chatguard::agent::{AgentSettings, ModerationAgent};
use chatguard::config::Config;
use chatguard::discord::client::DiscordClient;
use chatguard::discord::gateway::GatewaySession;
use chatguard::discord::models::DEFAULT_INTENTS;
use chatguard::toxicity::traits::ToxicityClassifier;

/// Chatguard: toxic message moderation for Discord.
///
/// Scores every message with a local multi-label toxicity model, deletes
/// the ones that cross the threshold, and tells the author why.
#[derive(Parser)]
#[command(name = "chatguard", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to Discord and moderate messages until stopped
    Run,

    /// Score a piece of text and show per-label probabilities
    Classify {
        /// The text to score
        text: String,

        /// Override the configured threshold (default: CHATGUARD_THRESHOLD or 0.5)
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Fit the vocabulary from the reference corpus and write it to a file
    ExportVocab {
        /// Where to write the vocabulary (one token per line)
        #[arg(long)]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("chatguard=info")),
        )
        .init();

    // The gateway's rustls needs a process-wide crypto provider before the
    // first handshake. Err only means one is already installed.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run => run().await?,

        Commands::Classify { text, threshold } => {
            let config = Config::load()?;
            let threshold = threshold.unwrap_or(config.threshold);
            if !(0.0..=1.0).contains(&threshold) {
                anyhow::bail!("--threshold must be between 0 and 1, got {threshold}");
            }

            let classifier = chatguard::toxicity::load_classifier(&config)?;
            let result = classifier.predict(&text).await?;
            chatguard::output::terminal::display_classification(&text, &result, threshold);
        }

        Commands::ExportVocab { output } => {
            let config = Config::load()?;

            println!("Fitting vocabulary from {}...", config.corpus_path.display());
            let vectorizer = chatguard::toxicity::corpus::fit_vectorizer(
                &config.corpus_path,
                &config.corpus_column,
                config.max_features,
                config.sequence_length,
            )?;
            vectorizer.save_vocabulary(&output)?;

            println!(
                "\n{}",
                format!(
                    "Wrote {} vocabulary entries to {}",
                    vectorizer.vocab_size(),
                    output.display()
                )
                .bold()
            );
            println!("Set CHATGUARD_VOCAB_PATH to this file to skip fitting at startup.");
        }
    }

    Ok(())
}

/// Bring the bot up: classifier first, then Discord, then the event loop.
/// Any failure before Ready propagates out of main as a non-zero exit.
async fn run() -> Result<()> {
    let config = Config::load()?;
    config.require_token()?;

    info!("Loading toxicity classifier...");
    let classifier: Arc<dyn ToxicityClassifier> =
        Arc::new(chatguard::toxicity::load_classifier(&config)?);

    let client = DiscordClient::new(&config.api_url, &config.discord_token)?;
    let me = client.current_user().await?;
    info!(user = %me.username, "Discord token accepted");

    let (session, events) =
        GatewaySession::connect(&config.gateway_url, &config.discord_token, DEFAULT_INTENTS)
            .await?;

    let mut agent = ModerationAgent::new(
        classifier,
        Arc::new(client),
        AgentSettings::from_config(&config),
    );

    let result = tokio::select! {
        result = agent.run(events) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
            Ok(())
        }
    };

    agent.shutdown();
    session.close().await;
    result
}
