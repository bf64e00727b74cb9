use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use kerjasama_agent::agent::ResponseAgent;
use kerjasama_agent::calendar::GoogleCalendar;
use kerjasama_agent::classifier::examples::training_examples;
use kerjasama_agent::classifier::{HashingEncoder, IntentClassifier, IntentModel, TrainingParams};
use kerjasama_agent::config::{AppConfig, ClassifierConfig};
use kerjasama_agent::crypto::TokenCipher;
use kerjasama_agent::llm::create_provider;
use kerjasama_agent::processor::MessageProcessor;
use kerjasama_agent::store::{Database, LibSqlBackend};
use kerjasama_agent::webhook::{AppState, router};
use kerjasama_agent::whatsapp::WhatsAppSender;

#[derive(Parser)]
#[command(name = "kerjasama-agent", version, about = "WhatsApp inquiry responder")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the webhook service (default)
    Serve,
    /// Train the intent classifier on the built-in examples
    Train {
        /// Where to write the model artifact
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print a new key for ENCRYPTION_KEY
    GenerateKey,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve().await,
        Command::Train { output } => train(output),
        Command::GenerateKey => {
            println!("{}", TokenCipher::generate_key());
            Ok(())
        }
    }
}

fn train(output: Option<PathBuf>) -> anyhow::Result<()> {
    let output = output.unwrap_or_else(|| ClassifierConfig::default().model_path);
    let examples = training_examples();
    tracing::info!(examples = examples.len(), "Training intent classifier");

    let model = IntentModel::train(
        &examples,
        &HashingEncoder::default(),
        TrainingParams::default(),
    )?;
    model.save(&output)?;

    tracing::info!(path = %output.display(), "Model trained and saved");
    eprintln!("You can now start the service with: kerjasama-agent serve");
    Ok(())
}

async fn serve() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("Failed to load configuration")?;

    eprintln!("🤖 Kerjasama Agent v{}", env!("CARGO_PKG_VERSION"));

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::connect(&config.database)
            .await
            .context("Failed to open database")?,
    );

    let cipher = Arc::new(TokenCipher::new(&config.encryption_key)?);

    // ── Classifier ───────────────────────────────────────────────────────
    let classifier = Arc::new(IntentClassifier::load(&config.classifier)?);
    eprintln!(
        "   Classifier: {} (threshold {})",
        config.classifier.model_path.display(),
        classifier.threshold()
    );

    // ── Agent ────────────────────────────────────────────────────────────
    let llm = match &config.llm {
        Some(llm_config) => {
            eprintln!("   Model: {}", llm_config.model);
            Some(create_provider(llm_config)?)
        }
        None => None,
    };
    let calendar = Arc::new(GoogleCalendar::new(
        &config.google,
        Arc::clone(&db),
        Arc::clone(&cipher),
    ));
    let agent = Arc::new(ResponseAgent::new(
        llm,
        Arc::clone(&db),
        Arc::clone(&cipher),
        calendar,
    ));

    let processor = Arc::new(MessageProcessor::new(
        Arc::clone(&db),
        classifier,
        agent,
        Arc::new(WhatsAppSender::new(&config.whatsapp.api_base_url)),
        cipher,
    ));

    let app = router(AppState {
        verify_token: config.whatsapp.verify_token.clone(),
        app_secret: config.whatsapp.app_secret.clone(),
        processor,
    });

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    eprintln!("   Webhook: http://{addr}/webhook");
    tracing::info!(port = config.server_port, "Server started");

    axum::serve(listener, app).await?;
    Ok(())
}
