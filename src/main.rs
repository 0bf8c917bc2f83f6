use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use maitre_core::config::Config;
use maitre_core::session::{ChatService, RagSession, SessionManager, SessionSettings};
use maitre_gateway::GatewayServer;
use maitre_llm::openai::OpenAiProvider;
use maitre_memory::document::{IngestionPipeline, PassageSplitter, SplitConfig};
use maitre_memory::{QdrantVectorStore, VectorStore};
use tokio::sync::watch;

#[derive(Parser)]
#[command(
    name = "maitre",
    version,
    about = "Retrieval-augmented restaurant service-training assistant"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config/default.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP gateway.
    Serve,
    /// Interactive question/answer loop in the terminal.
    Chat,
    /// Ingest the docs directory into the vector index, then exit.
    Ingest,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    config.validate()?;

    match cli.command {
        Command::Serve => serve(config).await,
        Command::Chat => chat(config).await,
        Command::Ingest => ingest(config).await,
    }
}

fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn create_provider(config: &Config) -> anyhow::Result<OpenAiProvider> {
    let api_key =
        std::env::var("MAITRE_OPENAI_API_KEY").context("MAITRE_OPENAI_API_KEY must be set")?;
    Ok(
        OpenAiProvider::new(api_key, config.llm.base_url.clone(), config.llm.model.clone())
            .with_max_tokens(config.llm.max_tokens)
            .with_temperature(config.llm.creativity)
            .with_embedding_model(config.llm.embedding_model.clone()),
    )
}

fn create_store(config: &Config) -> anyhow::Result<Arc<dyn VectorStore>> {
    let store = QdrantVectorStore::new(&config.index.qdrant_url)
        .map_err(|e| anyhow::anyhow!("failed to connect to Qdrant: {e}"))?;
    Ok(Arc::new(store))
}

fn session_settings(config: &Config) -> SessionSettings {
    SessionSettings {
        assistant_name: config.assistant.name.clone(),
        collection: config.retrieval.collection.clone(),
        n_retrievals: config.retrieval.n_retrievals,
        chat_max_tokens: config.memory.chat_max_tokens,
        self_query: config.retrieval.self_query,
        retrieval_timeout: std::time::Duration::from_secs(config.retrieval.timeout_secs),
        generation_timeout: std::time::Duration::from_secs(config.timeouts.generation_secs),
    }
}

fn create_pipeline(
    config: &Config,
    store: Arc<dyn VectorStore>,
    provider: Arc<OpenAiProvider>,
) -> IngestionPipeline<OpenAiProvider> {
    IngestionPipeline::new(
        PassageSplitter::new(SplitConfig {
            chunk_size: config.ingest.chunk_size,
            chunk_overlap: config.ingest.chunk_overlap,
        }),
        store,
        provider,
        config.retrieval.collection.clone(),
    )
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let provider = Arc::new(create_provider(&config)?);
    let store = create_store(&config)?;

    // Ingestion runs in the background; live queries see newly indexed
    // passages as they land.
    let pipeline = create_pipeline(&config, store.clone(), provider.clone());
    let docs_dir = PathBuf::from(&config.ingest.docs_dir);
    tokio::spawn(async move {
        match pipeline.ingest_dir(&docs_dir).await {
            Ok(report) => tracing::info!(
                files = report.files_indexed,
                passages = report.passages_indexed,
                "startup ingestion finished"
            ),
            Err(e) => tracing::error!("startup ingestion failed: {e}"),
        }
    });

    let manager: Arc<dyn ChatService> = Arc::new(SessionManager::new(
        provider,
        store,
        session_settings(&config),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e}");
            return;
        }
        tracing::info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    let server = GatewayServer::new(&config.gateway.bind, config.gateway.port, manager, shutdown_rx)
        .with_auth(config.gateway.auth_token.clone())
        .with_rate_limit(config.gateway.rate_limit)
        .with_max_body_size(config.gateway.max_body_size);

    #[cfg(feature = "speech")]
    let server = if config.speech.enabled() {
        let client = reqwest_client();
        server.with_speech(maitre_gateway::VoiceServices {
            stt: Arc::new(maitre_llm::stt::HttpSttClient::new(
                client.clone(),
                config.speech.stt_url.clone(),
            )),
            tts: Arc::new(maitre_llm::tts::HttpTtsClient::new(
                client,
                config.speech.tts_url.clone(),
            )),
            voice: config.speech.voice.clone(),
            format: config.speech.format.clone(),
        })
    } else {
        server
    };

    server.serve().await?;
    Ok(())
}

#[cfg(feature = "speech")]
fn reqwest_client() -> reqwest::Client {
    reqwest::Client::new()
}

async fn chat(config: Config) -> anyhow::Result<()> {
    let provider = Arc::new(create_provider(&config)?);
    let store = create_store(&config)?;

    let pipeline = create_pipeline(&config, store.clone(), provider.clone());
    let report = pipeline
        .ingest_dir(&PathBuf::from(&config.ingest.docs_dir))
        .await?;
    println!(
        "Loaded {} passage(s) from {} document(s).",
        report.passages_indexed, report.files_indexed
    );

    let mut session = RagSession::new(provider, store, &session_settings(&config));

    println!("Type 'exit' to quit.");
    loop {
        let question: String = dialoguer::Input::new()
            .with_prompt("Question")
            .allow_empty(true)
            .interact_text()?;
        if question.trim() == "exit" {
            break;
        }
        match session.ask(&question).await {
            Ok(answer) => println!("Answer: {answer}"),
            Err(e) => eprintln!("error: {e}"),
        }
    }
    Ok(())
}

async fn ingest(config: Config) -> anyhow::Result<()> {
    let provider = Arc::new(create_provider(&config)?);
    let store = create_store(&config)?;

    let pipeline = create_pipeline(&config, store, provider);
    let report = pipeline
        .ingest_dir(&PathBuf::from(&config.ingest.docs_dir))
        .await?;
    println!(
        "Indexed {} passage(s) from {} document(s), skipped {}.",
        report.passages_indexed, report.files_indexed, report.files_skipped
    );
    Ok(())
}
