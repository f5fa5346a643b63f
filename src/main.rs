mod agents;
mod api;
mod audio_cache;
mod calls;
mod config;
mod greeting;
mod providers;
mod routing;
mod session;
mod setup;
mod speech_text;
mod twilio;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use agents::AgentRegistry;
use audio_cache::AudioCache;
use calls::machine::CallMachine;
use calls::store::CallStore;
use config::Config;
use providers::llm::LlmClient;
use providers::tts::TtsClient;
use providers::{ProviderKind, ProviderRegistry};
use routing::model::ModelRouter;
use routing::speech::SpeechRouter;
use session::SessionStore;
use twilio::outbound::TwilioClient;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Shared application state accessible from all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// The call orchestrator: every telephony webhook funnels into it.
    pub machine: Arc<CallMachine>,
    /// Synthesized audio, served back to the platform via /audio/{id}.
    pub cache: AudioCache,
    pub twilio: Arc<TwilioClient>,
    /// Call log, exposed for reporting under /api/calls.
    pub calls: CallStore,
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("--setup") => setup::run(),
        Some("--version") => println!("voice-desk {VERSION}"),
        Some("--help") | Some("-h") => print_usage(),
        Some(other) => {
            eprintln!("Unknown option: {other}");
            print_usage();
            std::process::exit(1);
        }
        None => {
            let rt = tokio::runtime::Runtime::new().expect("Failed to create tokio runtime");
            rt.block_on(server());
        }
    }
}

fn print_usage() {
    println!("voice-desk {VERSION}");
    println!("Multi-provider AI voice agent for sales calls via Twilio");
    println!();
    println!("Usage: voice-desk [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --setup     Run interactive configuration wizard");
    println!("  --version   Print version");
    println!("  --help, -h  Print this help message");
    println!();
    println!("Without options, starts the voice server.");
}

async fn server() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voice_desk=info,tower_http=info".into()),
        )
        .init();

    // Load config
    let config = match Config::load() {
        Ok(c) => Arc::new(c),
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        "Starting voice-desk"
    );

    // Provider plumbing: registry for availability, one HTTP adapter per
    // vendor kind, routers that walk the configured fallback chains
    let registry = ProviderRegistry::new(config.clone());
    tracing::info!(
        llm = ?registry.list_available(ProviderKind::Language),
        tts = ?registry.list_available(ProviderKind::Speech),
        "Providers available at startup"
    );

    let cache = AudioCache::new();
    let model = Arc::new(ModelRouter::new(
        Arc::new(LlmClient::new(config.clone())),
        registry.clone(),
        config.clone(),
    ));
    let speech = Arc::new(SpeechRouter::new(
        Arc::new(TtsClient::new(config.clone())),
        registry.clone(),
        cache.clone(),
        config.clone(),
    ));

    // Agent personas, seeded with a default so resolution never fails
    let agents = match AgentRegistry::load_or_seed(config::config_dir().join("agents.toml")) {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            eprintln!("Failed to load agent profiles: {e}");
            std::process::exit(1);
        }
    };

    let calls = CallStore::new(config.calls.max_records);
    let sessions = SessionStore::new();

    // Background sweeps run on their own timers, independent of traffic
    sessions.clone().spawn_sweeper(
        Duration::from_secs(config.session.idle_timeout_secs),
        Duration::from_secs(config.session.sweep_interval_secs),
    );
    cache
        .clone()
        .spawn_sweeper(Duration::from_secs(config.cache.flush_interval_secs));

    let machine = Arc::new(CallMachine::new(
        agents,
        calls.clone(),
        sessions,
        model,
        speech,
        config.clone(),
    ));

    // Build shared state
    let state = AppState {
        machine,
        cache,
        twilio: Arc::new(TwilioClient::new(
            &config.twilio,
            &config.server.external_url,
        )),
        calls,
        config: config.clone(),
    };

    // Build router
    let app = Router::new()
        // Twilio webhooks: new call, speech result, status callback
        .route("/twilio/voice", post(twilio::webhook::handle_voice))
        .route("/twilio/voice/gather", post(twilio::webhook::handle_gather))
        .route("/twilio/voice/status", post(twilio::webhook::handle_status))
        // Cached synthesized audio for TwiML <Play>
        .route("/audio/{id}", get(api::audio::serve_audio))
        // Outbound call API and call-log reporting
        .route("/api/call", post(api::call::handle_call))
        .route("/api/calls", get(api::calls::list_calls))
        .route("/api/calls/{id}", get(api::calls::get_call))
        // Health check
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .expect("Invalid server address");

    tracing::info!(%addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind");

    axum::serve(listener, app).await.expect("Server error");
}

async fn health() -> &'static str {
    "ok"
}
