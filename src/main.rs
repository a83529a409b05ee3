use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use murmur_gateway::api::ApiServerBuilder;
use murmur_gateway::voice::VoiceSettings;
use murmur_gateway::{ChatHistory, Config, RequestOrchestrator, ResponseCache};

/// Murmur - voice and text front end for a generative assistant
#[derive(Parser)]
#[command(name = "murmur", version, about)]
struct Cli {
    /// Port to listen on (overrides configuration)
    #[arg(long)]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Ask one question through the backend chain and print the answer
    Ask {
        /// Question text
        text: String,
    },
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,

        /// Where to write the synthesized audio
        #[arg(short, long, default_value = "murmur-tts-test.mp3")]
        output: std::path::PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,murmur_gateway=info",
        1 => "info,murmur_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(port) = cli.port {
        config.api_server.port = port;
    }
    tracing::debug!(?config, "loaded configuration");

    match cli.command {
        Some(Command::Ask { text }) => ask(&config, &text).await,
        Some(Command::TestTts { text, output }) => test_tts(&config, &text, &output).await,
        None => serve(&config).await,
    }
}

/// Run the HTTP server until interrupted
async fn serve(config: &Config) -> anyhow::Result<()> {
    tracing::info!(
        port = config.api_server.port,
        static_dir = %config.api_server.static_dir.display(),
        "starting murmur gateway"
    );

    let server = ApiServerBuilder::from_config(config)?.build();

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
    }

    Ok(())
}

/// Answer a single question from the command line
async fn ask(config: &Config, text: &str) -> anyhow::Result<()> {
    let ttl = chrono::Duration::from_std(config.cache_ttl)?;
    let orchestrator = RequestOrchestrator::new(ResponseCache::new(ttl), config.backend_chain()?);
    let mut history = ChatHistory::new();

    let reply = orchestrator.handle(text, &mut history).await;
    println!("{}", reply.response_text);
    Ok(())
}

/// Synthesize a phrase with the configured TTS provider
async fn test_tts(config: &Config, text: &str, output: &std::path::Path) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let synthesizer = config
        .synthesizer()?
        .ok_or_else(|| anyhow::anyhow!("no TTS provider configured (set OPENAI_API_KEY or ELEVENLABS_API_KEY)"))?;

    println!("Synthesizing speech...");
    let mp3_data = synthesizer
        .synthesize(text, &VoiceSettings::default())
        .await
        .map_err(|e| anyhow::anyhow!("TTS synthesis failed: {e}"))?;
    println!("Got {} bytes of audio data", mp3_data.len());

    tokio::fs::write(output, &mp3_data).await?;
    println!("Wrote {}", output.display());
    Ok(())
}
