use anyhow::{Context, Result};
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use tracing::info;

use auraassist::{constants, web_server, ChatConfig};

mod chat;

// Define the command-line interface structure using clap
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Groq model used for replies.
    #[arg(long, global = true, env = "AURA_MODEL")]
    model: Option<String>,

    /// Instruction template to use instead of the bundled one.
    #[arg(long, global = true, env = "AURA_PROMPT_PATH")]
    prompt: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

// Define the available subcommands
#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Serve the web UI.
    Serve {
        #[arg(long, default_value_t = constants::DEFAULT_PORT, help = "Port for the web server.")]
        port: u16,
        #[arg(long, default_value = "127.0.0.1", help = "Address to bind to.")]
        bind: IpAddr,
    },
    /// Chat in the terminal instead of the browser.
    Chat,
}

impl Cli {
    fn config(&self) -> ChatConfig {
        let mut config = ChatConfig::default();
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(prompt) = &self.prompt {
            config.prompt_path = Some(prompt.clone());
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (for environment variables like API keys)
    dotenvy::dotenv().ok();

    // Reads log level from RUST_LOG (e.g. RUST_LOG=info,auraassist=debug)
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config();

    info!("AuraAssist starting with command: {:?}", cli.command);

    match cli.command {
        Commands::Serve { port, bind } => {
            let addr = SocketAddr::new(bind, port);
            web_server::start_web_server(addr, config)
                .await
                .context("Web server failed")?;
        }
        Commands::Chat => {
            chat::run_terminal_chat(config)
                .await
                .context("Chat session failed")?;
            info!("Chat session finished.");
        }
    }

    Ok(())
}
