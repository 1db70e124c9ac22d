use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "phoenix-eye")]
#[command(about = "Phoenix-Eye: AI hardware diagnosis, firmware generation and impact estimates", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config.json.
    Init {
        /// Config file path (default: PHOENIX_CONFIG_PATH or ~/.phoenix/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the web server (page + phase API). Needs GOOGLE_API_KEY or gemini.apiKey.
    Serve {
        /// Config file path (default: PHOENIX_CONFIG_PATH or ~/.phoenix/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default from config or 8501)
        #[arg(long, short)]
        port: Option<u16>,

        /// Bind address (default from config or 127.0.0.1)
        #[arg(long, short)]
        bind: Option<String>,
    },

    /// List models that support generateContent and show which one would be selected.
    Models {
        /// Config file path (default: PHOENIX_CONFIG_PATH or ~/.phoenix/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("phoenix-eye {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Serve { config, port, bind }) => {
            if let Err(e) = run_serve(config, port, bind).await {
                log::error!("server failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Models { config }) => {
            if let Err(e) = run_models(config).await {
                log::error!("models failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(lib::config::default_config_path);
    let dir = lib::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_serve(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
    bind: Option<String>,
) -> anyhow::Result<()> {
    let (mut config, path) = lib::config::load_config(config_path)?;
    log::debug!("using config {}", path.display());
    if let Some(p) = port {
        config.server.port = p;
    }
    if let Some(b) = bind {
        config.server.bind = b;
    }
    log::info!("starting server on {}:{}", config.server.bind, config.server.port);
    lib::web::run_server(config).await
}

async fn run_models(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let (config, _) = lib::config::load_config(config_path)?;
    let api_key = lib::config::resolve_api_key(&config)
        .ok_or_else(|| anyhow::anyhow!("Gemini API key not found (set GOOGLE_API_KEY or gemini.apiKey)"))?;
    let timeout = config.gemini.request_timeout_secs.map(std::time::Duration::from_secs);
    let client = lib::llm::GeminiClient::new(lib::config::resolve_api_base(&config), api_key, timeout);
    let models = client.list_models().await?;
    let capable = lib::llm::generation_capable(&models);
    let selected = lib::llm::select_model(config.gemini.model_priority.as_slice(), capable.as_slice());
    if capable.is_empty() {
        println!("no models support generateContent");
        return Ok(());
    }
    for name in &capable {
        let marker = if selected.as_deref() == Some(name.as_str()) { "*" } else { " " };
        println!("{} {}", marker, name);
    }
    Ok(())
}
