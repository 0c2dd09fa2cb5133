mod remote;
mod run;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use autoblog_types::{GenerationSettings, ImageQuality, Language};

#[derive(Parser)]
#[command(name = "autoblog", about = "Bilingual blog autopilot")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP backend with the durable daily scheduler
    Serve {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory holding the database (overrides config)
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Produce one batch of articles right here, then exit
    Run {
        #[command(flatten)]
        settings: SettingsArgs,

        /// Database file receiving the posts (overrides config)
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Start the autopilot of a running server
    Start {
        #[command(flatten)]
        settings: SettingsArgs,

        #[command(flatten)]
        remote: RemoteArgs,
    },
    /// Stop the autopilot of a running server
    Stop {
        #[command(flatten)]
        remote: RemoteArgs,
    },
    /// Show the autopilot state of a running server
    Status {
        #[command(flatten)]
        remote: RemoteArgs,
    },
    /// Check configuration
    Health,
}

#[derive(Args)]
struct RemoteArgs {
    /// Server base URL
    #[arg(long, default_value = "http://127.0.0.1:4000")]
    url: String,

    /// Bearer token for authentication
    #[arg(long)]
    token: Option<String>,
}

/// Overrides applied on top of the configured default settings.
#[derive(Args, Default)]
struct SettingsArgs {
    /// Subject area of the blog
    #[arg(long)]
    niche: Option<String>,

    /// Keywords the topic analysis must consider
    #[arg(long)]
    keywords: Option<String>,

    /// Articles per day (per run for `run`)
    #[arg(short, long)]
    articles: Option<u32>,

    #[arg(long, value_enum)]
    language: Option<LanguageArg>,

    /// Cover image resolution
    #[arg(long, value_enum)]
    quality: Option<QualityArg>,

    /// Visual style of cover images
    #[arg(long)]
    style: Option<String>,

    /// Save posts as drafts instead of publishing
    #[arg(long)]
    draft: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum LanguageArg {
    Arabic,
    English,
}

#[derive(Clone, Copy, ValueEnum)]
enum QualityArg {
    #[value(name = "1k")]
    Standard,
    #[value(name = "2k")]
    High,
    #[value(name = "4k")]
    Ultra,
}

impl SettingsArgs {
    fn apply(self, mut settings: GenerationSettings) -> GenerationSettings {
        if let Some(niche) = self.niche {
            settings.niche = niche;
        }
        if let Some(keywords) = self.keywords {
            settings.keywords = keywords;
        }
        if let Some(articles) = self.articles {
            settings.articles_per_day = articles;
        }
        if let Some(language) = self.language {
            settings.language = match language {
                LanguageArg::Arabic => Language::Arabic,
                LanguageArg::English => Language::English,
            };
        }
        if let Some(quality) = self.quality {
            settings.image_quality = match quality {
                QualityArg::Standard => ImageQuality::Standard,
                QualityArg::High => ImageQuality::High,
                QualityArg::Ultra => ImageQuality::Ultra,
            };
        }
        if let Some(style) = self.style {
            settings.image_style = style;
        }
        if self.draft {
            settings.auto_publish = false;
        }
        settings
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let mut config = autoblog_config::load_config().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config, using defaults: {e}");
        Default::default()
    });

    match cli.command {
        Commands::Serve { port, data_dir } => {
            if let Some(dir) = data_dir {
                config.storage.db_path = Some(dir.join("autoblog.db"));
            }
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(autoblog_server::start_server(config, port))?;
        }
        Commands::Run { settings, db } => {
            if db.is_some() {
                config.storage.db_path = db;
            }
            let settings = settings.apply(config.defaults.clone());
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run::run_session(config, settings))?;
        }
        Commands::Start { settings, remote } => {
            let settings = settings.apply(config.defaults.clone());
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(remote::client(remote.url, remote.token)?.start(&settings))?;
        }
        Commands::Stop { remote } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(remote::client(remote.url, remote.token)?.stop())?;
        }
        Commands::Status { remote } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(remote::client(remote.url, remote.token)?.status())?;
        }
        Commands::Health => {
            println!("autoblog is healthy");
            let has_key = config.gemini.resolve_api_key().is_some();
            println!("  gemini api key: {}", if has_key { "set" } else { "missing" });
            println!("  text model: {}", config.gemini.text_model);
            println!("  server port: {}", config.server.port);
            match config.db_path() {
                Ok(path) => println!("  database: {}", path.display()),
                Err(e) => println!("  database: unavailable ({e})"),
            }
        }
    }

    Ok(())
}
