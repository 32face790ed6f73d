//! PromptGate CLI binary.
//!
//! Content safety gate for LLM endpoints.
//!
//! # Commands
//!
//! - `serve` - Start the HTTP moderation server
//! - `scan` - Scan text against the global keyword set
//! - `check` - Run one prompt through the full pipeline offline
//! - `validate` - Load and report on a policy data directory

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use promptgate::{
    guard::{GuardClassifier, HttpGuardClassifier, StaticGuard},
    pipeline::flow::{moderation_pipeline, run_moderation, Gate},
    pipeline::RequestContext,
    policy::{CacheKind, FileDataSource, PolicyCache},
    rewrite::{HttpRewriter, NoopRewriter, Rewriter},
    server::{create_router, AppState, ServerConfig},
    Config, VERSION,
};

#[derive(Parser)]
#[command(name = "promptgate")]
#[command(version = VERSION)]
#[command(about = "PromptGate - content safety gate for LLM endpoints", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP moderation server
    Serve {
        /// Config file path (TOML); env vars apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind to all interfaces
        #[arg(long)]
        bind_all: bool,

        /// Verbose logging
        #[arg(short, long)]
        verbose: bool,
    },

    /// Scan text against the global keyword set
    Scan {
        /// Text to scan
        text: String,

        /// Policy data directory
        #[arg(short, long, default_value = "./data")]
        data_dir: PathBuf,

        /// Exemption phrase window in bytes (0 = whole text)
        #[arg(long, default_value_t = 0)]
        exemption_distance: usize,
    },

    /// Run one prompt through the full pipeline offline
    Check {
        /// Prompt text
        text: String,

        /// Tenant identifier
        #[arg(short, long, default_value = "default-app")]
        app_id: String,

        /// Policy data directory
        #[arg(short, long, default_value = "./data")]
        data_dir: PathBuf,

        /// Classification label to assume (SAFE, UNSAFE, CONTROVERSIAL)
        #[arg(long, default_value = "UNSAFE")]
        safety: String,

        /// Enable the tenant whitelist
        #[arg(long)]
        use_customize_white: bool,

        /// Enable the tenant keyword list
        #[arg(long)]
        use_customize_words: bool,

        /// Enable tenant rule overrides
        #[arg(long)]
        use_customize_rule: bool,

        /// Enable the VIP blacklist tier
        #[arg(long)]
        use_vip_black: bool,

        /// Enable the VIP whitelist tier
        #[arg(long)]
        use_vip_white: bool,
    },

    /// Load and report on a policy data directory
    Validate {
        /// Policy data directory
        #[arg(short, long, default_value = "./data")]
        data_dir: PathBuf,

        /// Tenant to preload
        #[arg(short, long)]
        app_id: Option<String>,

        /// Bundle kinds to preload for the tenant (comma-separated)
        #[arg(short, long, default_value = "customize,vip")]
        kinds: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            port,
            bind_all,
            verbose,
        } => cmd_serve(config, port, bind_all, verbose),
        Commands::Scan {
            text,
            data_dir,
            exemption_distance,
        } => cmd_scan(&text, data_dir, exemption_distance),
        Commands::Check {
            text,
            app_id,
            data_dir,
            safety,
            use_customize_white,
            use_customize_words,
            use_customize_rule,
            use_vip_black,
            use_vip_white,
        } => cmd_check(CheckArgs {
            text,
            app_id,
            data_dir,
            safety,
            use_customize_white,
            use_customize_words,
            use_customize_rule,
            use_vip_black,
            use_vip_white,
        }),
        Commands::Validate {
            data_dir,
            app_id,
            kinds,
        } => cmd_validate(data_dir, app_id, &kinds),
    }
}

fn init_logging(verbose: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();
}

/// Assemble the shared gate services from config.
fn build_gate(config: &Config) -> Arc<Gate> {
    let cache = Arc::new(PolicyCache::new(Arc::new(FileDataSource::new(
        &config.data.base_path,
    ))));

    let guard: Arc<dyn GuardClassifier> = match &config.guard.endpoint {
        Some(endpoint) => Arc::new(HttpGuardClassifier::new(endpoint.clone())),
        None => {
            tracing::warn!("no guard endpoint configured; all prompts classify as SAFE");
            Arc::new(StaticGuard::safe())
        },
    };

    let rewriter: Arc<dyn Rewriter> = match &config.rewrite.endpoint {
        Some(endpoint) => Arc::new(HttpRewriter::new(endpoint.clone())),
        None => Arc::new(NoopRewriter),
    };

    Arc::new(Gate::new(
        cache,
        guard,
        rewriter,
        config.matcher.exemption_distance,
    ))
}

fn cmd_serve(
    config_path: Option<PathBuf>,
    port: Option<u16>,
    bind_all: bool,
    verbose: bool,
) -> anyhow::Result<()> {
    init_logging(verbose);

    let config = match config_path {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env(),
    };

    let mut server_config = ServerConfig::default().with_addr(config.server.addr.parse()?);
    if let Some(port) = port {
        server_config = server_config.with_port(port);
    }
    if bind_all {
        server_config = server_config.bind_all();
    }
    if !config.server.cors_enabled {
        server_config = server_config.without_cors();
    }

    let gate = build_gate(&config);
    let state = Arc::new(AppState::new(server_config.clone(), gate.clone()));
    let app = create_router(state);

    tracing::info!("Starting PromptGate server on {}", server_config.addr);
    tracing::info!("Policy data: {}", config.data.base_path.display());

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        // Fail fast on an unloadable global policy instead of at first request.
        gate.cache.ensure_global().await?;
        let listener = tokio::net::TcpListener::bind(server_config.addr).await?;
        axum::serve(listener, app).await?;
        Ok::<_, anyhow::Error>(())
    })
}

fn cmd_scan(text: &str, data_dir: PathBuf, exemption_distance: usize) -> anyhow::Result<()> {
    let cache = PolicyCache::new(Arc::new(FileDataSource::new(data_dir)));

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        cache.ensure_global().await?;
        let outcome = cache.scan_global(text, exemption_distance).await?;
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        Ok(())
    })
}

struct CheckArgs {
    text: String,
    app_id: String,
    data_dir: PathBuf,
    safety: String,
    use_customize_white: bool,
    use_customize_words: bool,
    use_customize_rule: bool,
    use_vip_black: bool,
    use_vip_white: bool,
}

fn cmd_check(args: CheckArgs) -> anyhow::Result<()> {
    let safety = match args.safety.to_ascii_uppercase().as_str() {
        "SAFE" => promptgate::SafetyLabel::Safe,
        "UNSAFE" => promptgate::SafetyLabel::Unsafe,
        "CONTROVERSIAL" => promptgate::SafetyLabel::Controversial,
        other => anyhow::bail!("unknown safety label: {other}"),
    };

    let cache = Arc::new(PolicyCache::new(Arc::new(FileDataSource::new(
        args.data_dir,
    ))));
    let gate = Arc::new(Gate::new(
        cache,
        Arc::new(StaticGuard::new(safety, None)),
        Arc::new(NoopRewriter),
        0,
    ));
    let pipeline = moderation_pipeline(gate);

    let mut ctx = RequestContext::new(
        uuid::Uuid::new_v4().to_string(),
        args.app_id,
        args.text,
    );
    ctx.use_customize_white = args.use_customize_white;
    ctx.use_customize_words = args.use_customize_words;
    ctx.use_customize_rule = args.use_customize_rule;
    ctx.use_vip_black = args.use_vip_black;
    ctx.use_vip_white = args.use_vip_white;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let settled = run_moderation(&pipeline, ctx).await?;
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "final_decision": settled.final_decision,
                "all_decision_dict": settled.all_decision_dict,
                "final_result": settled.final_result,
                "exempted": settled.exempted,
            }))?
        );
        Ok(())
    })
}

fn cmd_validate(data_dir: PathBuf, app_id: Option<String>, kinds: &str) -> anyhow::Result<()> {
    let cache = PolicyCache::new(Arc::new(FileDataSource::new(data_dir)));

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        cache.ensure_global().await?;
        let global = cache.global().await.expect("just loaded");
        println!(
            "global: {} patterns, {} rules",
            global.automaton.len(),
            global.rules.len()
        );

        if let Some(app_id) = app_id {
            for kind in kinds.split(',').filter(|k| !k.is_empty()) {
                let kind = CacheKind::from_str(kind.trim())?;
                cache.ensure_tenant(&app_id, kind).await?;
                println!("{app_id}: {kind} bundle loaded");
            }
        }
        Ok(())
    })
}
