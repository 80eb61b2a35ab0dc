use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use studio_contracts::models::{Capability, ModelRegistry, ModelSelector};
use studio_contracts::pipeline::{MotionType, DEFAULT_DATASET_COUNT};
use studio_contracts::session::{SessionContext, SessionHandle};
use studio_engine::{Backends, DryrunBackends, EngineConfig, LiveBackends, RunOptions, StudioRun};
use tracing_subscriber::EnvFilter;

mod server;

const DEFAULT_SCRIPT: &str = "Hi, this is my AI clone.";
const DRYRUN_API_KEY: &str = "dryrun";

#[derive(Debug, Parser)]
#[command(
    name = "clone-studio",
    version,
    about = "Turn one selfie into a portrait, dataset, motion clip and assembly kit"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the HTTP API used by the browser UI.
    Serve(ServeArgs),
    /// Run every stage once against a local image.
    Run(RunArgs),
    /// Print the candidate model order per capability.
    Models(ModelsArgs),
}

#[derive(Debug, Parser)]
struct ServeArgs {
    #[arg(long, env = "STUDIO_HOST", default_value = "0.0.0.0")]
    host: String,
    #[arg(long, env = "STUDIO_PORT", default_value_t = 3000)]
    port: u16,
    /// Answer with offline placeholder media instead of calling providers.
    #[arg(long)]
    dryrun: bool,
}

#[derive(Debug, Parser)]
struct RunArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    out: PathBuf,
    #[arg(long, default_value_t = DEFAULT_DATASET_COUNT)]
    count: usize,
    #[arg(long, default_value = "subtle")]
    motion: String,
    #[arg(long, default_value = DEFAULT_SCRIPT)]
    script: String,
    #[arg(long)]
    audio: Option<PathBuf>,
    #[arg(long)]
    skip_motion: bool,
    #[arg(long)]
    dryrun: bool,
    #[arg(long)]
    face_model: Option<String>,
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct ModelsArgs {
    #[arg(long)]
    dryrun: bool,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("clone-studio error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_tracing();
    match cli.command {
        Command::Serve(args) => run_serve(args),
        Command::Run(args) => run_pipeline(args),
        Command::Models(args) => run_models(args),
    }
}

/// `RUST_LOG` filter (default `info`) on stderr; JSON lines when
/// `STUDIO_LOG_JSON=1`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    let json = env::var("STUDIO_LOG_JSON")
        .map(|value| matches!(value.trim(), "1" | "true"))
        .unwrap_or(false);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn run_serve(args: ServeArgs) -> Result<i32> {
    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", args.host, args.port))?;
    let config = EngineConfig::from_env();
    let state = if args.dryrun {
        server::AppState::new(DryrunBackends::new(config))
    } else {
        server::AppState::new(LiveBackends::new(config))
    };
    tracing::info!(version = env!("CARGO_PKG_VERSION"), dryrun = args.dryrun, "clone-studio starting");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(server::serve(addr, state))?;
    Ok(0)
}

fn run_pipeline(args: RunArgs) -> Result<i32> {
    let source = fs::read(&args.image)
        .with_context(|| format!("failed to read {}", args.image.display()))?;
    let audio = args
        .audio
        .as_ref()
        .map(|path| fs::read(path).with_context(|| format!("failed to read {}", path.display())))
        .transpose()?;

    let api_key = match (api_key_from_env(), args.dryrun) {
        (Some(key), _) => key,
        (None, true) => DRYRUN_API_KEY.to_string(),
        (None, false) => bail!("GEMINI_API_KEY or GOOGLE_API_KEY is required (or pass --dryrun)"),
    };
    let mut session = SessionContext::new(SessionHandle::generate(), api_key);
    if let (Some(url), Some(key)) = (non_empty_env("SUPABASE_URL"), non_empty_env("SUPABASE_KEY")) {
        session = session.with_storage(url, key);
    }

    let config = EngineConfig::from_env();
    let backends: Box<dyn Backends> = if args.dryrun {
        Box::new(DryrunBackends::new(config))
    } else {
        Box::new(LiveBackends::new(config))
    };

    let options = RunOptions {
        source,
        count: args.count,
        face_model: args.face_model,
        script: args.script,
        audio,
        motion: MotionType::parse_lenient(Some(&args.motion)),
        skip_motion: args.skip_motion,
    };
    let mut run = StudioRun::new(backends.as_ref(), session, &args.out, args.events)?;
    let summary = run.run_all(&options)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    if !summary.degraded_stages.is_empty() {
        eprintln!(
            "clone-studio: degraded stages: {}",
            summary.degraded_stages.join(", ")
        );
    }
    Ok(0)
}

fn run_models(args: ModelsArgs) -> Result<i32> {
    let selector = if args.dryrun {
        ModelSelector::new(Some(ModelRegistry::dryrun()))
    } else {
        ModelSelector::default()
    };
    for capability in Capability::ALL {
        let plan = selector.candidates(None, capability);
        let names = plan.names();
        if names.is_empty() {
            println!("{capability}: (none)");
        } else {
            println!("{capability}: {}", names.join(" -> "));
        }
    }
    Ok(0)
}

fn api_key_from_env() -> Option<String> {
    non_empty_env("GEMINI_API_KEY").or_else(|| non_empty_env("GOOGLE_API_KEY"))
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
