use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use disposables::EngineContext;
use tracing_subscriber::{fmt, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "disposablesctl", version, about = "Launch disposable containers")]
struct Cli {
    #[command(flatten)]
    engine: EngineArgs,

    #[command(subcommand)]
    cmd: Commands,
}

/// Overrides for the engine context. Unset options fall back to the
/// `DISPOSABLES_*` environment variables, then to built-in defaults.
#[derive(Args, Debug, Default)]
struct EngineArgs {
    /// Container engine executable (podman or docker)
    #[arg(long, global = true, value_name = "PATH")]
    engine: Option<String>,

    /// Image carrying the in-container agent
    #[arg(long, global = true, value_name = "IMAGE")]
    agent_image: Option<String>,

    /// Engine volume the agent is installed into
    #[arg(long, global = true, value_name = "NAME")]
    volume: Option<String>,
}

impl EngineArgs {
    fn context(&self) -> Result<EngineContext> {
        let mut builder = EngineContext::builder();
        if let Some(engine) = &self.engine {
            builder = builder.engine(engine);
        }
        if let Some(image) = &self.agent_image {
            builder = builder.agent_image(image);
        }
        if let Some(volume) = &self.volume {
            builder = builder.volume(volume);
        }
        builder.build().context("failed to resolve container engine")
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create a container and wait for it to become ready
    Run(commands::run::RunArgs),
    /// Create the agent volume and install the agent into it
    Bootstrap,
    /// Print the resolved engine context as JSON
    Context,
    /// Print the logs of a container
    Logs {
        #[arg(value_name = "ID")]
        id: String,
        /// Keep streaming until the container exits
        #[arg(short, long)]
        follow: bool,
    },
}

fn init_tracing() {
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let ctx = cli.engine.context()?;

    match cli.cmd {
        Commands::Run(args) => commands::run::run(&ctx, args),
        Commands::Bootstrap => {
            ctx.bootstrap_volume()
                .with_context(|| format!("failed to bootstrap volume {}", ctx.volume()))?;
            println!("agent installed at {}", ctx.agent_path());
            Ok(())
        }
        Commands::Context => {
            println!("{}", serde_json::to_string_pretty(&ctx.summary())?);
            Ok(())
        }
        Commands::Logs { id, follow } => commands::logs(&ctx, &id, follow),
    }
}
