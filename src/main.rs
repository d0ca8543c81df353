use std::{path::PathBuf, process};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use meta_schema::{
    SchemaEditor,
    config::{ConfigManager, EditorConfig, EnvConfigManager},
    logger::init_tracing,
    schema::write_schema,
    schema_commands::{export_schema_file, graph_json, load_schema_file, summary},
};
use schema_bridge::{Bridge, EditorInbox, lines::{LineTransport, pump_stdin}};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "meta-schema",
    about = "Visual schema editor core speaking the host bridge protocol",
    version = "0.1.0"
)]
struct Cli {
    /// `.env` file seeding the configuration. Defaults to `./.env` when present.
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// Log level override (e.g. error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the editor over stdin/stdout JSON lines
    Run(RunArgs),

    /// Load a schema payload and report on the resulting graph
    Load(LoadArgs),

    /// Load a schema payload and print it re-derived from the graph
    Export { file: PathBuf },

    /// Emit JSON-Schema for the payload, graph and envelope shapes
    Schema(SchemaArgs),
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Request timeout override in milliseconds
    #[arg(long)]
    request_timeout_ms: Option<u64>,
}

#[derive(Args, Debug)]
struct LoadArgs {
    file: PathBuf,

    /// Print the graph as JSON instead of a summary
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct SchemaArgs {
    #[arg(long, default_value = "schemas")]
    out: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let env_file = cli
        .env_file
        .or_else(|| Some(PathBuf::from(".env")).filter(|p| p.exists()));
    let config_mgr = ConfigManager(EnvConfigManager::new(env_file));
    let mut config = EditorConfig::load(&config_mgr)
        .await
        .context("invalid configuration")?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }

    init_tracing(&config)?;

    match cli.command.unwrap_or(Commands::Run(RunArgs::default())) {
        Commands::Run(args) => {
            if let Some(ms) = args.request_timeout_ms.filter(|ms| *ms > 0) {
                config.request_timeout_ms = ms;
            }
            run(config).await
        }
        Commands::Load(args) => {
            let graph = load_schema_file(&args.file)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&graph_json(&graph))?);
            } else {
                print!("{}", summary(&graph));
            }
            if !graph.violations().is_empty() {
                process::exit(2);
            }
            Ok(())
        }
        Commands::Export { file } => {
            println!("{}", export_schema_file(&file)?);
            Ok(())
        }
        Commands::Schema(args) => {
            write_schema(&args.out)?;
            println!("Schemas written to {}", args.out.display());
            Ok(())
        }
    }
}

async fn run(config: EditorConfig) -> anyhow::Result<()> {
    info!("meta-schema editor starting up");

    let inbox = EditorInbox::new();
    let (transport, writer) = LineTransport::stdout(inbox.clone());
    let editor = SchemaEditor::mount(Bridge::new(transport), &inbox, &config);

    let mut changes = editor.store().subscribe();
    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(change) => debug!(event = %change.event, revision = change.revision, "graph changed"),
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "change listener lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    tokio::select! {
        read = pump_stdin(editor.bridge()) => match read {
            Ok(count) => info!(count, "host closed stdin"),
            Err(e) => error!("stdin read failed: {e}"),
        },
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    let graph = editor.snapshot();
    for violation in graph.violations() {
        warn!("{violation}");
    }
    info!(
        tables = graph.nodes().len(),
        edges = graph.edges().len(),
        revision = graph.revision(),
        "meta-schema editor shutting down"
    );

    // the writer drains once the last handle on the transport is gone
    drop(editor);
    if let Err(e) = writer.await {
        error!("bridge writer task failed: {e}");
    }
    Ok(())
}
