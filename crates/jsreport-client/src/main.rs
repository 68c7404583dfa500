//! Render reports on a jsreport server from the command line.
//!
//! # Examples
//!
//! ```sh
//! # Inline template to a PDF file
//! jsreport --url http://localhost:5488 render --content "<h1>{{:title}}</h1>" \
//!   --engine jsrender --recipe chrome-pdf --data '{"title": "Hello"}' --output hello.pdf
//!
//! # Stored template by short id, data from a file, report to stdout
//! jsreport --url https://reports.example.com --username admin \
//!   render --shortid rkJTnK2ce --data-file invoice.json > invoice.pdf
//!
//! # Raw request object, gzip-compressed, 10 s budget
//! jsreport --url http://localhost:5488 --compression --timeout-ms 10000 \
//!   render --request-file request.json -o out.xlsx
//!
//! # Server information, with the server taken from the environment
//! export JSREPORT_URL=http://localhost:5488
//! jsreport recipes
//! jsreport version
//! ```

use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use jsreport_client::{
    CancellationToken, ClientConfig, Engine, Recipe, RenderOptions, RenderPayload, RenderRequest,
    ReportError, ReportingService, Template,
};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Render reports on a jsreport server.
#[derive(Parser)]
#[command(name = "jsreport", version)]
struct Cli {
    // ── Connection ─────────────────────────────────────────────
    /// Base URI of the reporting server (required)
    #[arg(long, env = "JSREPORT_URL")]
    url: String,

    /// Basic-auth user name
    #[arg(long, env = "JSREPORT_USERNAME")]
    username: Option<String>,

    /// Basic-auth password
    #[arg(long, env = "JSREPORT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Gzip request bodies
    #[arg(long)]
    compression: bool,

    /// Abort a call after this many milliseconds
    #[arg(long, env = "JSREPORT_TIMEOUT_MS")]
    timeout_ms: Option<u64>,

    /// More log output on stderr (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render a report
    Render(RenderArgs),
    /// List the recipes registered on the server
    Recipes,
    /// List the engines registered on the server
    Engines,
    /// Print the server version
    Version,
}

#[derive(Args)]
struct RenderArgs {
    // ── Template ───────────────────────────────────────────────
    /// Inline template content
    #[arg(long, conflicts_with_all = ["content_file", "shortid", "name", "request_file"])]
    content: Option<String>,

    /// Read inline template content from a file
    #[arg(long, conflicts_with_all = ["shortid", "name", "request_file"])]
    content_file: Option<PathBuf>,

    /// Templating engine for inline content
    #[arg(long, default_value = "none")]
    engine: String,

    /// Recipe for inline content
    #[arg(long, default_value = "html")]
    recipe: String,

    /// File with helper functions for inline content
    #[arg(long)]
    helpers_file: Option<PathBuf>,

    /// Stored template short id
    #[arg(long, conflicts_with_all = ["name", "request_file"])]
    shortid: Option<String>,

    /// Stored template name
    #[arg(long, conflicts_with = "request_file")]
    name: Option<String>,

    // ── Data ───────────────────────────────────────────────────
    /// Input data as JSON text
    #[arg(long, conflicts_with = "data_file")]
    data: Option<String>,

    /// Read input data from a JSON file
    #[arg(long)]
    data_file: Option<PathBuf>,

    /// Send this file as the whole render request
    #[arg(long)]
    request_file: Option<PathBuf>,

    // ── Output ─────────────────────────────────────────────────
    /// Ask for a preview rendering
    #[arg(long)]
    preview: bool,

    /// Write the report here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(cli: Cli) -> Result<(), ReportError> {
    let mut config = ClientConfig::new(&cli.url)?.with_compression(cli.compression);
    if let Some(username) = cli.username {
        config = config.with_credentials(username, cli.password.unwrap_or_default());
    }
    if let Some(ms) = cli.timeout_ms {
        config = config.with_timeout(Duration::from_millis(ms));
    }
    let service = ReportingService::from_config(config)?;

    match cli.command {
        Command::Render(args) => render(&service, args).await,
        Command::Recipes => {
            for recipe in service.list_recipes().await? {
                println!("{recipe}");
            }
            Ok(())
        }
        Command::Engines => {
            for engine in service.list_engines().await? {
                println!("{engine}");
            }
            Ok(())
        }
        Command::Version => {
            println!("{}", service.server_version().await?);
            Ok(())
        }
    }
}

async fn render(service: &ReportingService, args: RenderArgs) -> Result<(), ReportError> {
    let payload = build_payload(&args)?;

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("ctrl-c received, cancelling render");
            on_ctrl_c.cancel();
        }
    });

    let report = service.render_cancellable(payload, &cancel).await?;
    debug!("report metadata: {:?}", report.meta);

    match &args.output {
        Some(path) => {
            let written = report.save(path).await?;
            eprintln!("Wrote {written} bytes to {}", path.display());
        }
        None => {
            let mut stdout = tokio::io::stdout();
            report.content.copy_to(&mut stdout).await?;
            stdout.flush().await.map_err(ReportError::Io)?;
        }
    }
    Ok(())
}

fn build_payload(args: &RenderArgs) -> Result<RenderPayload, ReportError> {
    if let Some(path) = &args.request_file {
        let request: Value = read_json(path)?;
        return RenderPayload::from_value(&request);
    }

    let data = match (&args.data, &args.data_file) {
        (Some(text), _) => Some(parse_json(text)?),
        (None, Some(path)) => Some(read_json(path)?),
        (None, None) => None,
    };

    let template = if let Some(shortid) = &args.shortid {
        Template::by_shortid(shortid.as_str())
    } else if let Some(name) = &args.name {
        Template::by_name(name.as_str())
    } else {
        let content = match (&args.content, &args.content_file) {
            (Some(content), _) => content.clone(),
            (None, Some(path)) => read_text(path)?,
            (None, None) => {
                return Err(ReportError::InvalidRequest(
                    "one of --content, --content-file, --shortid, --name or --request-file is required"
                        .to_string(),
                ));
            }
        };
        let mut template = Template::inline(
            content,
            Engine::from(args.engine.as_str()),
            Recipe::from(args.recipe.as_str()),
        );
        if let Some(path) = &args.helpers_file {
            template = template.with_helpers(read_text(path)?);
        }
        template
    };

    let mut request = RenderRequest::new(template);
    request.data = data;
    if args.preview {
        request = request.with_options(RenderOptions {
            preview: Some(true),
            ..RenderOptions::default()
        });
    }
    Ok(request.into())
}

fn read_text(path: &Path) -> Result<String, ReportError> {
    std::fs::read_to_string(path).map_err(ReportError::Io)
}

fn read_json(path: &Path) -> Result<Value, ReportError> {
    parse_json(&read_text(path)?)
}

fn parse_json(text: &str) -> Result<Value, ReportError> {
    serde_json::from_str(text).map_err(ReportError::Serialization)
}
