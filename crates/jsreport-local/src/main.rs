//! Run a local jsreport stand-in.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p jsreport-local
//! cargo run -p jsreport-local -- --port 5488 --username admin --password secret
//! cargo run -p jsreport-local -- --templates templates.json --render-delay-ms 500
//! ```
//!
//! `templates.json` is an array of stored templates:
//!
//! ```json
//! [{"shortid": "abc", "name": "invoice", "content": "{{:number}}",
//!   "engine": "jsrender", "recipe": "html"}]
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use jsreport_local::{LocalReporting, StoredTemplate};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Local jsreport stand-in with toy engines and recipes.
#[derive(Parser)]
#[command(name = "jsreport-local")]
struct Args {
    /// Port to listen on.
    #[arg(long, default_value_t = 5488)]
    port: u16,

    /// Require Basic auth with this user name.
    #[arg(long, env = "JSREPORT_LOCAL_USERNAME", requires = "password")]
    username: Option<String>,

    #[arg(long, env = "JSREPORT_LOCAL_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// JSON file with stored templates.
    #[arg(long)]
    templates: Option<String>,

    /// Artificial delay inside every render.
    #[arg(long, default_value_t = 0)]
    render_delay_ms: u64,

    /// Server-side render limit.
    #[arg(long, default_value_t = 30_000)]
    render_timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut builder = LocalReporting::new()
        .bind(SocketAddr::from(([127, 0, 0, 1], args.port)))
        .render_delay(Duration::from_millis(args.render_delay_ms))
        .render_timeout(Duration::from_millis(args.render_timeout_ms));

    if let (Some(username), Some(password)) = (args.username, args.password) {
        builder = builder.authenticated(username, password);
    }

    if let Some(path) = &args.templates {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read templates file '{path}': {e}"))?;
        let templates: Vec<StoredTemplate> = serde_json::from_str(&text)
            .map_err(|e| format!("failed to parse templates file '{path}': {e}"))?;
        builder = builder.with_templates(templates);
    }

    let server = builder
        .start()
        .await
        .map_err(|e| format!("failed to start server: {e}"))?;
    println!("jsreport-local: {}", server.uri());

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("failed to listen for ctrl-c: {e}"))?;
    server.stop().await;
    Ok(())
}
