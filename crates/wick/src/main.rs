use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::multipart;
use reqwest::Client;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

// ── CLI definition ─────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "wick", about = "Share burn-after-reading secrets", version)]
struct Cli {
    /// Server URL for client commands ($WICK_SERVER)
    #[arg(long, env = "WICK_SERVER", default_value = "http://localhost:8080")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the wick HTTP server
    Serve {
        /// Host to bind ($WICK_HOST)
        #[arg(long, env = "WICK_HOST", default_value = "0.0.0.0")]
        host: String,
        /// Port to listen on ($WICK_PORT)
        #[arg(long, env = "WICK_PORT", default_value = "8080")]
        port: u16,
        /// Length of generated secret keys ($WICK_KEY_LENGTH)
        #[arg(long, env = "WICK_KEY_LENGTH", default_value = "16")]
        key_length: usize,
        /// Sweeper period, e.g. 5m ($WICK_SWEEP_INTERVAL)
        #[arg(long, env = "WICK_SWEEP_INTERVAL", default_value = "5m")]
        sweep_interval: String,
    },
    /// Create a secret and print its one-time link
    Post {
        /// Text to share (omit when using --file)
        #[arg(conflicts_with = "file")]
        text: Option<String>,
        /// Share a file instead of a text message
        #[arg(long)]
        file: Option<PathBuf>,
        /// How many times the link may be viewed
        #[arg(long, default_value = "1")]
        views: u32,
        /// Lifetime of the link, e.g. 30m, 1h30m, 2d
        #[arg(long, default_value = "1h")]
        expires: String,
    },
    /// Redeem a key or link, printing the payload to stdout
    Get {
        /// Secret key, or a full link pasted from the browser
        key: String,
        /// Write the payload to a file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Show a secret's counters without spending a view
    Info {
        /// Secret key, or a full link pasted from the browser
        key: String,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("WICK_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            host,
            port,
            key_length,
            sweep_interval,
        } => cmd_serve(host, port, key_length, &sweep_interval).await,

        Commands::Post {
            text,
            file,
            views,
            expires,
        } => cmd_post(&cli.server, text, file, views, &expires).await,

        Commands::Get { key, output } => cmd_get(&cli.server, &key, output).await,

        Commands::Info { key } => cmd_info(&cli.server, &key).await,
    }
}

// ── Command implementations ───────────────────────────────────────────────────

async fn cmd_serve(host: String, port: u16, key_length: usize, sweep_interval: &str) -> Result<()> {
    let sweep_interval =
        humantime::parse_duration(sweep_interval).context("invalid --sweep-interval")?;

    let cfg = wick_server::ServerConfig {
        host,
        port,
        key_length,
        sweep_interval,
        ..Default::default()
    };

    wick_server::run(cfg).await
}

async fn cmd_post(
    server: &str,
    text: Option<String>,
    file: Option<PathBuf>,
    views: u32,
    expires: &str,
) -> Result<()> {
    let url = format!("{}/api/", server.trim_end_matches('/'));
    let client = Client::new();
    let views_str = views.to_string();

    let resp = match (text, file) {
        (_, Some(path)) => {
            let bytes =
                std::fs::read(&path).with_context(|| format!("read {}", path.display()))?;
            let filename = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("upload.bin")
                .to_owned();
            let form = multipart::Form::new()
                .part("data", multipart::Part::bytes(bytes).file_name(filename))
                .text("maxViews", views_str)
                .text("expireIn", expires.to_owned());
            client.post(&url).multipart(form).send().await
        }
        (Some(text), None) => {
            let form = [
                ("data", text.as_str()),
                ("maxViews", views_str.as_str()),
                ("expireIn", expires),
            ];
            client.post(&url).form(&form).send().await
        }
        (None, None) => anyhow::bail!("provide text to share, or --file"),
    }
    .context("HTTP request failed")?;

    let status = resp.status();
    let body = resp.text().await.context("read response")?;
    if !status.is_success() {
        anyhow::bail!("server returned {status}: {body}");
    }

    // The server answers with the bare key; the link is origin + key.
    println!("{}/{}", server.trim_end_matches('/'), body.trim());
    Ok(())
}

async fn cmd_get(server: &str, key: &str, output: Option<PathBuf>) -> Result<()> {
    let url = resolve_link(server, key);
    let client = Client::new();
    let resp = client.get(&url).send().await.context("HTTP request failed")?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("server returned {status}: {body}");
    }

    let views_left = resp
        .headers()
        .get("X-Wick-Views-Left")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u32>().ok());

    let bytes = resp.bytes().await.context("read response")?;
    match output {
        Some(path) => {
            std::fs::write(&path, &bytes)
                .with_context(|| format!("write {}", path.display()))?;
            eprintln!("wrote {} bytes to {}", bytes.len(), path.display());
        }
        None => {
            use std::io::Write;
            std::io::stdout()
                .write_all(&bytes)
                .context("write to stdout")?;
        }
    }

    // Status chatter goes to stderr so the payload on stdout stays clean.
    match views_left {
        Some(0) => eprintln!("(link is now burned)"),
        Some(left) => eprintln!("({left} view(s) left)"),
        None => {}
    }
    Ok(())
}

async fn cmd_info(server: &str, key: &str) -> Result<()> {
    let url = format!("{}/api/{}", server.trim_end_matches('/'), bare_key(key));
    let client = Client::new();
    let resp = client.get(&url).send().await.context("HTTP request failed")?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("server returned {status}: {body}");
    }

    let json: Value = resp.json().await.context("parse response")?;
    let views = json["views"].as_u64().unwrap_or(0);
    let max_views = json["maxViews"].as_u64().unwrap_or(0);
    let expire_ns = json["expireIn"].as_u64().unwrap_or(0);

    println!("views:      {views}/{max_views}");
    println!(
        "expires in: {}",
        humantime::format_duration(Duration::from_nanos(expire_ns))
    );
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Accept either a bare key or a full link pasted from the browser.
fn resolve_link(server: &str, key: &str) -> String {
    if key.starts_with("http://") || key.starts_with("https://") {
        key.to_owned()
    } else {
        format!("{}/{}", server.trim_end_matches('/'), key.trim_matches('/'))
    }
}

/// The key segment of either a bare key or a full link.
fn bare_key(input: &str) -> &str {
    input
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(input)
}
