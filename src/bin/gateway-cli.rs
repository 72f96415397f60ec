use std::path::PathBuf;

use axum::http::Method;
use clap::{Parser, Subcommand};
use serde_json::Value;

use portfolio_gateway::auth::jwks::JwkSetDocument;
use portfolio_gateway::config::load_config;
use portfolio_gateway::routing::RouteTable;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Operator CLI for the portfolio gateway", long_about = None)]
struct Cli {
    /// Gateway base URL.
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Configuration file used by the offline commands.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query the gateway's /health endpoint
    Health,
    /// Print the compiled route table
    Routes,
    /// Show which route a request would match
    Match {
        method: String,
        path: String,
    },
    /// Fetch the configured key set and list its key ids
    Jwks,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Health => {
            let res = reqwest::get(format!("{}/health", cli.url.trim_end_matches('/'))).await?;
            print_response(res).await?;
        }
        Commands::Routes => {
            let config = load_config(cli.config.as_deref())?;
            let table = RouteTable::from_config(&config.routes)?;
            for rule in table.rules() {
                println!(
                    "{:<20} {:<7} {:<32} → {:<28} auth={:<5} class={}",
                    rule.name,
                    rule.method.to_string(),
                    rule.pattern.as_str(),
                    rule.target.as_str(),
                    rule.auth_required,
                    rule.rate_limit_class,
                );
            }
        }
        Commands::Match { method, path } => {
            let config = load_config(cli.config.as_deref())?;
            let table = RouteTable::from_config(&config.routes)?;
            let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())?;
            match table.match_route(&method, &path) {
                Ok(matched) => {
                    println!("route:  {}", matched.rule.name);
                    println!("target: {}", matched.rule.outbound_url(&path, None));
                    for (name, value) in matched.params.iter() {
                        println!("param:  {} = {}", name, value);
                    }
                }
                Err(e) => {
                    eprintln!("{}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Jwks => {
            let config = load_config(cli.config.as_deref())?;
            let endpoint = config.auth.jwks_endpoint();
            let document: JwkSetDocument = reqwest::get(&endpoint).await?.error_for_status()?.json().await?;
            println!("{} keys from {}", document.keys.len(), endpoint);
            for key in &document.keys {
                println!(
                    "  kid={} kty={} alg={}",
                    key.kid.as_deref().unwrap_or("-"),
                    key.kty,
                    key.alg.as_deref().unwrap_or("-"),
                );
            }
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
