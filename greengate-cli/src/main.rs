use clap::{Parser, Subcommand};
use colored::*;
use reqwest::Client;
use serde_json::json;
use std::env;
use std::path::PathBuf;

const DEFAULT_API_URL: &str = "http://127.0.0.1:8080/api/v1";

#[derive(Parser)]
#[command(name = "greengate")]
#[command(about = "GreenGate CLI - Validate plots, generate reports, verify authenticity", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, default_value = DEFAULT_API_URL)]
    api_url: String,

    #[arg(long, env = "GREENGATE_API_KEY")]
    api_key: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a polygon against the reference layers
    Validate {
        /// Path to a GeoJSON file with the plot polygon
        #[arg(short, long)]
        geometry: PathBuf,
        /// Use the public quick endpoint (no API key, not billed)
        #[arg(long)]
        quick: bool,
    },
    /// Generate a due-diligence PDF report
    Report {
        #[arg(short, long)]
        geometry: PathBuf,
        /// Output path for the PDF
        #[arg(short, long, default_value = "laudo.pdf")]
        output: PathBuf,
        /// Report language: pt or en
        #[arg(short, long, default_value = "pt")]
        lang: String,
        /// Property name shown on the cover
        #[arg(long)]
        property: Option<String>,
        /// Plot name shown on the cover
        #[arg(long)]
        plot: Option<String>,
    },
    /// Verify the authenticity of a report code
    Verify {
        /// Report code, e.g. GG-20250101120000-A1B2
        code: String,
        /// Optional GeoJSON file to re-verify the geometry hash
        #[arg(short, long)]
        geometry: Option<PathBuf>,
    },
    /// Show reference-data freshness
    Freshness,
}

fn read_geometry(path: &PathBuf) -> anyhow::Result<serde_json::Value> {
    let text = std::fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&text)?;
    // Accept a bare geometry or a Feature envelope.
    Ok(value.get("geometry").cloned().unwrap_or(value))
}

fn print_verdict(verdict: &serde_json::Value) {
    let status = verdict.get("status").and_then(|s| s.as_str()).unwrap_or("?");
    let score = verdict.get("risk_score").and_then(|s| s.as_i64()).unwrap_or(-1);

    let status_line = match status {
        "approved" => format!("✓ APTO (score {score}/100)").green().bold(),
        "warning" => format!("! APTO COM RESSALVAS (score {score}/100)").yellow().bold(),
        "rejected" => format!("✗ NÃO APTO (score {score}/100)").red().bold(),
        other => format!("? {other}").normal(),
    };
    println!("\n{status_line}");

    if let Some(checks) = verdict.get("checks").and_then(|c| c.as_array()) {
        println!("\n{}", "Critérios:".bold());
        for check in checks {
            let kind = check.get("check_type").and_then(|v| v.as_str()).unwrap_or("?");
            let check_status = check.get("status").and_then(|v| v.as_str()).unwrap_or("?");
            let overlap = check.get("overlap_area_ha").and_then(|v| v.as_f64()).unwrap_or(0.0);
            let marker = match check_status {
                "pass" => "✓".green(),
                "fail" => "✗".red(),
                "warning" => "!".yellow(),
                _ => "-".normal(),
            };
            if overlap > 0.0 {
                println!("  {marker} {kind}: {check_status} ({overlap:.4} ha)");
            } else {
                println!("  {marker} {kind}: {check_status}");
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let client = Client::new();
    let base_url = cli.api_url.trim_end_matches('/');
    let api_key = cli.api_key.or_else(|| env::var("GREENGATE_API_KEY").ok());

    match cli.command {
        Commands::Validate { geometry, quick } => {
            println!("{}", "Validating plot...".cyan());
            let geom = read_geometry(&geometry)?;

            let endpoint = if quick { "validations/quick" } else { "validations/validate" };
            let mut request = client
                .post(format!("{base_url}/{endpoint}"))
                .header("Content-Type", "application/json")
                .json(&geom);
            if !quick {
                let key = api_key.ok_or_else(|| {
                    anyhow::anyhow!("API key required. Set GREENGATE_API_KEY or use --api-key (or pass --quick)")
                })?;
                request = request.header("x-api-key", key);
            }

            let response = request.send().await?;
            if response.status().is_success() {
                let verdict: serde_json::Value = response.json().await?;
                print_verdict(&verdict);
            } else {
                let status = response.status();
                let error: serde_json::Value = response.json().await.unwrap_or(json!({}));
                eprintln!("{}", format!("✗ Validation failed ({status})").red());
                eprintln!("  Error: {}", error.get("error").unwrap_or(&json!("Unknown error")));
            }
        }
        Commands::Report { geometry, output, lang, property, plot } => {
            println!("{}", "Generating due-diligence report...".cyan());
            let geom = read_geometry(&geometry)?;
            let key = api_key.ok_or_else(|| {
                anyhow::anyhow!("API key required. Set GREENGATE_API_KEY or use --api-key")
            })?;

            let response = client
                .post(format!("{base_url}/reports/due-diligence/quick"))
                .header("x-api-key", key)
                .header("Content-Type", "application/json")
                .json(&json!({
                    "geometry": geom,
                    "property_info": {
                        "property_name": property,
                        "plot_name": plot,
                    },
                    "lang": lang,
                }))
                .send()
                .await?;

            if response.status().is_success() {
                let report_code = response
                    .headers()
                    .get("x-report-code")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("?")
                    .to_string();
                let content_hash = response
                    .headers()
                    .get("x-content-hash")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("?")
                    .to_string();
                let bytes = response.bytes().await?;
                std::fs::write(&output, &bytes)?;
                println!("{}", "✓ Report generated".green());
                println!("  Code: {}", report_code.bold());
                println!("  Hash: {content_hash}");
                println!("  Saved: {} ({} bytes)", output.display(), bytes.len());
            } else {
                let status = response.status();
                let error: serde_json::Value = response.json().await.unwrap_or(json!({}));
                eprintln!("{}", format!("✗ Report generation failed ({status})").red());
                eprintln!("  Error: {}", error.get("error").unwrap_or(&json!("Unknown error")));
            }
        }
        Commands::Verify { code, geometry } => {
            println!("{}", format!("Verifying report {code}...").cyan());

            let response = match &geometry {
                Some(path) => {
                    let geom = read_geometry(path)?;
                    client
                        .post(format!("{base_url}/reports/verify/{code}/geometry"))
                        .header("Content-Type", "application/json")
                        .json(&geom)
                        .send()
                        .await?
                }
                None => client.get(format!("{base_url}/reports/verify/{code}")).send().await?,
            };

            let result: serde_json::Value = response.json().await?;
            if result.get("valid").and_then(|v| v.as_bool()).unwrap_or(false) {
                println!("{}", "✓ Report is authentic".green().bold());
                if let Some(status) = result.get("status") {
                    println!("  Status: {status}");
                }
                if let Some(score) = result.get("risk_score") {
                    println!("  Score: {score}/100");
                }
                if let Some(created) = result.get("created_at") {
                    println!("  Issued: {created}");
                }
            } else {
                println!("{}", "✗ Report is NOT valid".red().bold());
                println!("  Reason: {}", result.get("error").unwrap_or(&json!("Unknown")));
            }
        }
        Commands::Freshness => {
            println!("{}", "Fetching reference-data freshness...".cyan());
            let response = client.get(format!("{base_url}/metadata/data-freshness")).send().await?;

            if response.status().is_success() {
                let result: serde_json::Value = response.json().await?;
                println!("{}", "✓ Layer freshness:".green());
                if let Some(layers) = result.get("layers").and_then(|l| l.as_object()) {
                    for (layer, updated) in layers {
                        println!("  {}: {}", layer.bold(), updated);
                    }
                }
            } else {
                eprintln!("{}", "✗ Failed to fetch freshness".red());
            }
        }
    }

    Ok(())
}
