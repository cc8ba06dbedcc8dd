//! FeedbackJar CLI
//!
//! Command-line interface for FeedbackJar operations:
//! - Track events
//! - Manage and render charts
//! - Explain the SQL behind a chart
//! - Check server status

use anyhow::{anyhow, bail, Context};
use chrono::{Duration, Utc};
use clap::{Args, Parser, Subcommand};
use feedbackjar::query::{compile, ChartData, GroupByDimension, RawChartSpec, ResultShape};
use feedbackjar::storage::NewEvent;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "feedbackjar-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Product analytics dashboards for FeedbackJar projects")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// API server URL
    #[arg(long, default_value = "http://localhost:8090", global = true)]
    pub api_url: String,

    /// Project id
    #[arg(short, long, default_value = "default", global = true)]
    pub project: String,

    /// Output format (table, json, csv)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Track an event
    Track {
        /// Event type
        event_type: String,
        /// Timestamp (default: now). Supports: "now", "yesterday", ISO 8601, Unix milliseconds
        #[arg(short, long)]
        time: Option<String>,
        /// Dimensions in key=value format (country=US, browser=Firefox, ...)
        #[arg(short, long)]
        dimension: Vec<String>,
        /// Free-form JSON metadata
        #[arg(short, long)]
        metadata: Option<String>,
    },

    /// List saved charts
    Charts,

    /// Save a new chart
    CreateChart {
        /// Chart name
        name: String,
        /// Description
        #[arg(long)]
        description: Option<String>,
        #[command(flatten)]
        spec: SpecArgs,
    },

    /// Delete a saved chart
    DeleteChart {
        /// Chart id
        chart_id: String,
    },

    /// Render a saved chart
    Render {
        /// Chart id
        chart_id: String,
    },

    /// Render a chart without saving it
    Preview {
        #[command(flatten)]
        spec: SpecArgs,
    },

    /// Print the SQL and parameters a chart compiles to (offline)
    Explain {
        #[command(flatten)]
        spec: SpecArgs,
    },

    /// Show server status
    Status,

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Chart specification flags
#[derive(Args)]
pub struct SpecArgs {
    /// Chart type (number, line, bar, pie)
    #[arg(short = 'c', long, default_value = "line")]
    pub chart_type: String,
    /// Event types to count (comma-separated or repeated; empty = all events)
    #[arg(short, long)]
    pub events: Vec<String>,
    /// Dimension to group by
    #[arg(short, long)]
    pub group_by: Option<String>,
    /// Time range (24h, 7d, 30d, 90d, all)
    #[arg(short = 'r', long, default_value = "7d")]
    pub time_range: String,
    /// Bucket size (hour, day, week, month)
    #[arg(short = 'G', long, default_value = "day")]
    pub granularity: String,
}

impl SpecArgs {
    fn to_raw(&self) -> RawChartSpec {
        RawChartSpec {
            chart_type: self.chart_type.clone(),
            event_types: self
                .events
                .iter()
                .flat_map(|e| e.split(',').map(|s| s.trim().to_string()))
                .filter(|s| !s.is_empty())
                .collect(),
            group_by: self.group_by.clone(),
            time_range: self.time_range.clone(),
            granularity: self.granularity.clone(),
        }
    }
}

/// Chart data as returned by the API
#[derive(Deserialize)]
struct RenderedChart {
    shape: ResultShape,
    data: ChartData,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = format!("{}/api/v1/projects/{}", cli.api_url, cli.project);

    match &cli.command {
        Commands::Track {
            event_type,
            time,
            dimension,
            metadata,
        } => {
            let timestamp = parse_time(time.as_deref())?;

            let mut event = NewEvent::new(event_type.clone()).at(timestamp);
            for pair in dimension {
                let (key, value) = pair
                    .split_once('=')
                    .ok_or_else(|| anyhow!("Invalid dimension '{}', expected key=value", pair))?;
                event = event.dimension(key.parse::<GroupByDimension>()?, value);
            }
            if let Some(raw) = metadata {
                event = event.metadata(serde_json::from_str(raw).context("parsing --metadata")?);
            }

            let response = client
                .post(format!("{}/events", base))
                .json(&event)
                .send()
                .await?;
            let body: serde_json::Value = expect_success(response, "Track").await?.json().await?;

            println!(
                "Tracked {} at {} ({})",
                event_type,
                format_timestamp(timestamp),
                body["id"].as_str().unwrap_or("-")
            );
        }

        Commands::Charts => {
            let response = client.get(format!("{}/charts", base)).send().await?;
            let body: serde_json::Value = expect_success(response, "List charts").await?.json().await?;

            if cli.format == "json" {
                println!("{}", serde_json::to_string_pretty(&body)?);
                return Ok(());
            }

            let charts = body["charts"].as_array().cloned().unwrap_or_default();
            if charts.is_empty() {
                println!("No charts in project {}.", cli.project);
                println!();
                println!("Create your first chart with:");
                println!("  feedbackjar-cli create-chart \"Signups\" -c line -e signup");
                return Ok(());
            }

            println!(
                "{:<4} {:<24} {:<7} {:<20} {:<6} {:<7} {}",
                "Pos", "Name", "Type", "Events", "Range", "Group", "ID"
            );
            println!("{}", "-".repeat(110));

            for chart in charts {
                let events = chart["eventTypes"]
                    .as_array()
                    .map(|types| {
                        types
                            .iter()
                            .filter_map(|t| t.as_str())
                            .collect::<Vec<_>>()
                            .join(",")
                    })
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| "(all)".to_string());

                println!(
                    "{:<4} {:<24} {:<7} {:<20} {:<6} {:<7} {}",
                    chart["position"].as_i64().unwrap_or(0),
                    truncate(chart["name"].as_str().unwrap_or("-"), 24),
                    chart["chartType"].as_str().unwrap_or("-"),
                    truncate(&events, 20),
                    chart["timeRange"].as_str().unwrap_or("-"),
                    chart["groupBy"].as_str().unwrap_or("-"),
                    chart["id"].as_str().unwrap_or("-")
                );
            }
        }

        Commands::CreateChart {
            name,
            description,
            spec,
        } => {
            let mut body = serde_json::to_value(spec.to_raw())?;
            body["name"] = serde_json::json!(name);
            if let Some(description) = description {
                body["description"] = serde_json::json!(description);
            }

            let response = client
                .post(format!("{}/charts", base))
                .json(&body)
                .send()
                .await?;
            let chart: serde_json::Value =
                expect_success(response, "Create chart").await?.json().await?;

            println!(
                "Created chart {} ({})",
                chart["name"].as_str().unwrap_or("-"),
                chart["id"].as_str().unwrap_or("-")
            );
        }

        Commands::DeleteChart { chart_id } => {
            let response = client
                .delete(format!("{}/charts/{}", base, chart_id))
                .send()
                .await?;
            expect_success(response, "Delete chart").await?;
            println!("Deleted chart {}", chart_id);
        }

        Commands::Render { chart_id } => {
            let url = format!("{}/charts/{}/data", base, chart_id);

            if cli.format == "csv" {
                let response = client.get(&url).query(&[("format", "csv")]).send().await?;
                print!("{}", expect_success(response, "Render").await?.text().await?);
                return Ok(());
            }

            let response = client.get(&url).send().await?;
            let body: serde_json::Value = expect_success(response, "Render").await?.json().await?;
            print_chart(&body, &cli.format)?;
        }

        Commands::Preview { spec } => {
            let response = client
                .post(format!("{}/charts/preview", base))
                .json(&spec.to_raw())
                .send()
                .await?;
            let body: serde_json::Value = expect_success(response, "Preview").await?.json().await?;
            print_chart(&body, &cli.format)?;
        }

        Commands::Explain { spec } => {
            let spec = spec.to_raw().validate(Default::default())?;
            let query = compile(&cli.project, &spec)?;

            if cli.format == "json" {
                println!("{}", serde_json::to_string_pretty(&query)?);
                return Ok(());
            }

            println!("Shape: {:?}", query.shape);
            if !query.series.is_empty() {
                println!("Series: {}", query.series.join(", "));
            }
            println!();
            println!("{}", query.sql);
            println!();
            println!("Parameters:");
            for (i, param) in query.params.iter().enumerate() {
                println!("  ?{} = {}", i + 1, serde_json::to_string(param)?);
            }
        }

        Commands::Status => {
            let response = client.get(format!("{}/health", cli.api_url)).send().await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    let health: serde_json::Value = resp.json().await?;

                    println!("FeedbackJar v{}", env!("CARGO_PKG_VERSION"));
                    println!();
                    println!("API Status: {}", health["status"].as_str().unwrap_or("unknown"));
                    println!("Database: {}", health["database"].as_str().unwrap_or("unknown"));

                    if let Some(version) = health["schema_version"].as_i64() {
                        println!("  Schema version: {}", version);
                    }
                    if let Some(events) = health["events"].as_i64() {
                        println!("  Total events: {}", events);
                    }

                    if let Some(uptime) = health["uptime_seconds"].as_u64() {
                        println!();
                        println!("Uptime: {}", format_duration(uptime));
                    }
                }
                Ok(resp) => bail!("API returned error: {}", resp.status()),
                Err(e) => {
                    eprintln!("Cannot connect to FeedbackJar API at {}", cli.api_url);
                    eprintln!();
                    eprintln!("Make sure the API server is running:");
                    eprintln!("  cargo run --bin feedbackjar");
                    return Err(e.into());
                }
            }
        }

        Commands::Config { output } => {
            let config = feedbackjar::config::generate_default_config();

            match output {
                Some(path) => {
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(path, &config)?;
                    println!("Config written to {:?}", path);
                }
                None => {
                    print!("{}", config);
                }
            }
        }
    }

    Ok(())
}

/// Turn a non-2xx response into an error carrying the server's message
async fn expect_success(
    response: reqwest::Response,
    action: &str,
) -> anyhow::Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&text)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or(text);

    bail!("{} failed ({}): {}", action, status, message)
}

fn parse_time(time: Option<&str>) -> anyhow::Result<i64> {
    match time {
        None | Some("now") => Ok(Utc::now().timestamp_millis()),
        Some("yesterday") => Ok((Utc::now() - Duration::days(1)).timestamp_millis()),
        Some(s) => {
            if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
                Ok(dt.timestamp_millis())
            } else if let Ok(ts) = s.parse::<i64>() {
                Ok(ts)
            } else {
                bail!("Invalid timestamp format: {}", s)
            }
        }
    }
}

fn print_chart(body: &serde_json::Value, format: &str) -> anyhow::Result<()> {
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(body)?);
        return Ok(());
    }

    let chart: RenderedChart =
        serde_json::from_value(body.clone()).context("unexpected chart data")?;

    match (chart.shape, &chart.data) {
        (ResultShape::Scalar, ChartData::Scalar { value }) => println!("{}", value),
        (ResultShape::Series, ChartData::Series { columns, rows }) => {
            if rows.is_empty() {
                println!("No data for the selected time range");
                return Ok(());
            }

            print!("{:<17}", "Bucket");
            for column in columns {
                print!(" | {:<10}", truncate(column, 10));
            }
            println!();
            println!("{}", "-".repeat(17 + columns.len() * 13));

            for row in rows {
                print!("{:<17}", format_bucket(row.bucket));
                for value in &row.values {
                    print!(" | {:<10}", value);
                }
                println!();
            }
        }
        (_, ChartData::Grouped { rows }) => {
            if rows.is_empty() {
                println!("No data for the selected time range");
                return Ok(());
            }

            let total: i64 = rows.iter().map(|r| r.value).sum();
            println!("{:<24} | {:<10} | {}", "Label", "Count", "Share");
            println!("{}", "-".repeat(46));
            for row in rows {
                let share = row.value as f64 * 100.0 / total.max(1) as f64;
                println!("{:<24} | {:<10} | {:.1}%", truncate(&row.label, 24), row.value, share);
            }
        }
        (shape, _) => bail!("Chart data does not match shape {:?}", shape),
    }

    Ok(())
}

fn format_timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ts)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn format_bucket(ts: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ts)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else if seconds < 86400 {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    } else {
        format!("{}d {}h", seconds / 86400, (seconds % 86400) / 3600)
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
        out.push('~');
        out
    }
}
