//! keyseries CLI
//!
//! Command-line interface for a running keyseries server:
//! - Write samples
//! - Read ranges by time or index
//! - Page through a key with a cursor
//! - Browse the key namespace

use anyhow::{bail, Context};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use keyseries::api::RemoteClient;
use keyseries::cursor::{Cursor, IndexWindow, SeriesSource, TimeWindow};
use keyseries::storage::{Entry, Envelope, KeyPath, Sample, Value, ValueType};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "keyseries-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Client for the keyseries time-series store")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// API server URL
    #[arg(long, default_value = "http://localhost:8082", global = true)]
    pub api_url: String,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum TypeArg {
    Boolean,
    Integer,
    Float,
    String,
    Blob,
}

impl From<TypeArg> for ValueType {
    fn from(arg: TypeArg) -> Self {
        match arg {
            TypeArg::Boolean => ValueType::Boolean,
            TypeArg::Integer => ValueType::Integer,
            TypeArg::Float => ValueType::Float,
            TypeArg::String => ValueType::String,
            TypeArg::Blob => ValueType::Blob,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write one sample
    Write {
        /// Key path (e.g. plant.boiler.temp)
        path: String,
        /// Entry key
        key: String,
        /// Value; blobs are given as hex
        value: String,
        /// Declared type (default: inferred from the value)
        #[arg(short = 't', long = "type", value_enum)]
        value_type: Option<TypeArg>,
        /// Timestamp (default: server time). Supports: "now", ISO 8601, Unix seconds
        #[arg(long)]
        time: Option<String>,
    },

    /// Read a range of entries
    Get {
        path: String,
        /// Time range start, inclusive
        #[arg(long, conflicts_with = "index")]
        start: Option<String>,
        /// Time range end, exclusive
        #[arg(long, requires = "start")]
        end: Option<String>,
        /// Index range, inclusive on both ends (e.g. --index 0 99)
        #[arg(long, num_args = 2, value_names = ["FROM", "TO"])]
        index: Option<Vec<u64>>,
    },

    /// Page through a key with a cursor
    Page {
        path: String,
        /// Page by index with this many entries per page
        #[arg(long, conflicts_with = "span")]
        count: Option<u64>,
        /// Page by time with this span per page (e.g. 30s, 15m, 1h, 7d)
        #[arg(long)]
        span: Option<String>,
        /// First page start: an index, or a time when paging by span
        #[arg(long)]
        from: Option<String>,
        /// Number of pages to print
        #[arg(short, long, default_value = "1")]
        pages: usize,
    },

    /// List the children of a namespace node
    Keys {
        /// Parent path (default: root)
        #[arg(default_value = "")]
        path: String,
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

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let json = cli.format == "json";

    let client = Arc::new(RemoteClient::connect(&cli.api_url)?);

    match cli.command {
        Commands::Write {
            path,
            key,
            value,
            value_type,
            time,
        } => {
            let path = KeyPath::parse(&path)?;
            let value_type = value_type.map(ValueType::from);
            let mut sample = Sample::new(key, parse_value(&value, value_type)?);
            if let Some(value_type) = value_type {
                sample = sample.typed(value_type);
            }
            if let Some(time) = time.as_deref().filter(|t| *t != "now") {
                sample = sample.at(parse_time(time)?);
            }

            let response = client.write(&Envelope::new(path).sample(sample)).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!("Wrote {} entry to {}", response.written, response.path);
            }
        }

        Commands::Get {
            path,
            start,
            end,
            index,
        } => {
            let path = KeyPath::parse(&path)?;
            let entries = match (index, start) {
                (Some(bounds), _) => client.series_at(&path, bounds[0], bounds[1]).await?,
                (None, Some(start)) => {
                    let start = parse_time(&start)?;
                    let end = match end {
                        Some(end) => parse_time(&end)?,
                        None => Utc::now(),
                    };
                    client.series_between(&path, start, end).await?
                }
                (None, None) => bail!("Give either --start/--end or --index FROM TO"),
            };
            print_entries(&entries, json)?;
        }

        Commands::Page {
            path,
            count,
            span,
            from,
            pages,
        } => {
            let path = KeyPath::parse(&path)?;
            let source: Arc<dyn SeriesSource> = client;
            let mut cursor: Box<dyn Cursor> = match span {
                Some(span) => {
                    let span = parse_duration(&span)?;
                    let start = match from {
                        Some(from) => parse_time(&from)?,
                        None => Utc::now() - span,
                    };
                    Box::new(TimeWindow::new(source, path, start, span))
                }
                None => {
                    let start = match from {
                        Some(from) => from.parse().context("--from must be an index")?,
                        None => 0,
                    };
                    Box::new(IndexWindow::new(source, path, start, count.unwrap_or(100)))
                }
            };

            cursor.reload().await;
            for page in 1..=pages.max(1) {
                if let Some(error) = cursor.last_error() {
                    bail!("Page {} failed: {}", page, error);
                }
                if !json {
                    println!("== page {} ({} entries) ==", page, cursor.entries().len());
                }
                print_entries(cursor.entries(), json)?;
                if page == pages || !cursor.next().await {
                    break;
                }
            }
        }

        Commands::Keys { path } => {
            let path = KeyPath::parse(&path)?;
            let keys = client.keys(&path).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&keys)?);
            } else if keys.is_empty() {
                println!("No keys under '{}'", path);
            } else {
                println!("{:<40} {:<10} {:<8} {}", "Path", "Type", "Status", "Children");
                println!("{}", "-".repeat(70));
                for key in keys {
                    println!(
                        "{:<40} {:<10} {:<8} {}",
                        key.path.to_string(),
                        key.value_type
                            .map(|t| t.to_string())
                            .unwrap_or_else(|| "-".to_string()),
                        key.status,
                        if key.has_children { "yes" } else { "" }
                    );
                }
            }
        }

        Commands::Status => match client.health().await {
            Ok(health) => {
                if json {
                    println!("{}", serde_json::to_string_pretty(&health)?);
                } else {
                    println!("keyseries v{}", health.version);
                    println!();
                    println!("Status: {}", health.status);
                    println!("Backend: {} ({})", health.stats.backend, health.storage);
                    println!("Keys: {}", health.stats.keys);
                    println!(
                        "Resident series: {} ({} entries)",
                        health.stats.resident_series, health.stats.entries
                    );
                    println!("Live connections: {}", health.connections);
                    println!("Uptime: {}", format_duration(health.uptime_seconds));
                }
            }
            Err(e) => {
                eprintln!("Cannot reach keyseries at {}", cli.api_url);
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        },

        Commands::Config { output } => {
            let config = keyseries::config::generate_default_config();
            match output {
                Some(path) => {
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, &config)?;
                    println!("Config written to {:?}", path);
                }
                None => print!("{}", config),
            }
        }
    }

    Ok(())
}

fn parse_value(raw: &str, declared: Option<ValueType>) -> anyhow::Result<Value> {
    let value = match declared {
        Some(ValueType::Boolean) => Value::Bool(raw.parse().context("not a boolean")?),
        Some(ValueType::Integer) => Value::Int(raw.parse().context("not an integer")?),
        Some(ValueType::Float) => Value::Float(raw.parse().context("not a float")?),
        Some(ValueType::String) => Value::Str(raw.to_string()),
        Some(ValueType::Blob) => Value::Blob(parse_hex(raw)?),
        None => {
            if let Ok(b) = raw.parse::<bool>() {
                Value::Bool(b)
            } else if let Ok(i) = raw.parse::<i64>() {
                Value::Int(i)
            } else if let Ok(f) = raw.parse::<f64>() {
                Value::Float(f)
            } else {
                Value::Str(raw.to_string())
            }
        }
    };
    Ok(value)
}

fn parse_hex(raw: &str) -> anyhow::Result<Vec<u8>> {
    let digits = raw.trim_start_matches("0x");
    if digits.len() % 2 != 0 {
        bail!("Hex blob needs an even number of digits");
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).context("invalid hex digit"))
        .collect()
}

fn parse_time(s: &str) -> anyhow::Result<DateTime<Utc>> {
    if s == "now" {
        return Ok(Utc::now());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(secs) = s.parse::<i64>() {
        if let Some(dt) = DateTime::from_timestamp(secs, 0) {
            return Ok(dt);
        }
    }
    bail!("Invalid timestamp: {}. Use ISO 8601 or Unix seconds", s)
}

fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim().to_lowercase();

    let duration = if let Some(secs) = s.strip_suffix('s') {
        Duration::seconds(secs.parse()?)
    } else if let Some(mins) = s.strip_suffix('m') {
        Duration::minutes(mins.parse()?)
    } else if let Some(hours) = s.strip_suffix('h') {
        Duration::hours(hours.parse()?)
    } else if let Some(days) = s.strip_suffix('d') {
        Duration::days(days.parse()?)
    } else {
        bail!("Invalid span: {}. Use: 30s, 15m, 1h, 7d", s);
    };

    if duration <= Duration::zero() {
        bail!("Span must be positive");
    }
    Ok(duration)
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

fn print_entries(entries: &[Entry], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No data");
        return Ok(());
    }

    println!("{:<32} {:<16} {:<8} {}", "Timestamp", "Key", "Type", "Value");
    println!("{}", "-".repeat(72));
    for entry in entries {
        println!(
            "{:<32} {:<16} {:<8} {}",
            entry.timestamp.to_rfc3339(),
            entry.key,
            entry.value_type.to_string(),
            entry.value
        );
    }
    Ok(())
}
