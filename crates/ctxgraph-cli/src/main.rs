use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use ctxgraph_core::{Config, Severity};
use ctxgraph_engine::Engine;
use serde::Serialize;

#[derive(Parser)]
#[command(name = "ctxgraph")]
#[command(about = "Cross-file context engine: relationship graph, incremental updates, working-memory cache", long_about = None)]
#[command(version)]
struct Cli {
    /// Output format (json, pretty, table)
    #[arg(short, long, global = true, default_value = "pretty")]
    output: OutputFormat,

    /// Project root to analyze (defaults to the current directory)
    #[arg(long, global = true, env = "CTXGRAPH_PROJECT_ROOT")]
    project_root: Option<PathBuf>,

    /// Path to a config file (TOML/JSON/YAML), layered under CTXGRAPH_* env vars
    #[arg(long, global = true, env = "CTXGRAPH_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
    Table,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a single file or recursively walk a directory
    Analyze {
        /// File or directory to analyze (defaults to the project root)
        path: Option<PathBuf>,
    },

    /// Read a file's contents alongside its assembled cross-file context
    Read {
        /// File to read
        path: PathBuf,
    },

    /// List a file's outgoing relationships (what it depends on)
    Deps {
        /// File to inspect
        path: PathBuf,
    },

    /// List a file's incoming relationships (what depends on it)
    Dependents {
        /// File to inspect
        path: PathBuf,
    },

    /// Dump the full relationship graph
    Export,

    /// List accumulated warnings, optionally filtered
    Warnings {
        /// Restrict to warnings for this file
        #[arg(long)]
        file: Option<String>,

        /// Only show warnings at or above this severity
        #[arg(long, value_enum)]
        severity: Option<SeverityArg>,
    },

    /// Invalidate a cached file, or the whole cache if no path is given
    Invalidate {
        /// File to invalidate (omit to clear the entire cache)
        path: Option<String>,
    },

    /// Watch the project root for changes, updating the graph incrementally
    Watch {
        /// Poll interval in milliseconds
        #[arg(long, default_value = "500")]
        interval_ms: u64,
    },
}

#[derive(Clone, ValueEnum)]
enum SeverityArg {
    Info,
    Warning,
}

impl From<SeverityArg> for Severity {
    fn from(arg: SeverityArg) -> Self {
        match arg {
            SeverityArg::Info => Severity::Info,
            SeverityArg::Warning => Severity::Warning,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let project_root = cli
        .project_root
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));

    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    let engine = Arc::new(
        Engine::new(&project_root, config).context("failed to initialize engine")?,
    );

    match execute_command(&cli, &engine) {
        Ok(output) => {
            print_output(&cli.output, &output)?;
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(1)
        }
    }
}

fn execute_command(cli: &Cli, engine: &Arc<Engine>) -> Result<serde_json::Value> {
    match &cli.command {
        Commands::Analyze { path } => execute_analyze(engine, path.as_deref()),
        Commands::Read { path } => execute_read(engine, path),
        Commands::Deps { path } => execute_deps(engine, path),
        Commands::Dependents { path } => execute_dependents(engine, path),
        Commands::Export => Ok(serde_json::to_value(engine.export_graph())?),
        Commands::Warnings { file, severity } => execute_warnings(engine, file.as_deref(), severity.clone()),
        Commands::Invalidate { path } => execute_invalidate(engine, path.as_deref()),
        Commands::Watch { interval_ms } => execute_watch(engine, *interval_ms),
    }
}

fn execute_analyze(engine: &Engine, path: Option<&std::path::Path>) -> Result<serde_json::Value> {
    let target = path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| engine.project_root().to_path_buf());

    if target.is_dir() {
        let stats = engine.analyze_directory(&target);
        Ok(serde_json::json!({
            "root": target.display().to_string(),
            "scanned": stats.scanned,
            "analyzed": stats.analyzed,
            "failed": stats.failed,
            "skipped": stats.skipped,
        }))
    } else {
        let ok = engine.analyze_file(&target);
        Ok(serde_json::json!({
            "path": target.display().to_string(),
            "success": ok,
        }))
    }
}

#[derive(Serialize)]
struct ReadResult {
    path: String,
    content: String,
    context: String,
    token_estimate: usize,
    budget_exceeded: bool,
    warning_count: usize,
}

fn execute_read(engine: &Engine, path: &std::path::Path) -> Result<serde_json::Value> {
    let result = engine
        .read_with_context(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(serde_json::to_value(ReadResult {
        path: result.path,
        content: result.content,
        context: result.context.text,
        token_estimate: result.context.token_estimate,
        budget_exceeded: result.context.budget_exceeded,
        warning_count: result.warnings.len(),
    })?)
}

fn execute_deps(engine: &Engine, path: &std::path::Path) -> Result<serde_json::Value> {
    let key = path.to_string_lossy().to_string();
    Ok(serde_json::to_value(engine.get_dependencies(&key))?)
}

fn execute_dependents(engine: &Engine, path: &std::path::Path) -> Result<serde_json::Value> {
    let key = path.to_string_lossy().to_string();
    Ok(serde_json::to_value(engine.get_dependents(&key))?)
}

fn execute_warnings(
    engine: &Engine,
    file: Option<&str>,
    severity: Option<SeverityArg>,
) -> Result<serde_json::Value> {
    let warnings = engine.get_warnings(file, severity.map(Severity::from));
    Ok(serde_json::to_value(warnings)?)
}

fn execute_invalidate(engine: &Engine, path: Option<&str>) -> Result<serde_json::Value> {
    engine.invalidate_cache(path);
    Ok(serde_json::json!({
        "invalidated": path.unwrap_or("<all>"),
    }))
}

fn execute_watch(engine: &Arc<Engine>, interval_ms: u64) -> Result<serde_json::Value> {
    engine.start_watching();
    println!(
        "{} {}",
        "watching".green().bold(),
        engine.project_root().display()
    );
    loop {
        std::thread::sleep(std::time::Duration::from_millis(interval_ms));
        let stats = engine.process_pending_changes();
        if stats.total > 0 {
            println!(
                "{} total={} created={} modified={} deleted={} failed={} ({:.1}ms)",
                "update".cyan().bold(),
                stats.total,
                stats.created,
                stats.modified,
                stats.deleted,
                stats.failed,
                stats.elapsed_ms
            );
        }
    }
}

fn print_output(format: &OutputFormat, value: &serde_json::Value) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        OutputFormat::Pretty => {
            print_pretty(value)?;
        }
        OutputFormat::Table => {
            // No tabular layout is worth the dependency for what is mostly
            // nested JSON; fall back to the same renderer as `pretty`.
            print_pretty(value)?;
        }
    }
    Ok(())
}

fn print_pretty(value: &serde_json::Value) -> Result<()> {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map {
                let key_colored = key.cyan().bold();
                match val {
                    serde_json::Value::String(s) => {
                        println!("{}: {}", key_colored, s.green());
                    }
                    serde_json::Value::Number(n) => {
                        println!("{}: {}", key_colored, n.to_string().yellow());
                    }
                    serde_json::Value::Bool(b) => {
                        let val_colored = if *b { "true".green() } else { "false".red() };
                        println!("{}: {}", key_colored, val_colored);
                    }
                    serde_json::Value::Array(arr) if arr.is_empty() => {
                        println!("{}: {}", key_colored, "[]".dimmed());
                    }
                    _ => {
                        println!("{}:", key_colored);
                        print_indented(val, 1)?;
                    }
                }
            }
        }
        serde_json::Value::Array(arr) => {
            for (i, item) in arr.iter().enumerate() {
                println!("\n{}{}:", "item ".cyan(), (i + 1).to_string().yellow());
                print_pretty(item)?;
            }
        }
        _ => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
    }
    Ok(())
}

fn print_indented(value: &serde_json::Value, depth: usize) -> Result<()> {
    let prefix = "  ".repeat(depth);
    match value {
        serde_json::Value::Array(arr) => {
            for item in arr {
                println!("{prefix}- {}", compact(item));
            }
        }
        serde_json::Value::Object(_) => {
            println!("{prefix}{}", compact(value));
        }
        other => println!("{prefix}{other}"),
    }
    Ok(())
}

fn compact(value: &serde_json::Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}
