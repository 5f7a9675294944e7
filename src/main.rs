use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use studiodesk::commands;
use studiodesk::commands::settings::SettingsPayload;
use studiodesk::config::{self, VERSION};
use studiodesk::models::{Grouping, InvoiceStatus, MalformedPolicy, Settings};
use studiodesk::services::state::AppState;
use studiodesk::utils::{format_currency, parse_year_month};

/// Studio finance summaries from exported invoice snapshots
#[derive(Parser)]
#[command(name = "studiodesk")]
#[command(version = VERSION)]
#[command(about = "Invoice summaries for the studio dashboard", long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/studiodesk/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Invoice JSON file or folder of JSON files
    #[arg(long, short, global = true)]
    source: Option<PathBuf>,

    /// Malformed amount handling: lenient or strict
    #[arg(long, global = true)]
    policy: Option<MalformedPolicy>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Outstanding total, paid this month and pending count
    Summary {
        /// Month to report on as YYYY-MM (default: current month)
        #[arg(long)]
        month: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Summary plus yearly total, recent payments and monthly collections
    Dashboard {
        #[arg(long)]
        month: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// List invoices, newest payment first
    Invoices {
        /// Only invoices with this status
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Recompute the summary whenever the source changes
    Watch,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show effective configuration
    Show,
    /// Show config file path
    Path,
    /// Write a defaults file if none exists
    Init,
    /// Update and persist settings (the global --source is persisted too)
    Set {
        #[arg(long)]
        currency_symbol: Option<String>,
        #[arg(long)]
        grouping: Option<Grouping>,
        #[arg(long)]
        malformed_policy: Option<MalformedPolicy>,
        #[arg(long)]
        recent_limit: Option<usize>,
        #[arg(long)]
        chart_months: Option<u32>,
        #[arg(long)]
        debounce_ms: Option<u64>,
        #[arg(long)]
        log_level: Option<String>,
    },
}

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let settings = config::load_settings(cli.config.as_deref())?;
    init_tracing(&settings);

    let mut effective = settings.clone();
    if let Some(source) = cli.source.clone() {
        effective.source = Some(source);
    }
    if let Some(policy) = cli.policy {
        effective.malformed_policy = policy;
    }
    let state = AppState::new(effective);

    match cli.command {
        Commands::Summary { month, json } => print_summary(&state, month.as_deref(), json),
        Commands::Dashboard { month, json } => {
            let dashboard = commands::dashboard::get_dashboard_stats(&state, month.as_deref())?;
            if json {
                return print_json(&dashboard);
            }
            let settings = settings_of(&state)?;
            println!("Month:            {}", dashboard.year_month);
            println!("Outstanding:      {}", dashboard.total_outstanding_display);
            println!("Paid this month:  {}", dashboard.paid_this_month_display);
            println!("Paid this year:   {}", dashboard.paid_this_year_display);
            println!("Pending invoices: {}", dashboard.pending_count);
            println!();
            println!("Recent payments:");
            for row in &dashboard.recent_payments {
                println!(
                    "  {}  {:<12} {}",
                    row.payment_date.as_deref().unwrap_or("-"),
                    row.invoice_number.as_deref().unwrap_or("-"),
                    display(&settings, row.paid.unwrap_or(0.0)),
                );
            }
            println!();
            println!("Collections:");
            for (month, total) in dashboard.chart_months.iter().zip(&dashboard.chart_paid) {
                println!("  {}  {}", month, display(&settings, *total));
            }
            Ok(())
        }
        Commands::Invoices { status, json } => {
            let status = status.map(InvoiceStatus::from);
            let rows = commands::invoices::get_invoices(&state, status.as_ref())?;
            if json {
                return print_json(&rows);
            }
            let settings = settings_of(&state)?;
            for row in rows {
                println!(
                    "{:<12} {:<10} {:>16} {:>16}  {}",
                    row.invoice_number.as_deref().unwrap_or("-"),
                    row.status.as_str(),
                    row.balance.map(|v| display(&settings, v)).unwrap_or_else(|| "?".to_string()),
                    row.paid.map(|v| display(&settings, v)).unwrap_or_default(),
                    row.payment_date.as_deref().unwrap_or(""),
                );
            }
            Ok(())
        }
        Commands::Watch => watch(&state),
        Commands::Config { action } => handle_config(action, &state, cli.config.as_deref(), cli.source),
    }
}

fn init_tracing(settings: &Settings) {
    // RUST_LOG > config file > default "info"; stderr keeps stdout clean for --json
    let default_filter = format!("studiodesk={}", settings.log_level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn settings_of(state: &AppState) -> Result<Settings> {
    state.settings()
}

fn display(settings: &Settings, value: f64) -> String {
    format_currency(value, &settings.currency_symbol, settings.grouping)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_summary(state: &AppState, month: Option<&str>, json: bool) -> Result<()> {
    let reference = match month {
        Some(value) => parse_year_month(value).ok_or_else(|| anyhow!("Invalid month '{}', expected YYYY-MM", value))?,
        None => state.today(),
    };
    let stats = state.stats_for(reference)?;
    if json {
        return print_json(&stats);
    }
    let settings = settings_of(state)?;
    println!("Outstanding:      {}", display(&settings, stats.total_outstanding));
    println!("Paid this month:  {}", display(&settings, stats.paid_this_month));
    println!("Pending invoices: {}", stats.pending_count);
    Ok(())
}

fn watch(state: &AppState) -> Result<()> {
    print_summary(state, None, false)?;

    let settings = settings_of(state)?;
    state.start_watching(move |stats| {
        println!();
        println!("Outstanding:      {}", display(&settings, stats.total_outstanding));
        println!("Paid this month:  {}", display(&settings, stats.paid_this_month));
        println!("Pending invoices: {}", stats.pending_count);
    })?;

    loop {
        std::thread::park();
    }
}

fn handle_config(
    action: ConfigAction,
    state: &AppState,
    path: Option<&std::path::Path>,
    source: Option<PathBuf>,
) -> Result<()> {
    match action {
        ConfigAction::Show => {
            print!("{}", config::to_toml(&settings_of(state)?)?);
            Ok(())
        }
        ConfigAction::Path => {
            let path = path
                .map(|p| p.to_path_buf())
                .or_else(config::config_path)
                .context("Could not determine config path")?;
            println!("{}", path.display());
            Ok(())
        }
        ConfigAction::Init => {
            let (path, created) = config::ensure_config_exists(path)?;
            if created {
                println!("Created {}", path.display());
            } else {
                println!("Config already exists at {}", path.display());
            }
            Ok(())
        }
        ConfigAction::Set {
            currency_symbol,
            grouping,
            malformed_policy,
            recent_limit,
            chart_months,
            debounce_ms,
            log_level,
        } => {
            let payload = SettingsPayload {
                source,
                currency_symbol,
                grouping,
                malformed_policy,
                recent_limit,
                chart_months,
                debounce_ms,
                log_level,
            };
            // start from the file alone so env and one-off flags are not persisted
            state.update_settings(config::load_file_settings(path))?;
            let saved = commands::settings::save_settings(state, payload, path)?;
            print!("{}", config::to_toml(&saved)?);
            Ok(())
        }
    }
}
