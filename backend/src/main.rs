//! Sheetload CLI - turn spreadsheet rows into SQL INSERT/UPDATE statements
//!
//! # Main Commands
//!
//! ```bash
//! sheetload init clientes.csv --table clientes -o job.json   # default job config
//! sheetload validate clientes.csv --job job.json             # check rows
//! sheetload compile clientes.csv --job job.json              # write clientes.sql
//! sheetload execute clientes.csv --job job.json              # run UPDATEs row by row
//! sheetload serve                                            # HTTP API (port 3000)
//! ```
//!
//! # Other Commands
//!
//! ```bash
//! sheetload parse clientes.csv          # CSV rows as JSON
//! sheetload preview clientes.csv -j job.json --rows 5
//! sheetload history --limit 10
//! ```

use clap::{Parser, Subcommand};
use sheetload::{
    compile, decode_content, detect_encoding, execute, parse_file_auto, parse_str, preview,
    validate, HistoryStore, HttpEndpoint, JobConfig, JsonHistoryStore, OperationType, Settings,
    SheetData, DEFAULT_RECENT_LIMIT, PREVIEW_ROWS,
};
use std::fs;
use std::path::{Path, PathBuf};

/// Issues printed per severity before the list is cut short.
const MAX_LISTED_ISSUES: usize = 20;

#[derive(Parser)]
#[command(name = "sheetload")]
#[command(about = "Generate and run SQL INSERT/UPDATE statements from spreadsheet rows", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a CSV file and output its rows as JSON
    Parse {
        /// Input CSV file
        input: PathBuf,

        /// CSV delimiter (auto-detect if not specified)
        #[arg(short, long)]
        delimiter: Option<char>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write a default job configuration for a CSV's columns
    Init {
        /// Input CSV file
        input: PathBuf,

        /// Target table
        #[arg(short, long)]
        table: String,

        /// insert or update
        #[arg(long, default_value = "update")]
        operation: OperationType,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate rows against a job's mappings
    Validate {
        /// Input CSV file
        input: PathBuf,

        /// Job configuration (JSON)
        #[arg(short, long)]
        job: PathBuf,
    },

    /// Compile the full SQL script
    Compile {
        /// Input CSV file
        input: PathBuf,

        /// Job configuration (JSON)
        #[arg(short, long)]
        job: PathBuf,

        /// Output file (default: <table>.sql)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Compile even when validation reports errors
        #[arg(short, long)]
        yes: bool,
    },

    /// Show the statements for the first rows
    Preview {
        /// Input CSV file
        input: PathBuf,

        /// Job configuration (JSON)
        #[arg(short, long)]
        job: PathBuf,

        /// Number of rows to compile
        #[arg(long, default_value_t = PREVIEW_ROWS)]
        rows: usize,
    },

    /// Execute an UPDATE job row by row against the configured endpoint
    Execute {
        /// Input CSV file
        input: PathBuf,

        /// Job configuration (JSON)
        #[arg(short, long)]
        job: PathBuf,

        /// Execute even when validation reports errors
        #[arg(short, long)]
        yes: bool,
    },

    /// Show the most recent operations
    History {
        /// Number of records
        #[arg(short, long, default_value_t = DEFAULT_RECENT_LIMIT)]
        limit: usize,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on (default: SHEETLOAD_PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Parse {
            input,
            delimiter,
            output,
        } => cmd_parse(&input, delimiter, output.as_deref()),

        Commands::Init {
            input,
            table,
            operation,
            output,
        } => cmd_init(&input, &table, operation, output.as_deref()),

        Commands::Validate { input, job } => cmd_validate(&input, &job),

        Commands::Compile {
            input,
            job,
            output,
            yes,
        } => cmd_compile(&input, &job, output.as_deref(), yes),

        Commands::Preview { input, job, rows } => cmd_preview(&input, &job, rows),

        Commands::Execute { input, job, yes } => cmd_execute(&input, &job, yes).await,

        Commands::History { limit } => cmd_history(limit),

        Commands::Serve { port } => cmd_serve(port).await,
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

fn read_sheet(input: &Path, delimiter: Option<char>) -> Result<SheetData, Box<dyn std::error::Error>> {
    eprintln!("📄 Reading: {}", input.display());

    let sheet = match delimiter {
        Some(d) => {
            let bytes = fs::read(input)?;
            let encoding = detect_encoding(&bytes);
            let mut sheet = parse_str(&decode_content(&bytes, &encoding), d)?;
            sheet.encoding = encoding;
            sheet
        }
        None => parse_file_auto(input)?,
    };

    eprintln!("   Encoding: {}", sheet.encoding);
    eprintln!(
        "   Delimiter: '{}'{}",
        format_delimiter(sheet.delimiter),
        if delimiter.is_none() { " (auto-detected)" } else { "" }
    );
    eprintln!("   Columns: {}", sheet.columns.join(", "));
    eprintln!("   Rows: {}", sheet.rows.len());
    Ok(sheet)
}

fn load_job(path: &Path) -> Result<JobConfig, Box<dyn std::error::Error>> {
    let job = JobConfig::from_file(path)?;
    eprintln!("⚙️  Job: {} {} ({} mapping(s))", job.operation, job.table, job.mappings.len());
    Ok(job)
}

fn source_label(input: &Path) -> String {
    input
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string()
}

/// Print validation issues; returns `true` when there are errors.
fn report_validation(sheet: &SheetData, job: &JobConfig) -> bool {
    let result = validate(&sheet.rows, &job.mappings);

    eprintln!("\n✔️  Validation: {}", result.summary());
    for issue in result.errors.iter().take(MAX_LISTED_ISSUES) {
        eprintln!("   ❌ {}", issue);
    }
    for issue in result.warnings.iter().take(MAX_LISTED_ISSUES) {
        eprintln!("   ⚠️  {}", issue);
    }
    let hidden = result.errors.len().saturating_sub(MAX_LISTED_ISSUES)
        + result.warnings.len().saturating_sub(MAX_LISTED_ISSUES);
    if hidden > 0 {
        eprintln!("   ... and {} more", hidden);
    }

    !result.is_valid
}

fn cmd_parse(
    input: &Path,
    delimiter: Option<char>,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let sheet = read_sheet(input, delimiter)?;
    let json = serde_json::to_string_pretty(&sheet.rows)?;
    write_output(&json, output)?;
    Ok(())
}

fn cmd_init(
    input: &Path,
    table: &str,
    operation: OperationType,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let sheet = read_sheet(input, None)?;
    let job = JobConfig::for_columns(table, operation, &sheet.columns);

    if operation == OperationType::Update {
        eprintln!("   ⚠️  No key column set: edit \"keyColumn\" before compiling");
    }

    write_output(&job.to_json()?, output)?;
    Ok(())
}

fn cmd_validate(input: &Path, job_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let sheet = read_sheet(input, None)?;
    let job = load_job(job_path)?;

    if report_validation(&sheet, &job) {
        std::process::exit(1);
    }

    eprintln!("✅ No errors");
    Ok(())
}

fn cmd_compile(
    input: &Path,
    job_path: &Path,
    output: Option<&Path>,
    yes: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let sheet = read_sheet(input, None)?;
    let job = load_job(job_path)?;

    if report_validation(&sheet, &job) && !yes {
        return Err("validation reported errors; rerun with --yes to compile anyway".into());
    }

    let script = compile(&sheet.rows, &job)?;
    eprintln!("\n⚙️  Compiled {} statement(s)", script.statements.len());
    if script.skipped_rows > 0 {
        eprintln!("   ⚠️  {} row(s) skipped: empty key value", script.skipped_rows);
    }

    let default_path = PathBuf::from(format!("{}.sql", file_safe(&job.table)));
    write_output(&script.render(), Some(output.unwrap_or(default_path.as_path())))?;
    Ok(())
}

/// Table name reduced to characters safe in a file name.
fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '_' || c == '.' || c == '-' { c } else { '_' })
        .collect()
}

fn cmd_preview(input: &Path, job_path: &Path, rows: usize) -> Result<(), Box<dyn std::error::Error>> {
    let sheet = read_sheet(input, None)?;
    let job = load_job(job_path)?;

    let preview = preview(&sheet.rows, &job, rows)?;
    println!("{}", preview.render());
    Ok(())
}

async fn cmd_execute(input: &Path, job_path: &Path, yes: bool) -> Result<(), Box<dyn std::error::Error>> {
    let sheet = read_sheet(input, None)?;
    let job = load_job(job_path)?;

    if report_validation(&sheet, &job) && !yes {
        return Err("validation reported errors; rerun with --yes to execute anyway".into());
    }

    let settings = Settings::from_env();
    let endpoint = HttpEndpoint::from_settings(&settings)?;
    let mut history = JsonHistoryStore::with_dir(&settings.history_dir);

    eprintln!("\n🚀 Executing against {}", endpoint.url());
    let summary = execute(&endpoint, &mut history, &job, &sheet.rows, &source_label(input)).await?;

    eprintln!("\n📊 Results: {} total, {} succeeded, {} failed", summary.total, summary.succeeded, summary.failed);
    for failure in summary.errors.iter().take(MAX_LISTED_ISSUES) {
        eprintln!("   ❌ Row {}: {}", failure.row_index + 2, failure.message);
    }

    if !summary.is_success() {
        std::process::exit(1);
    }

    eprintln!("\n✨ Done!");
    Ok(())
}

fn cmd_history(limit: usize) -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_env();
    let history = JsonHistoryStore::with_dir(&settings.history_dir);
    let records = history.recent(limit)?;

    if records.is_empty() {
        eprintln!("📋 No operations recorded yet.");
        return Ok(());
    }

    eprintln!("📋 Recent operations ({}):\n", records.len());
    for r in records {
        let status = if r.failed == 0 { "✅" } else { "⚠️ " };
        println!(
            "  {} {} {} {} - {}/{} ok ({})",
            status,
            r.executed_at.format("%Y-%m-%d %H:%M:%S"),
            r.operation_type,
            r.table_name,
            r.succeeded,
            r.total,
            r.source_label
        );
        for failure in r.errors.iter().flatten().take(3) {
            println!("       Row {}: {}", failure.row_index + 2, failure.message);
        }
    }
    Ok(())
}

async fn cmd_serve(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut settings = Settings::from_env();
    if let Some(port) = port {
        settings.port = port;
    }
    sheetload::server::start_server(settings).await
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
