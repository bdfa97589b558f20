use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::builder::PossibleValuesParser;
use clap::{Args, Parser, Subcommand, ValueEnum};
use failsense_api::{
    AnalyzeInput, AnalyzerConfig, FailSenseApi, HttpAnalyzer, API_URL_ENV, DEFAULT_API_URL,
    DEFAULT_TIMEOUT_SECS,
};
use failsense_core::{
    build_view, derive_facets, now_ms, DateRange, ExportFormat, HistoryFacets, HistoryFilter,
    HistoryId, HistorySummary, SUPPORTED_LANGUAGES,
};
use failsense_store::{
    export_history, read_history_snapshot, BlobStore, JsonDirBlobStore, SqliteBlobStore,
};
use serde::Serialize;
use serde_json::Value;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const CLI_CONTRACT_VERSION: &str = "cli.v1";
const LOG_ENV: &str = "FAILSENSE_LOG";
/// Browse-control value meaning "no restriction" for `--error-type` and `--tag`.
const ANY_CHOICE: &str = "all";

#[derive(Debug, Parser)]
#[command(name = "failsense")]
#[command(about = "FailSense error analysis history CLI")]
struct Cli {
    #[arg(long, default_value = "./failsense.sqlite3")]
    db: PathBuf,

    /// Keep state as JSON files in this directory instead of `SQLite`.
    #[arg(long)]
    json_dir: Option<PathBuf>,

    #[arg(long, env = API_URL_ENV, default_value = DEFAULT_API_URL)]
    api_url: String,

    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Analyze(AnalyzeArgs),
    Health,
    History {
        #[command(subcommand)]
        command: Box<HistoryCommand>,
    },
    Prefs {
        #[command(subcommand)]
        command: Box<PrefsCommand>,
    },
    Db {
        #[command(subcommand)]
        command: Box<DbCommand>,
    },
}

#[derive(Debug, Args)]
struct AnalyzeArgs {
    #[command(flatten)]
    input: LogInputArgs,
    #[arg(long, value_parser = PossibleValuesParser::new(SUPPORTED_LANGUAGES))]
    language: Option<String>,
    #[arg(long = "tag")]
    tags: Vec<String>,
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
struct LogInputArgs {
    /// Error log or stack trace to analyze.
    #[arg(long)]
    text: Option<String>,
    /// Read the error log from this file.
    #[arg(long)]
    file: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum HistoryCommand {
    List(HistoryListArgs),
    Show(IdArgs),
    Delete(IdArgs),
    Clear,
    Facets,
    Feedback(FeedbackArgs),
    Export(HistoryExportArgs),
}

#[derive(Debug, Args)]
struct HistoryListArgs {
    #[arg(long)]
    query: Option<String>,
    #[arg(long)]
    error_type: Option<String>,
    #[arg(long, value_enum)]
    date_range: Option<DateRangeArg>,
    #[arg(long)]
    tag: Option<String>,
}

#[derive(Debug, Args)]
struct IdArgs {
    #[arg(long)]
    id: String,
}

#[derive(Debug, Args)]
struct FeedbackArgs {
    #[arg(long)]
    id: String,
    #[arg(long)]
    fix_index: usize,
    #[command(flatten)]
    outcome: OutcomeArgs,
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
struct OutcomeArgs {
    #[arg(long)]
    worked: bool,
    #[arg(long)]
    failed: bool,
}

#[derive(Debug, Args)]
struct HistoryExportArgs {
    #[arg(long)]
    id: String,
    #[arg(long, value_enum)]
    format: Option<FormatArg>,
    /// Write the report to this file, or into this directory under its default name.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum PrefsCommand {
    Show,
    Set(PrefsSetArgs),
    Reset,
}

#[derive(Debug, Args)]
struct PrefsSetArgs {
    #[arg(long, value_parser = PossibleValuesParser::new(SUPPORTED_LANGUAGES))]
    default_language: Option<String>,
    #[arg(long)]
    auto_analyze: Option<bool>,
    #[arg(long, value_enum)]
    export_format: Option<FormatArg>,
    #[arg(long)]
    history_limit: Option<usize>,
    #[arg(long)]
    show_notifications: Option<bool>,
    #[arg(long)]
    auto_clear_tags: Option<bool>,
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    SchemaVersion,
    Export(DbExportArgs),
    Import(DbImportArgs),
}

#[derive(Debug, Args)]
struct DbExportArgs {
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Args)]
struct DbImportArgs {
    #[arg(long = "in")]
    input: PathBuf,
    #[arg(long, default_value_t = false)]
    skip_existing: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DateRangeArg {
    Today,
    Week,
    Month,
}

impl From<DateRangeArg> for DateRange {
    fn from(value: DateRangeArg) -> Self {
        match value {
            DateRangeArg::Today => Self::Today,
            DateRangeArg::Week => Self::Week,
            DateRangeArg::Month => Self::Month,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Markdown,
    Text,
}

impl From<FormatArg> for ExportFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Markdown => Self::Markdown,
            FormatArg::Text => Self::Text,
        }
    }
}

#[derive(Debug, Serialize)]
struct HistoryListOutput {
    matched: usize,
    total: usize,
    items: Vec<HistorySummary>,
    facets: HistoryFacets,
}

type Api = FailSenseApi<HttpAnalyzer>;

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match &cli.command {
        Command::Analyze(args) => run_analyze(args, &mut open_api(&cli)?),
        Command::Health => run_health(&analyzer(&cli)),
        Command::History { command } => run_history(command, &mut open_api(&cli)?),
        Command::Prefs { command } => run_prefs(command, &mut open_api(&cli)?),
        Command::Db { command } => run_db(command, &cli),
    }
}

fn analyzer(cli: &Cli) -> HttpAnalyzer {
    HttpAnalyzer::new(AnalyzerConfig {
        base_url: cli.api_url.clone(),
        timeout_secs: cli.timeout_secs,
    })
}

fn open_port(cli: &Cli) -> Result<Arc<dyn BlobStore>> {
    if let Some(dir) = &cli.json_dir {
        tracing::debug!(dir = %dir.display(), "using json directory backend");
        return Ok(Arc::new(JsonDirBlobStore::open(dir)?));
    }
    tracing::debug!(db = %cli.db.display(), "using sqlite backend");
    Ok(Arc::new(SqliteBlobStore::open_migrated(&cli.db)?))
}

fn open_api(cli: &Cli) -> Result<Api> {
    Ok(FailSenseApi::open(open_port(cli)?, analyzer(cli))?)
}

fn run_health(analyzer: &HttpAnalyzer) -> Result<()> {
    let status = analyzer.health()?;
    emit_json(serde_json::json!({
        "status": status,
        "api_url": analyzer.config().base_url
    }))
}

fn run_analyze(args: &AnalyzeArgs, api: &mut Api) -> Result<()> {
    let log_text = match (&args.input.text, &args.input.file) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => fs::read_to_string(path)
            .with_context(|| format!("failed to read log file {}", path.display()))?,
        (None, None) => return Err(anyhow!("one of --text or --file is required")),
    };

    let item = api.analyze(AnalyzeInput {
        log_text,
        language: args.language.clone(),
        tags: args.tags.clone(),
    })?;
    emit_json(serde_json::to_value(&item)?)
}

fn run_history(command: &HistoryCommand, api: &mut Api) -> Result<()> {
    match command {
        HistoryCommand::List(args) => run_history_list(args, api),
        HistoryCommand::Show(args) => {
            let item = api.get(&HistoryId::from(args.id.as_str()))?;
            emit_json(serde_json::to_value(item)?)
        }
        HistoryCommand::Delete(args) => {
            let id = HistoryId::from(args.id.as_str());
            let deleted = api.delete(&id)?;
            emit_json(serde_json::json!({ "id": id, "deleted": deleted }))
        }
        HistoryCommand::Clear => {
            let removed = api.items().len();
            api.clear()?;
            emit_json(serde_json::json!({ "cleared": true, "removed": removed }))
        }
        HistoryCommand::Facets => emit_json(serde_json::to_value(derive_facets(api.items()))?),
        HistoryCommand::Feedback(args) => run_history_feedback(args, api),
        HistoryCommand::Export(args) => run_history_export(args, api),
    }
}

fn browse_choice(value: Option<&str>) -> Option<String> {
    value.filter(|value| *value != ANY_CHOICE).map(str::to_string)
}

fn run_history_list(args: &HistoryListArgs, api: &Api) -> Result<()> {
    let filter = HistoryFilter {
        text: args.query.clone(),
        error_type: browse_choice(args.error_type.as_deref()),
        date_range: args.date_range.map(DateRange::from),
        tag: browse_choice(args.tag.as_deref()),
    };
    let now = now_ms();
    let view = build_view(api.items(), &filter, now);
    let output = HistoryListOutput {
        matched: view.matched,
        total: view.total,
        items: view.items.iter().map(|item| HistorySummary::from_item(item, now)).collect(),
        facets: view.facets,
    };
    emit_json(serde_json::to_value(output)?)
}

fn run_history_feedback(args: &FeedbackArgs, api: &mut Api) -> Result<()> {
    let id = HistoryId::from(args.id.as_str());
    let worked = args.outcome.worked && !args.outcome.failed;
    let outcome = api.record_feedback(&id, args.fix_index, worked)?;
    let worked_fix_index = api.get(&id).ok().and_then(|item| item.worked_fix_index);

    emit_json(serde_json::json!({
        "id": id,
        "fix_index": args.fix_index,
        "worked": worked,
        "outcome": outcome,
        "worked_fix_index": worked_fix_index
    }))
}

fn run_history_export(args: &HistoryExportArgs, api: &Api) -> Result<()> {
    let report =
        api.export(&HistoryId::from(args.id.as_str()), args.format.map(ExportFormat::from))?;
    let mut value = serde_json::to_value(&report)?;

    if let Some(out) = &args.out {
        let path = if out.is_dir() { out.join(&report.file_name) } else { out.clone() };
        write_report(&path, &report.content)?;
        if let Value::Object(object) = &mut value {
            object.insert("path".to_string(), Value::String(path.display().to_string()));
        }
    }

    emit_json(value)
}

fn write_report(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("failed to write report {}", path.display()))
}

fn run_prefs(command: &PrefsCommand, api: &mut Api) -> Result<()> {
    match command {
        PrefsCommand::Show => {
            emit_json(serde_json::json!({ "preferences": api.preferences() }))
        }
        PrefsCommand::Set(args) => {
            let mut prefs = api.preferences().clone();
            if let Some(language) = &args.default_language {
                prefs.default_language.clone_from(language);
            }
            if let Some(value) = args.auto_analyze {
                prefs.auto_analyze = value;
            }
            if let Some(format) = args.export_format {
                prefs.export_format = format.into();
            }
            if let Some(limit) = args.history_limit {
                prefs.history_limit = limit;
            }
            if let Some(value) = args.show_notifications {
                prefs.show_notifications = value;
            }
            if let Some(value) = args.auto_clear_tags {
                prefs.auto_clear_tags = value;
            }

            let evicted = api.update_preferences(prefs)?;
            emit_json(serde_json::json!({
                "preferences": api.preferences(),
                "evicted": evicted
            }))
        }
        PrefsCommand::Reset => {
            let prefs = api.reset_preferences()?.clone();
            emit_json(serde_json::json!({ "preferences": prefs }))
        }
    }
}

fn run_db_schema_version(cli: &Cli) -> Result<()> {
    if cli.json_dir.is_some() {
        return Err(anyhow!("schema-version is only available for the SQLite backend"));
    }

    let store = SqliteBlobStore::open(&cli.db)?;
    let status = store.schema_status()?;
    emit_json(serde_json::json!({
        "current_version": status.current_version,
        "target_version": status.target_version,
        "pending_versions": status.pending_versions,
        "up_to_date": status.pending_versions.is_empty()
    }))
}

fn run_db(command: &DbCommand, cli: &Cli) -> Result<()> {
    match command {
        DbCommand::SchemaVersion => run_db_schema_version(cli),
        DbCommand::Export(args) => {
            let api = open_api(cli)?;
            let manifest = export_history(api.items(), &args.out)?;
            let mut value = serde_json::to_value(manifest)?;
            if let Value::Object(object) = &mut value {
                object.insert("out".to_string(), Value::String(args.out.display().to_string()));
            }
            emit_json(value)
        }
        DbCommand::Import(args) => {
            let mut api = open_api(cli)?;
            let items = read_history_snapshot(&args.input)?;
            let summary = api.import_history(&items, args.skip_existing)?;
            emit_json(serde_json::to_value(summary)?)
        }
    }
}
