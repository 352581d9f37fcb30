use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use portal::PortalConfig;
use portal::config::ConfigError;
use portal::realtime::{RESPONSE_EVENT, RealtimeError, RealtimeEvent, RealtimeHandle};
use portal::router::{Resolution, Router, RouterError};
use portal::session::{FileStore, SessionContext, StoreError};
use portal::transport::{ApiClient, ApiError, Page};
use serde::Serialize;
use serde_json::{Value, json};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("api: {0}")]
    Api(#[from] ApiError),
    #[error("router: {0}")]
    Router(#[from] RouterError),
    #[error("realtime: {0}")]
    Realtime(#[from] RealtimeError),
    #[error("session: {0}")]
    Store(#[from] StoreError),
    #[error("not logged in; run `portal-cli login` first")]
    NotLoggedIn,
    #[error("invalid HTTP method `{0}`")]
    InvalidMethod(String),
    #[error("timed out waiting for realtime {0}")]
    Timeout(&'static str),
    #[error("failed to write {path}: {source}")]
    Write { path: String, source: std::io::Error },
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "portal-cli", about = "Diagnosis portal API and realtime CLI")]
struct Cli {
    /// TOML config file; `PORTAL_*` variables override it.
    #[arg(long, env = "PORTAL_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides `api.base_url` after the file and environment.
    #[arg(long)]
    base_url: Option<String>,

    /// Log at the configured filter instead of `warn`.
    #[arg(long, short, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

struct CliContext {
    config: PortalConfig,
    api: ApiClient,
    session: SessionContext,
}

#[derive(Subcommand, Debug)]
enum Command {
    Ping,
    Login {
        username: String,
        #[arg(long, env = "PORTAL_PASSWORD")]
        password: String,
    },
    Logout,
    Register {
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "PORTAL_PASSWORD")]
        password: String,
    },
    /// Show the stored credential and ask the server who it belongs to.
    Whoami,
    Routes,
    /// Resolve a location through the guard chain using the stored session.
    Navigate {
        location: String,
    },
    Files(FileCommand),
    Models(ModelCommand),
    Diagnose {
        #[arg(long)]
        file_id: i64,
        #[arg(long)]
        model_id: i64,
    },
    Records(RecordCommand),
    DataRecords,
    Users(UserCommand),
    Report(ReportCommand),
    /// Raw JSON call against the API.
    Raw {
        method: String,
        path: String,
        #[arg(long)]
        data: Option<String>,
    },
    Rt(RtCommand),
}

#[derive(Args, Debug, Clone, Copy)]
struct PageArgs {
    #[arg(long, default_value_t = portal::transport::DEFAULT_PAGE)]
    page: u32,
    #[arg(long, default_value_t = portal::transport::DEFAULT_PAGE_SIZE)]
    page_size: u32,
}

impl From<PageArgs> for Page {
    fn from(args: PageArgs) -> Self {
        Self { page: args.page, page_size: args.page_size }
    }
}

#[derive(Args, Debug)]
struct FileCommand {
    #[command(subcommand)]
    command: FileSubcommand,
}

#[derive(Subcommand, Debug)]
enum FileSubcommand {
    List(PageArgs),
    Upload { path: PathBuf },
    Delete { file_id: i64 },
    Exists { file_name: String },
}

#[derive(Args, Debug)]
struct ModelCommand {
    #[command(subcommand)]
    command: ModelSubcommand,
}

#[derive(Subcommand, Debug)]
enum ModelSubcommand {
    List(PageArgs),
    Upload { path: PathBuf },
    Delete { model_id: i64 },
    Exists { model_name: String },
}

#[derive(Args, Debug)]
struct RecordCommand {
    #[command(subcommand)]
    command: RecordSubcommand,
}

#[derive(Subcommand, Debug)]
enum RecordSubcommand {
    List,
    Delete { record_id: i64 },
}

#[derive(Args, Debug)]
struct UserCommand {
    #[command(subcommand)]
    command: UserSubcommand,
}

#[derive(Subcommand, Debug)]
enum UserSubcommand {
    List,
    Delete { user_id: i64 },
    /// Stamp the user's last login time.
    Touch { user_id: i64 },
}

#[derive(Args, Debug)]
struct ReportCommand {
    #[command(subcommand)]
    command: ReportSubcommand,
}

#[derive(Subcommand, Debug)]
enum ReportSubcommand {
    Fetch {
        /// File name or `/reports/<name>` path.
        name: String,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct RtCommand {
    #[command(subcommand)]
    command: RtSubcommand,
}

#[derive(Subcommand, Debug)]
enum RtSubcommand {
    /// Emit `send_message` and wait for the `response` event.
    Send {
        message: String,
        #[arg(long, default_value_t = 10)]
        timeout_secs: u64,
    },
    /// Print inbound events as JSON lines.
    Listen {
        #[arg(long, help = "Stop after this many events")]
        count: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let mut config = match cli.config.as_deref() {
        Some(path) => PortalConfig::from_file(path)?,
        None => PortalConfig::default(),
    };
    config.apply_env(|key| std::env::var(key).ok())?;
    if let Some(base_url) = cli.base_url {
        config.api.base_url = base_url;
    }
    let mut config = config.validate()?;
    if !cli.verbose {
        "warn".clone_into(&mut config.logging.filter);
    }
    portal::logging::init(&config.logging);

    let ctx = CliContext {
        api: ApiClient::new(&config.api)?,
        session: SessionContext::new(Arc::new(FileStore::new(config.session.resolved_path()))),
        config,
    };

    match cli.command {
        Command::Ping => run_ping(&ctx).await,
        Command::Login { username, password } => run_login(&ctx, &username, &password).await,
        Command::Logout => run_logout(&ctx),
        Command::Register { username, email, password } => {
            print_json(&ctx.api.register(&username, &password, &email).await?)
        }
        Command::Whoami => run_whoami(&ctx).await,
        Command::Routes => run_routes(&ctx),
        Command::Navigate { location } => run_navigate(&ctx, &location),
        Command::Files(files) => run_files(&ctx, files).await,
        Command::Models(models) => run_models(&ctx, models).await,
        Command::Diagnose { file_id, model_id } => print_json(&ctx.api.diagnose(file_id, model_id).await?),
        Command::Records(records) => run_records(&ctx, records).await,
        Command::DataRecords => print_json(&ctx.api.data_records().await?),
        Command::Users(users) => run_users(&ctx, users).await,
        Command::Report(report) => run_report(&ctx, report).await,
        Command::Raw { method, path, data } => run_raw(&ctx, &method, &path, data.as_deref()).await,
        Command::Rt(rt) => run_rt(&ctx, rt).await,
    }
}

async fn run_ping(cli: &CliContext) -> Result<(), CliError> {
    cli.api.ping().await?;
    println!("ok {}", cli.api.base_url());
    Ok(())
}

async fn run_login(cli: &CliContext, username: &str, password: &str) -> Result<(), CliError> {
    let credential = cli.api.login_and_store(&cli.session, username, password).await?;
    eprintln!("logged in as {}", credential.username);
    Ok(())
}

fn run_logout(cli: &CliContext) -> Result<(), CliError> {
    cli.session.clear()?;
    eprintln!("session cleared");
    Ok(())
}

async fn run_whoami(cli: &CliContext) -> Result<(), CliError> {
    let credential = cli.session.credential().ok_or(CliError::NotLoggedIn)?;
    let server = cli.api.current_user(&credential.token).await?;
    print_json(&json!({ "stored": credential.username, "server": server.username }))
}

fn run_routes(cli: &CliContext) -> Result<(), CliError> {
    let router = Router::portal(cli.session.clone())?;
    let routes: Vec<Value> = router
        .table()
        .iter()
        .map(|route| json!({ "path": route.path, "name": route.name, "guarded": route.is_guarded() }))
        .collect();
    print_json(&routes)
}

fn run_navigate(cli: &CliContext, location: &str) -> Result<(), CliError> {
    let router = Router::portal(cli.session.clone())?;
    let resolution = router.resolve(location, None)?;
    print_json(&resolution_json(&resolution))
}

async fn run_files(cli: &CliContext, files: FileCommand) -> Result<(), CliError> {
    match files.command {
        FileSubcommand::List(page) => print_json(&cli.api.list_files(page.into()).await?),
        FileSubcommand::Upload { path } => print_json(&cli.api.upload_file(&path).await?),
        FileSubcommand::Delete { file_id } => print_json(&cli.api.delete_file(file_id).await?),
        FileSubcommand::Exists { file_name } => {
            print_json(&json!({ "exists": cli.api.file_exists(&file_name).await? }))
        }
    }
}

async fn run_models(cli: &CliContext, models: ModelCommand) -> Result<(), CliError> {
    match models.command {
        ModelSubcommand::List(page) => print_json(&cli.api.list_models(page.into()).await?),
        ModelSubcommand::Upload { path } => print_json(&cli.api.upload_model(&path).await?),
        ModelSubcommand::Delete { model_id } => print_json(&cli.api.delete_model(model_id).await?),
        ModelSubcommand::Exists { model_name } => {
            print_json(&json!({ "exists": cli.api.model_exists(&model_name).await? }))
        }
    }
}

async fn run_records(cli: &CliContext, records: RecordCommand) -> Result<(), CliError> {
    match records.command {
        RecordSubcommand::List => print_json(&cli.api.diagnosis_records().await?),
        RecordSubcommand::Delete { record_id } => print_json(&cli.api.delete_diagnosis_record(record_id).await?),
    }
}

async fn run_users(cli: &CliContext, users: UserCommand) -> Result<(), CliError> {
    match users.command {
        UserSubcommand::List => print_json(&cli.api.list_users().await?),
        UserSubcommand::Delete { user_id } => print_json(&cli.api.delete_user(user_id).await?),
        UserSubcommand::Touch { user_id } => print_json(&cli.api.touch_last_login(user_id).await?),
    }
}

async fn run_report(cli: &CliContext, report: ReportCommand) -> Result<(), CliError> {
    match report.command {
        ReportSubcommand::Fetch { name, output } => {
            let bytes = cli.api.fetch_report(&name).await?;
            let path = output.unwrap_or_else(|| PathBuf::from(report_file_name(&name)));
            tokio::fs::write(&path, &bytes)
                .await
                .map_err(|source| CliError::Write { path: path.display().to_string(), source })?;
            eprintln!("wrote {} bytes to {}", bytes.len(), path.display());
            Ok(())
        }
    }
}

async fn run_raw(cli: &CliContext, method: &str, path: &str, data: Option<&str>) -> Result<(), CliError> {
    let method = parse_method(method)?;
    let body = data.map(serde_json::from_str::<Value>).transpose()?;
    let token = cli.session.credential().map(|c| c.token);
    let value = cli.api.request_json(method, path, body.as_ref(), token.as_deref()).await?;
    print_json(&value)
}

async fn run_rt(cli: &CliContext, rt: RtCommand) -> Result<(), CliError> {
    let handle = RealtimeHandle::connect(&cli.config.realtime);
    let mut events = handle.subscribe();

    let result = match rt.command {
        RtSubcommand::Send { message, timeout_secs } => {
            handle.send_message(&message)?;
            let wait = async {
                loop {
                    match events.recv().await {
                        Ok(RealtimeEvent::Response(payload)) => return Ok(payload),
                        Ok(RealtimeEvent::ConnectError(reason)) => {
                            return Err(CliError::Realtime(RealtimeError::Failed(reason)));
                        }
                        Ok(_) | Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                            return Err(CliError::Realtime(RealtimeError::Closed));
                        }
                    }
                }
            };
            match tokio::time::timeout(Duration::from_secs(timeout_secs), wait).await {
                Ok(Ok(payload)) => print_json(&payload),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(CliError::Timeout(RESPONSE_EVENT)),
            }
        }
        RtSubcommand::Listen { count } => {
            let mut seen = 0_usize;
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(event) => {
                            println!("{}", event_json(&event));
                            seen = seen.saturating_add(1);
                            if count.is_some_and(|limit| seen >= limit) {
                                break Ok(());
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            eprintln!("skipped {skipped} events");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break Ok(()),
                    },
                    _ = tokio::signal::ctrl_c() => break Ok(()),
                }
            }
        }
    };

    handle.close().await;
    result
}

fn parse_method(raw: &str) -> Result<reqwest::Method, CliError> {
    reqwest::Method::from_bytes(raw.to_ascii_uppercase().as_bytes())
        .map_err(|_| CliError::InvalidMethod(raw.to_owned()))
}

fn report_file_name(name: &str) -> &str {
    name.rsplit('/').next().filter(|n| !n.is_empty()).unwrap_or("report.bin")
}

fn resolution_json(resolution: &Resolution) -> Value {
    match resolution {
        Resolution::Continue(target) => json!({ "outcome": "continue", "path": target.path, "name": target.name }),
        Resolution::Redirect { requested, to } => {
            json!({ "outcome": "redirect", "requested": requested, "path": to.path, "name": to.name })
        }
        Resolution::Aborted { requested } => json!({ "outcome": "aborted", "requested": requested }),
    }
}

fn event_json(event: &RealtimeEvent) -> Value {
    match event {
        RealtimeEvent::Connected { sid } => json!({ "event": "connect", "sid": sid }),
        RealtimeEvent::Response(payload) => json!({ "event": RESPONSE_EVENT, "payload": payload }),
        RealtimeEvent::Event { name, args } => json!({ "event": name, "args": args }),
        RealtimeEvent::ConnectError(reason) => json!({ "event": "connect_error", "reason": reason }),
        RealtimeEvent::Disconnected { reason } => json!({ "event": "disconnect", "reason": reason }),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
