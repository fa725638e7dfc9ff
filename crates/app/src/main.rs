use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use progress_core::model::{ChannelId, ContentId, ContentKind, ContentRef, Credentials, FacilityId};
use resources::{ApiConfig, HttpResourceClient};
use services::{AppServices, Clock, FileCookieJar, TrackerConfig};
use tracing::{info, warn};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingFlag(&'static str),
    UnknownArg(String),
    InvalidNumber { flag: &'static str, raw: String },
    InvalidKind { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFlag(flag) => write!(f, "{flag} is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidNumber { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidKind { raw } => write!(f, "invalid --kind value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_number<T: std::str::FromStr>(raw: String, flag: &'static str) -> Result<T, ArgsError> {
    raw.parse()
        .map_err(|_| ArgsError::InvalidNumber { flag, raw })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- login --user <name> [--password <pw>] [--facility <id>]");
    eprintln!("  cargo run -p app -- view  --user <name> [--password <pw>] --channel <id>");
    eprintln!("                            --content <id> --kind <kind> [--seconds <n>] [--progress <p>]");
    eprintln!();
    eprintln!("Common options:");
    eprintln!("  --api <url>        resource API base url");
    eprintln!("  --cookies <path>   cookie file (default .learn-cookies.json)");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  LEARN_API_BASE_URL, LEARN_API_TIMEOUT_SECS, LEARN_PASSWORD, LEARN_COOKIE_FILE,");
    eprintln!("  LEARN_PROGRESS_THRESHOLD, LEARN_TIME_THRESHOLD_SECS, LEARN_TICK_INTERVAL_SECS, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Login,
    View,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "login" => Some(Self::Login),
            "view" => Some(Self::View),
            _ => None,
        }
    }
}

struct ViewArgs {
    content: ContentRef,
    seconds: u64,
    progress: f64,
}

struct Args {
    api: Option<String>,
    cookie_file: PathBuf,
    credentials: Credentials,
    view: Option<ViewArgs>,
}

impl Args {
    fn parse(cmd: Command, args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut api = None;
        let mut cookie_file = std::env::var("LEARN_COOKIE_FILE")
            .map_or_else(|_| PathBuf::from(".learn-cookies.json"), PathBuf::from);
        let mut username = None;
        let mut password = std::env::var("LEARN_PASSWORD").unwrap_or_default();
        let mut facility = None;
        let mut channel = None;
        let mut content = None;
        let mut kind = None;
        let mut seconds = 10;
        let mut progress = 0.0;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--api" => api = Some(require_value(args, "--api")?),
                "--cookies" => cookie_file = PathBuf::from(require_value(args, "--cookies")?),
                "--user" => username = Some(require_value(args, "--user")?),
                "--password" => password = require_value(args, "--password")?,
                "--facility" => {
                    facility = Some(FacilityId::new(require_value(args, "--facility")?));
                }
                "--channel" if cmd == Command::View => {
                    channel = Some(ChannelId::new(require_value(args, "--channel")?));
                }
                "--content" if cmd == Command::View => {
                    content = Some(ContentId::new(require_value(args, "--content")?));
                }
                "--kind" if cmd == Command::View => {
                    let raw = require_value(args, "--kind")?;
                    kind = Some(
                        raw.parse::<ContentKind>()
                            .map_err(|_| ArgsError::InvalidKind { raw })?,
                    );
                }
                "--seconds" if cmd == Command::View => {
                    seconds = parse_number(require_value(args, "--seconds")?, "--seconds")?;
                }
                "--progress" if cmd == Command::View => {
                    progress = parse_number(require_value(args, "--progress")?, "--progress")?;
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        let username = username.ok_or(ArgsError::MissingFlag("--user"))?;
        let mut credentials = Credentials::new(username, password);
        if let Some(facility) = facility {
            credentials = credentials.with_facility(facility);
        }

        let view = match cmd {
            Command::Login => None,
            Command::View => Some(ViewArgs {
                content: ContentRef::new(
                    channel.ok_or(ArgsError::MissingFlag("--channel"))?,
                    content.ok_or(ArgsError::MissingFlag("--content"))?,
                    kind.ok_or(ArgsError::MissingFlag("--kind"))?,
                ),
                seconds,
                progress,
            }),
        };

        Ok(Self {
            api,
            cookie_file,
            credentials,
            view,
        })
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);
    let cmd = match argv.next().as_deref() {
        None | Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    let parsed = Args::parse(cmd, &mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let api = match parsed.api.as_deref() {
        Some(raw) => ApiConfig::new(raw)?,
        None => ApiConfig::from_env()?,
    };
    info!(base_url = %api.base_url, "using resource api");
    let client = Arc::new(HttpResourceClient::new(api)?);
    let cookies = Arc::new(FileCookieJar::open(&parsed.cookie_file)?);
    let app = AppServices::new(client, cookies, Clock::default(), TrackerConfig::from_env()?);

    let redirect = app.session().login(&parsed.credentials, false).await?;
    let session = app.session().get_current_session(true).await?;
    let points = app.session().fetch_points().await?;
    let channel = app.channels().set_channel_info(None).await?;
    println!(
        "signed in as {} (points: {points}, channel: {}, next: {})",
        session.username,
        channel.as_ref().map_or("none", ChannelId::as_str),
        redirect.path()
    );

    if let Some(view) = parsed.view {
        let started = app.content().init_content_session(view.content).await?;
        info!(session_log = %started.session_id, "viewing content");
        app.tracker().start_tracking()?;
        tokio::time::sleep(Duration::from_secs(view.seconds)).await;
        if view.progress > 0.0 {
            let update = app.tracker().update_progress(view.progress, false)?;
            println!(
                "progress: session {:.2}, overall {:.2}",
                update.session_progress, update.summary_progress
            );
        }
        let stopped = app.tracker().stop_tracking()?;
        if let Some(flush) = stopped.flush {
            let report = flush.wait().await?;
            if !report.is_ok() {
                warn!(?report, "final save did not complete");
            }
        }
        println!("time spent: {:.0}s", stopped.session_time);
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
