mod local;
mod store;
mod term;

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::{bail, Result};
use signal_hook::consts::{SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;

use jobmux_core::attach::{AttachOptions, AttachSession};
use jobmux_core::client::JobOps;
use jobmux_core::config::{load_config, EngineConfig};
use jobmux_core::models::TermSize;
use jobmux_core::term::Terminal;

use local::LocalJobService;
use store::JobStore;
use term::{spawn_key_pump, CrosstermTerminal, RawModeGuard, StdoutSink};

const BUFFER_CAP: usize = 256 * 1024;

const USAGE: &str = "usage: jobmux run [--no-tty] [--quiet] [--logs] [--config <path>] -- <command...>";

struct CliArgs {
    no_tty: bool,
    quiet: bool,
    logs: bool,
    config: Option<PathBuf>,
    command: Vec<String>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = match parse_args(env::args().skip(1)) {
        Ok(args) => args,
        Err(err) => {
            eprintln!("{err}");
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    };
    let runtime = tokio::runtime::Runtime::new()?;
    let code = runtime.block_on(async_main(args))?;
    std::process::exit(code);
}

async fn async_main(args: CliArgs) -> Result<i32> {
    let config = match &args.config {
        Some(path) => load_config(path).await?,
        None => default_config().await,
    };

    let service = Arc::new(LocalJobService::new(BUFFER_CAP));
    setup_signal_handlers(service.clone())?;

    let terminal = Arc::new(CrosstermTerminal);
    let tty = !args.no_tty && terminal.is_tty();
    let size = terminal.size().unwrap_or(TermSize::new(80, 24));

    let command = args.command.join(" ");
    let job_id = service.spawn(&command, size)?;

    let record = match JobStore::new() {
        Ok(store) => match store.create(&job_id, &command) {
            Ok(record) => Some((store, record)),
            Err(err) => {
                log::warn!("failed to write job record: {err}");
                None
            }
        },
        Err(err) => {
            log::warn!("job store unavailable: {err}");
            None
        }
    };

    let _raw = if tty {
        Some(RawModeGuard::enable()?)
    } else {
        None
    };
    let keys = spawn_key_pump(tty);
    let ops = Arc::new(JobOps::new(service.clone(), job_id));
    let session = AttachSession::new(
        ops,
        terminal,
        Box::new(StdoutSink::new(tty)),
        config,
        AttachOptions {
            tty,
            logs: args.logs,
            quiet: args.quiet,
        },
    );
    let code = session.run(keys).await?;

    if let Some((store, mut record)) = record {
        if let Err(err) = store.finish(&mut record, code) {
            log::warn!("failed to update job record: {err}");
        }
    }
    Ok(code)
}

async fn default_config() -> EngineConfig {
    let Some(home) = env::var_os("HOME") else {
        return EngineConfig::default();
    };
    let path = PathBuf::from(home).join(".jobmux").join("config.toml");
    if !path.exists() {
        return EngineConfig::default();
    }
    match load_config(&path).await {
        Ok(config) => config,
        Err(err) => {
            log::warn!("ignoring unreadable config {}: {err}", path.display());
            EngineConfig::default()
        }
    }
}

/// SIGINT belongs to the attach session; SIGTERM/SIGQUIT tear the process
/// down after hanging up the children.
fn setup_signal_handlers(service: Arc<LocalJobService>) -> Result<()> {
    let mut signals = Signals::new([SIGTERM, SIGQUIT])?;
    thread::spawn(move || {
        for _ in signals.forever() {
            service.terminate_all(libc::SIGHUP);
            std::process::exit(1);
        }
    });
    Ok(())
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<CliArgs> {
    match args.next().as_deref() {
        Some("run") => {}
        Some(other) => bail!("unknown command: {other}"),
        None => bail!("missing command"),
    }

    let mut parsed = CliArgs {
        no_tty: false,
        quiet: false,
        logs: false,
        config: None,
        command: Vec::new(),
    };
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--no-tty" => parsed.no_tty = true,
            "--quiet" => parsed.quiet = true,
            "--logs" => parsed.logs = true,
            "--config" => match args.next() {
                Some(path) => parsed.config = Some(PathBuf::from(path)),
                None => bail!("--config requires a path"),
            },
            "--" => {
                parsed.command = args.collect();
                break;
            }
            other => bail!("unknown flag: {other}"),
        }
    }
    if parsed.command.is_empty() {
        bail!("missing command after --");
    }
    Ok(parsed)
}
