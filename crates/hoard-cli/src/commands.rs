use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::Context;
use colored::Colorize;
use hoard_client::{DeleteStatus, PutStatus, Session, SessionConfig};
use hoard_store::{ObjectInfo, ObjectStore, StoreConfig, StoreServer};
use hoard_types::HashKeyMapper;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::cli::*;

/// On-disk configuration: one table per layer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HoardConfig {
    pub store: StoreConfig,
    pub session: SessionConfig,
}

impl HoardConfig {
    fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("in {}", path.display()))
    }

    fn parse(text: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.store.validate()?;
        config.session.validate()?;
        Ok(config)
    }
}

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Config => cmd_config(),
        Command::Check(args) => cmd_check(args, cli.format),
        Command::Shell(args) => cmd_shell(args, cli.format),
    }
}

fn cmd_config() -> anyhow::Result<()> {
    print!("{}", toml::to_string(&HoardConfig::default())?);
    Ok(())
}

fn cmd_check(args: CheckArgs, format: OutputFormat) -> anyhow::Result<()> {
    let config = HoardConfig::load(&args.file)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
        OutputFormat::Text => {
            println!("{} {} is valid", "✓".green().bold(), args.file.display());
            println!("  Endpoint: {}", config.store.endpoint.display().to_string().cyan());
            println!("  Capacity: {} bytes", config.store.capacity.to_string().bold());
            println!("  Orphans:  {:?}", config.store.orphan_policy);
        }
    }
    Ok(())
}

fn cmd_shell(args: ShellArgs, format: OutputFormat) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => HoardConfig::load(path)?,
        None => HoardConfig::default(),
    };
    if let Some(capacity) = args.capacity {
        config.store.capacity = capacity;
    }
    if let Some(endpoint) = args.endpoint {
        config.store.endpoint = endpoint;
    }

    let server = StoreServer::start(config.store)?;
    let mut session =
        Session::connect_with(server.endpoint(), config.session, HashKeyMapper::default())?;
    if format == OutputFormat::Text {
        eprintln!(
            "{} store at {} ({} bytes); type {} for commands",
            "hoard".green().bold(),
            server.endpoint().display(),
            server.store().capacity(),
            "help".bold()
        );
    }

    let stdin = io::stdin();
    let stdout = io::stdout();
    run_shell(&mut session, server.store(), stdin.lock(), &mut stdout.lock(), format)?;

    let report = session.close();
    if format == OutputFormat::Text {
        eprintln!(
            "session closed: {} aborted, {} kept, {} orphaned, {} pending",
            report.aborted, report.kept, report.orphaned, report.pending
        );
    }
    server.shutdown();
    Ok(())
}

/// One line of shell input.
#[derive(Debug, PartialEq, Eq)]
enum ShellCommand {
    Put { key: String, value: String },
    Get { key: String },
    Del { key: String },
    Contains { key: String },
    Info { key: String },
    List,
    Stats,
    Sweep,
    Help,
    Quit,
}

impl ShellCommand {
    /// `None` for blank lines and `#` comments.
    fn parse(line: &str) -> anyhow::Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();
        let key = || -> anyhow::Result<String> {
            match rest.split_whitespace().next() {
                Some(key) => Ok(key.to_string()),
                None => anyhow::bail!("{verb}: missing key"),
            }
        };
        let cmd = match verb {
            "put" => {
                let (key, value) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
                if key.is_empty() {
                    anyhow::bail!("put: missing key");
                }
                Self::Put {
                    key: key.to_string(),
                    value: value.trim_start().to_string(),
                }
            }
            "get" => Self::Get { key: key()? },
            "del" | "delete" => Self::Del { key: key()? },
            "contains" => Self::Contains { key: key()? },
            "info" => Self::Info { key: key()? },
            "list" => Self::List,
            "stats" => Self::Stats,
            "sweep" => Self::Sweep,
            "help" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => anyhow::bail!("unknown command: {other}"),
        };
        Ok(Some(cmd))
    }
}

const HELP: &str = "\
put <key> <value>   store a value
get <key>           print a value
del <key>           delete a key this session put
contains <key>      check whether a key exists
info <key>          show the object behind a key
list                list every object
stats               show arena and directory counters
sweep               reclaim orphaned objects
quit                close the session";

/// Run commands from `input` until EOF or `quit`. Errors on a line are
/// reported and do not stop the shell.
fn run_shell(
    session: &mut Session,
    store: &ObjectStore,
    input: impl BufRead,
    out: &mut impl Write,
    format: OutputFormat,
) -> anyhow::Result<()> {
    for line in input.lines() {
        let line = line?;
        let cmd = match ShellCommand::parse(&line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => continue,
            Err(e) => {
                report_error(out, format, &e)?;
                continue;
            }
        };
        if cmd == ShellCommand::Quit {
            break;
        }
        if let Err(e) = execute(session, store, cmd, out, format) {
            report_error(out, format, &e)?;
        }
    }
    Ok(())
}

fn execute(
    session: &mut Session,
    store: &ObjectStore,
    cmd: ShellCommand,
    out: &mut impl Write,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let json = format == OutputFormat::Json;
    match cmd {
        ShellCommand::Put { key, value } => {
            let status = session.put(&key, value.as_bytes())?;
            if json {
                writeln!(out, "{}", json!({ "key": key, "status": status }))?;
            } else {
                match status {
                    PutStatus::Stored => writeln!(out, "{} stored {}", "✓".green(), key.bold())?,
                    PutStatus::Conflict => {
                        writeln!(out, "{} {} already exists", "!".yellow(), key.bold())?
                    }
                }
            }
        }
        ShellCommand::Get { key } => {
            let value = session.get(&key)?;
            let text = String::from_utf8_lossy(&value);
            if json {
                writeln!(out, "{}", json!({ "key": key, "value": text }))?;
            } else {
                writeln!(out, "{text}")?;
            }
        }
        ShellCommand::Del { key } => {
            let status = session.delete(&key)?;
            if json {
                writeln!(out, "{}", json!({ "key": key, "status": status }))?;
            } else {
                match status {
                    DeleteStatus::Deleted => writeln!(out, "{} deleted {}", "✓".green(), key.bold())?,
                    DeleteStatus::PendingRelease => {
                        writeln!(out, "{} {} pending release", "~".yellow(), key.bold())?
                    }
                    DeleteStatus::Rejected => {
                        writeln!(out, "{} {} is not owned by this session", "✗".red(), key.bold())?
                    }
                }
            }
        }
        ShellCommand::Contains { key } => {
            let present = session.contains(&key)?;
            if json {
                writeln!(out, "{}", json!({ "key": key, "contains": present }))?;
            } else {
                writeln!(out, "{present}")?;
            }
        }
        ShellCommand::Info { key } => {
            let info = store.info(&session.object_id(&key))?;
            write_info(out, format, &info)?;
        }
        ShellCommand::List => {
            let infos = store.list();
            if !json && infos.is_empty() {
                writeln!(out, "No objects.")?;
            }
            for info in &infos {
                write_info(out, format, info)?;
            }
        }
        ShellCommand::Stats => {
            let stats = store.stats();
            if json {
                writeln!(out, "{}", serde_json::to_string(&stats)?)?;
            } else {
                writeln!(
                    out,
                    "arena: {}/{} bytes used, {} free spans, largest {}",
                    stats.allocated_bytes.to_string().bold(),
                    stats.capacity,
                    stats.free_spans,
                    stats.largest_free_span
                )?;
                writeln!(
                    out,
                    "objects: {} created, {} sealed, {} draining, {} orphaned",
                    stats.created, stats.sealed, stats.draining, stats.orphaned
                )?;
                writeln!(out, "sessions: {}, waiters: {}", stats.sessions, stats.waiters)?;
            }
        }
        ShellCommand::Sweep => {
            let report = store.sweep_orphans();
            if json {
                writeln!(out, "{}", serde_json::to_string(&report)?)?;
            } else {
                writeln!(
                    out,
                    "{} swept: {} aborted, {} reclaimed, {} pending",
                    "✓".green(),
                    report.aborted,
                    report.reclaimed,
                    report.pending
                )?;
            }
        }
        ShellCommand::Help => writeln!(out, "{HELP}")?,
        ShellCommand::Quit => {}
    }
    Ok(())
}

fn write_info(out: &mut impl Write, format: OutputFormat, info: &ObjectInfo) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        let value = json!({
            "id": info.id.to_hex(),
            "state": info.state,
            "size": info.size,
            "ref_count": info.ref_count,
            "orphaned": info.orphaned,
        });
        writeln!(out, "{value}")?;
    } else {
        let orphan = if info.orphaned { " orphaned" } else { "" };
        writeln!(
            out,
            "{}  {:<7}  {} bytes  refs {}{}",
            info.id.short_hex().yellow(),
            info.state.to_string(),
            info.size,
            info.ref_count,
            orphan.dimmed()
        )?;
    }
    Ok(())
}

fn report_error(out: &mut impl Write, format: OutputFormat, err: &anyhow::Error) -> io::Result<()> {
    match format {
        OutputFormat::Json => writeln!(out, "{}", json!({ "error": err.to_string() })),
        OutputFormat::Text => writeln!(out, "{} {err}", "error:".red().bold()),
    }
}
