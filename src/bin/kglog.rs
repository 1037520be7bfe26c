//! kglog - replay and inspect knowledge-graph command logs
//!
//! - `kglog replay <LOG>`: replay a log file and print the facts visible at
//!   the last index (or `--as-of N`)
//! - `kglog inspect <LOG>`: list the records of a log file by kind
//! - `kglog init-config [DIR]`: write a commented `kglog.toml`

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kglog::codec;
use kglog::render::{format_fact, format_stats};
use kglog::{
    FactStore, FileLog, FileLogReader, LogStream, RecordingLatency, Replica, ReplicaConfig,
    CONFIG_FILE_NAME, FIRST_LOG_INDEX,
};

fn build_cli() -> Command {
    Command::new("kglog")
        .about("Replay and inspect knowledge-graph command logs")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .help("Path to kglog.toml (default: built-in settings)")
                .value_parser(value_parser!(PathBuf))
                .global(true),
        )
        .subcommand(
            Command::new("replay")
                .about("Replay a log file and print the visible facts")
                .arg(
                    Arg::new("log")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("as-of")
                        .long("as-of")
                        .help("Read facts as of this log index (default: last index)")
                        .value_parser(value_parser!(u64)),
                )
                .arg(
                    Arg::new("strict")
                        .long("strict")
                        .help("Stop on undecodable entries")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("inspect")
                .about("List the records of a log file")
                .arg(
                    Arg::new("log")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("decode")
                        .long("decode")
                        .help("Print each decoded command")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("init-config")
                .about("Write a default kglog.toml if none exists")
                .arg(
                    Arg::new("dir")
                        .default_value(".")
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
}

fn load_config(matches: &ArgMatches) -> Result<ReplicaConfig> {
    match matches.get_one::<PathBuf>("config") {
        Some(path) => Ok(ReplicaConfig::from_file(path)?),
        None => Ok(ReplicaConfig::default()),
    }
}

fn setup_logging(config: &ReplicaConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn replay(config: ReplicaConfig, args: &ArgMatches) -> Result<()> {
    let log_path = required_path(args, "log")?;
    let mut config = config;
    if args.get_flag("strict") {
        config.strict_decode = true;
    }

    let log = FileLog::open(log_path)
        .with_context(|| format!("opening log '{}'", log_path.display()))?;
    let store = Arc::new(FactStore::new());
    let latency = Arc::new(RecordingLatency::new());
    let mut replica = Replica::new(config, Arc::clone(&store), Arc::clone(&latency))?;

    let mut reader = log.reader_from(FIRST_LOG_INDEX)?;
    let stats = replica.run(&mut reader)?;
    info!(
        entries = stats.entries_applied,
        facts = store.len(),
        "Replay finished"
    );
    for (seq, index) in latency.observed() {
        debug!(seq, index, "Own ping");
    }

    let as_of = match args.get_one::<u64>("as-of") {
        Some(as_of) => *as_of,
        None => replica.session().last_index().unwrap_or(0),
    };
    for fact in store.facts_as_of(as_of)? {
        let visibility_index = store.visibility_of(fact.fact_id).unwrap_or(as_of);
        println!("{}", format_fact(visibility_index, &fact));
    }
    println!("{}", format_stats(&stats));
    Ok(())
}

fn inspect(args: &ArgMatches) -> Result<()> {
    let log_path = required_path(args, "log")?;
    let decode = args.get_flag("decode");

    let mut reader = FileLogReader::open(log_path, FIRST_LOG_INDEX)
        .with_context(|| format!("opening log '{}'", log_path.display()))?;
    while let Some(record) = reader.next_record()? {
        let kind = match codec::peek_kind(&record.payload) {
            Ok(tag) => codec::kind_name(tag)
                .map(str::to_string)
                .unwrap_or_else(|| format!("unknown(0x{:02x})", tag)),
            Err(e) => format!("invalid ({})", e),
        };
        if decode {
            match codec::decode(&record.payload) {
                Ok(encoded) => println!("{:>8} {:<10} {:?}", record.index, kind, encoded.command()),
                Err(e) => println!("{:>8} {:<10} <{}>", record.index, kind, e),
            }
        } else {
            println!("{:>8} {:<10} {} bytes", record.index, kind, record.payload.len());
        }
    }
    Ok(())
}

fn init_config(args: &ArgMatches) -> Result<()> {
    let dir = required_path(args, "dir")?;
    if !dir.is_dir() {
        bail!("'{}' is not a directory", dir.display());
    }
    let path = dir.join(CONFIG_FILE_NAME);
    ReplicaConfig::write_default_if_missing(&path)?;
    println!("{}", path.display());
    Ok(())
}

fn required_path<'a>(args: &'a ArgMatches, name: &str) -> Result<&'a Path> {
    args.get_one::<PathBuf>(name)
        .map(PathBuf::as_path)
        .with_context(|| format!("missing argument '{}'", name))
}

fn main() -> Result<()> {
    let matches = build_cli().get_matches();
    let config = load_config(&matches)?;
    setup_logging(&config);

    match matches.subcommand() {
        Some(("replay", args)) => replay(config, args),
        Some(("inspect", args)) => inspect(args),
        Some(("init-config", args)) => init_config(args),
        Some((other, _)) => bail!("unknown command '{}'", other),
        None => bail!("no command given"),
    }
}
