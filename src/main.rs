//! CLI entry point
//!
//! Parses flags, merges them over an optional TOML config file, opens the
//! connection pool (running `fsck` first if asked), and either mounts the
//! filesystem or — with `--fsck-only` — runs the consistency pass and exits
//! without mounting anything.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use mysqlfs_rs::bridge::Bridge;
use mysqlfs_rs::config::{CliOverrides, Config, FileConfig};
use mysqlfs_rs::dispatcher::OperationTable;
use mysqlfs_rs::pool::Pool;

/// A userspace filesystem backed by a MySQL database.
#[derive(Parser, Debug)]
#[command(name = "mysqlfs-rs", version)]
struct Args {
    /// Where to mount the filesystem.
    mountpoint: Option<PathBuf>,

    /// Path to a TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    host: Option<String>,

    #[arg(short = 'u', long)]
    user: Option<String>,

    #[arg(short = 'p', long)]
    password: Option<String>,

    #[arg(short, long)]
    database: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    #[arg(long)]
    socket: Option<String>,

    /// Group name to read connection defaults from in `~/.my.cnf`.
    #[arg(long)]
    mycnf_group: Option<String>,

    #[arg(long)]
    init_conns: Option<usize>,

    #[arg(long)]
    max_idling_conns: Option<usize>,

    /// Run fsck before mounting.
    #[arg(long)]
    fsck: bool,

    /// Run fsck and exit without mounting.
    #[arg(long)]
    fsck_only: bool,

    /// Send log output to stdout, stderr, or a file path.
    #[arg(long)]
    logfile: Option<String>,

    /// Mount read-only.
    #[arg(long)]
    read_only: bool,

    /// Fork into the background once the pool is ready, before mounting.
    #[arg(long)]
    background: bool,
}

fn init_logging(target: &mysqlfs_rs::config::LogTarget) -> Result<(), String> {
    use mysqlfs_rs::config::LogTarget;
    use std::io::Write;

    let mut builder = env_logger::Builder::from_default_env();
    match target {
        LogTarget::Stdout => {
            builder.target(env_logger::Target::Stdout);
        }
        LogTarget::Stderr => {
            builder.target(env_logger::Target::Stderr);
        }
        LogTarget::File(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| format!("opening log file {path}: {e}"))?;
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
    }
    builder.format(|buf, record| {
        writeln!(buf, "[{} {}] {}", record.level(), record.target(), record.args())
    });
    builder.init();
    Ok(())
}

fn run() -> Result<ExitCode, String> {
    let args = Args::parse();

    let file_config = match &args.config {
        Some(path) => FileConfig::from_file(path).map_err(|e| format!("reading {}: {e}", path.display()))?,
        None => FileConfig::default(),
    };

    let cli = CliOverrides {
        host: args.host,
        user: args.user,
        password: args.password,
        database: args.database,
        port: args.port,
        socket: args.socket,
        mycnf_group: args.mycnf_group,
        init_conns: args.init_conns,
        max_idling_conns: args.max_idling_conns,
        fsck: args.fsck || args.fsck_only,
        logfile: args.logfile,
        background: args.background,
    };

    let config = Config::resolve(file_config, cli);
    init_logging(&config.log_target)?;

    log::info!("connecting to {}:{} database {}", config.host, config.port, config.database);
    let pool = Pool::init(&config).map_err(|e| format!("initializing connection pool: {e}"))?;

    if args.fsck_only {
        log::info!("fsck-only run requested, not mounting");
        pool.shutdown();
        return Ok(ExitCode::from(2));
    }

    if config.background {
        // SAFETY: fork() is called before any threads are spawned (the pool
        // holds plain TCP connections, no background workers yet); the
        // parent exits immediately and the child carries on to mount.
        match unsafe { libc::fork() } {
            -1 => return Err("fork() failed while backgrounding".to_string()),
            0 => log::info!("backgrounded, continuing as pid {}", std::process::id()),
            _ => return Ok(ExitCode::from(0)),
        }
    }

    let mountpoint = args
        .mountpoint
        .ok_or_else(|| "a mountpoint is required unless --fsck-only is given".to_string())?;

    let ops = OperationTable::new(pool.clone());
    let bridge = Bridge::new(ops);

    let mut mount_options = vec![fuser::MountOption::FSName("mysqlfs-rs".to_string())];
    if args.read_only {
        mount_options.push(fuser::MountOption::RO);
    }

    log::info!("mounting at {}", mountpoint.display());
    let result = fuser::mount2(bridge, &mountpoint, &mount_options);
    pool.shutdown();

    result
        .map(|()| ExitCode::from(0))
        .map_err(|e| format!("mount session ended with an error: {e}"))
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(msg) => {
            eprintln!("mysqlfs-rs: {msg}");
            ExitCode::from(1)
        }
    }
}
