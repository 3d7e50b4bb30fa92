//! extfs binary.
//!
//! Scans a directory (or a list of paths) into a session index and drives the
//! read-only handlers the way a filesystem transport would.
//!
//! Usage:
//!   # Every extension directory and leaf, with link targets
//!   extfs --root ~/music tree
//!
//!   # NUL-delimited list on stdin
//!   find /srv -name '*.log' -print0 | extfs --list - -0 ls /log
//!
//!   # Keep the index around and reuse it without rescanning
//!   extfs --root ~/music --store /var/tmp/music.db stats
//!   extfs --store /var/tmp/music.db --no-scan readlink /flac/intro_0.flac

use std::io::{self, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{EnvFilter, fmt};

use extfs_kernel::{
    DirEntry, DuplicatePolicy, ExtFs, ListDelimiter, Session, SessionConfig, VfsOps,
};

/// Read-only view of files grouped by extension.
#[derive(Parser, Debug)]
#[command(name = "extfs")]
#[command(about = "Inspect the extension-grouped view of a set of files")]
struct Args {
    /// Directory to scan recursively
    #[arg(long, conflicts_with = "list")]
    root: Option<PathBuf>,

    /// File listing the paths to index ("-" reads stdin)
    #[arg(long, value_name = "FILE")]
    list: Option<PathBuf>,

    /// List entries are NUL-terminated instead of newline-terminated
    #[arg(short = '0', long = "null")]
    null: bool,

    /// Index database location (temporary file when omitted)
    #[arg(long)]
    store: Option<PathBuf>,

    /// Reuse the existing --store instead of scanning
    #[arg(long)]
    no_scan: bool,

    /// Remove --store when done
    #[arg(long)]
    delete_store: bool,

    /// What to do when the same path is offered twice
    #[arg(long, value_enum)]
    on_duplicate: Option<OnDuplicate>,

    /// TOML config file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every extension directory and leaf with its target
    Tree,
    /// List a synthetic directory
    Ls { path: PathBuf },
    /// Show attributes of a synthetic path
    Stat { path: PathBuf },
    /// Print the real path behind a leaf
    Readlink { path: PathBuf },
    /// Scan summary and filesystem statistics
    Stats,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OnDuplicate {
    Abort,
    Skip,
}

impl From<OnDuplicate> for DuplicatePolicy {
    fn from(value: OnDuplicate) -> Self {
        match value {
            OnDuplicate::Abort => DuplicatePolicy::Abort,
            OnDuplicate::Skip => DuplicatePolicy::Skip,
        }
    }
}

impl Args {
    /// Config file (if any) with command-line flags layered on top.
    fn session_config(&self) -> Result<SessionConfig> {
        let mut config = match &self.config {
            Some(path) => SessionConfig::load(path)?,
            None => SessionConfig::default(),
        };

        if let Some(root) = &self.root {
            config.root_path = Some(root.clone());
            config.file_list = None;
        }
        if let Some(list) = &self.list {
            config.file_list = Some(list.clone());
            config.root_path = None;
        }
        if self.null {
            config.list_delimiter = ListDelimiter::Nul;
        }
        if let Some(store) = &self.store {
            config.store_path = Some(store.clone());
        }
        config.skip_scan |= self.no_scan;
        config.delete_on_teardown |= self.delete_store;
        config.verbose |= self.verbose;
        if let Some(policy) = self.on_duplicate {
            config.on_duplicate = policy.into();
        }

        Ok(config)
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match args.session_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("extfs: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(config.verbose);

    match run(config, args.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: SessionConfig, command: Command) -> Result<()> {
    let session = Arc::new(Session::open(config).context("failed to open session")?);

    let scanning = session.clone();
    let summary = tokio::task::spawn_blocking(move || scanning.initialize())
        .await
        .context("scan task panicked")?
        .context("scan failed")?;
    tracing::debug!(indexed = summary.indexed, skipped = summary.skipped, "session ready");

    let fs = ExtFs::new(session);
    let mut out = io::stdout().lock();

    match command {
        Command::Tree => cmd_tree(&fs, &mut out).await?,
        Command::Ls { path } => cmd_ls(&fs, &path, &mut out).await?,
        Command::Stat { path } => cmd_stat(&fs, &path, &mut out).await?,
        Command::Readlink { path } => {
            let target = fs
                .readlink(&path)
                .await
                .with_context(|| format!("readlink {}", path.display()))?;
            write_path(&mut out, &target)?;
            out.write_all(b"\n")?;
        }
        Command::Stats => {
            let stat = fs.statfs().await.context("statfs")?;
            writeln!(out, "store:   {}", fs.session().store_path().display())?;
            writeln!(out, "indexed: {}", summary.indexed)?;
            writeln!(out, "skipped: {}", summary.skipped)?;
            writeln!(out, "files:   {}", stat.files)?;
        }
    }

    out.flush()?;
    Ok(())
}

/// Entries of a directory without `.` and `..`.
async fn children(fs: &ExtFs, path: &Path) -> Result<Vec<DirEntry>> {
    let entries = fs
        .readdir(path)
        .await
        .with_context(|| format!("readdir {}", path.display()))?;
    Ok(entries
        .into_iter()
        .filter(|e| e.name != "." && e.name != "..")
        .collect())
}

async fn cmd_tree(fs: &ExtFs, out: &mut impl Write) -> Result<()> {
    let root = Path::new("/");
    for ext in children(fs, root).await? {
        let dir = root.join(&ext.name);
        writeln!(out, "{}/", dir.display())?;
        for leaf in children(fs, &dir).await? {
            let path = dir.join(&leaf.name);
            let target = fs
                .readlink(&path)
                .await
                .with_context(|| format!("readlink {}", path.display()))?;
            write!(out, "  {} -> ", leaf.name)?;
            write_path(out, &target)?;
            out.write_all(b"\n")?;
        }
    }
    Ok(())
}

async fn cmd_ls(fs: &ExtFs, path: &Path, out: &mut impl Write) -> Result<()> {
    for entry in children(fs, path).await? {
        let marker = if entry.kind.is_dir() { "/" } else { "@" };
        writeln!(out, "{}{marker}", entry.name)?;
    }
    Ok(())
}

async fn cmd_stat(fs: &ExtFs, path: &Path, out: &mut impl Write) -> Result<()> {
    let attr = fs
        .getattr(path)
        .await
        .with_context(|| format!("stat {}", path.display()))?;
    let kind = if attr.is_dir() { "directory" } else { "symbolic link" };
    writeln!(out, "  path: {}", path.display())?;
    writeln!(out, "  type: {kind}")?;
    writeln!(out, "  mode: {:o}", attr.mode())?;
    writeln!(out, "  size: {}", attr.size)?;
    writeln!(out, " links: {}", attr.nlink)?;
    Ok(())
}

/// Link targets go out as raw bytes so the output matches the real path.
fn write_path(out: &mut impl Write, path: &Path) -> io::Result<()> {
    out.write_all(path.as_os_str().as_bytes())
}
