use anyhow::Context;
use clap::{Parser, Subcommand};
use fastpass_core::cache::{CODE_EXTENSION, SOURCE_MAP_EXTENSION};
use fastpass_core::config::CONFIG_FILE_NAME;
use fastpass_core::{
    hash_file, CacheConfig, CompileCache, ConfigOverrides, DependencySet, PathResolver,
    StateSnapshot,
};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// fastpass - Compilation result cache for test runners
#[derive(Parser, Debug)]
#[command(name = "fastpass")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Cache root directory (overrides config and FASTPASS_CACHE_DIR)
    #[arg(long, global = true, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Path to fastpass.yaml configuration file
    #[arg(short, long, global = true, value_name = "FILE", env = "FASTPASS_CONFIG")]
    config: Option<PathBuf>,

    /// Treat framework internals as immutable dependencies
    #[arg(long, global = true)]
    framework_dev: bool,

    /// Framework source tree filtered out in development mode
    #[arg(long, global = true, value_name = "DIR")]
    framework_root: Option<PathBuf>,

    /// Coverage instrumentation shim filtered out in development mode
    #[arg(long, global = true, value_name = "FILE")]
    coverage_shim: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the cache root and what it holds
    Info {
        /// Print as JSON, including the effective configuration
        #[arg(long)]
        json: bool,
    },

    /// Print the cache file locations for a source file at a content hash
    Path {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(value_name = "HASH")]
        hash: String,
    },

    /// Print the content hash of each source file
    Hash {
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,

        /// Extra input mixed into every hash (e.g. transformer options)
        #[arg(long, default_value = "")]
        salt: String,
    },

    /// List the files affected by changes, using an exported state snapshot
    Affected {
        /// JSON state snapshot exported by a test run
        #[arg(long, value_name = "FILE")]
        snapshot: PathBuf,

        /// Follow dependents of dependents until nothing new is found
        #[arg(long)]
        transitive: bool,

        #[arg(value_name = "CHANGED", required = true)]
        changed: Vec<PathBuf>,
    },

    /// Watch a directory and report affected files on every change
    Watch {
        /// JSON state snapshot exported by a test run
        #[arg(long, value_name = "FILE")]
        snapshot: PathBuf,

        #[arg(value_name = "DIR")]
        dir: PathBuf,
    },

    /// Remove the cache root and everything in it
    Clean,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set RUST_LOG=debug for detailed logs; --verbose does the same
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli)?;
    let cache_dir = config.resolve_cache_dir();
    debug!("Cache directory: {}", cache_dir.display());

    match cli.command {
        Command::Info { json } => info_command(&config, &cache_dir, json),
        Command::Path { ref file, ref hash } => {
            let paths = PathResolver::new(&cache_dir)
                .resolve(file, hash)
                .with_context(|| format!("Cannot resolve cache paths for {}", file.display()))?;
            println!("{}", paths.code_path.display());
            println!("{}", paths.source_map_path.display());
            Ok(())
        }
        Command::Hash {
            ref files,
            ref salt,
        } => {
            for file in files {
                let hash = hash_file(file, salt)
                    .with_context(|| format!("Failed to hash {}", file.display()))?;
                println!("{}  {}", hash, file.display());
            }
            Ok(())
        }
        Command::Affected {
            ref snapshot,
            transitive,
            ref changed,
        } => {
            let cache = load_snapshot(&config, snapshot)?;
            let changed = changed
                .iter()
                .map(|p| absolutize(p))
                .collect::<anyhow::Result<Vec<_>>>()?;
            for path in affected_files(&cache, &changed, transitive) {
                println!("{}", path.display());
            }
            Ok(())
        }
        Command::Watch {
            ref snapshot,
            ref dir,
        } => {
            let cache = load_snapshot(&config, snapshot)?;
            watch_mode(&cache, &absolutize(dir)?)
        }
        Command::Clean => clean_command(&cache_dir),
    }
}

/// Defaults, then the config file, then the environment, then flags
fn load_config(cli: &Cli) -> anyhow::Result<CacheConfig> {
    let config_path = match cli.config {
        Some(ref path) => Some(path.clone()),
        None => {
            let default = PathBuf::from(CONFIG_FILE_NAME);
            default.exists().then_some(default)
        }
    };

    let config = match config_path {
        Some(path) => {
            info!("Loading config from {}", path.display());
            CacheConfig::from_file(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?
        }
        None => CacheConfig::default(),
    };

    let mut config = config.with_env();
    config.merge(&ConfigOverrides {
        cache_dir: cli.cache_dir.clone(),
        framework_dev_mode: cli.framework_dev.then_some(true),
        framework_root: cli.framework_root.clone(),
        coverage_shim: cli.coverage_shim.clone(),
    });
    Ok(config)
}

fn load_snapshot(config: &CacheConfig, path: &Path) -> anyhow::Result<CompileCache> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
    let snapshot = StateSnapshot::from_json(&json)
        .with_context(|| format!("Malformed snapshot {}", path.display()))?;

    let mut cache = CompileCache::from_config(config);
    cache.merge(snapshot);
    Ok(cache)
}

/// Absolute form of `path` with `.` and `..` folded away
///
/// Symlinks are left alone so the result compares equal to the paths the
/// loader recorded.
fn absolutize(path: &Path) -> anyhow::Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("Failed to read current directory")?
            .join(path)
    };
    Ok(normalize_lexically(&joined))
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Affected files for `changed`, optionally iterated to a fixpoint
fn affected_files(cache: &CompileCache, changed: &[PathBuf], transitive: bool) -> DependencySet {
    let deps = cache.deps();
    let mut affected = deps.affected_by_all(changed.iter().map(PathBuf::as_path));
    if transitive {
        loop {
            let next = deps.affected_by_all(affected.iter().map(PathBuf::as_path));
            if next.len() == affected.len() {
                break;
            }
            affected = next;
        }
    }
    affected
}

#[derive(Debug, Default)]
struct DirStats {
    entries: usize,
    source_maps: usize,
    shards: usize,
    bytes: u64,
}

fn scan_cache_dir(cache_dir: &Path) -> anyhow::Result<DirStats> {
    let mut stats = DirStats::default();
    if !cache_dir.exists() {
        return Ok(stats);
    }

    for entry in walkdir::WalkDir::new(cache_dir).min_depth(1) {
        let entry = entry.with_context(|| format!("Failed to scan {}", cache_dir.display()))?;
        if entry.file_type().is_dir() {
            stats.shards += 1;
            continue;
        }
        match entry.path().extension().and_then(|e| e.to_str()) {
            Some(CODE_EXTENSION) => stats.entries += 1,
            Some(SOURCE_MAP_EXTENSION) => stats.source_maps += 1,
            _ => continue,
        }
        stats.bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
    }
    Ok(stats)
}

fn info_command(config: &CacheConfig, cache_dir: &Path, json: bool) -> anyhow::Result<()> {
    let stats = scan_cache_dir(cache_dir)?;

    if json {
        let value = serde_json::json!({
            "cacheDir": cache_dir,
            "config": config,
            "exists": cache_dir.exists(),
            "entries": stats.entries,
            "sourceMaps": stats.source_maps,
            "shards": stats.shards,
            "bytes": stats.bytes,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Cache directory: {}", cache_dir.display());
    if !cache_dir.exists() {
        println!("(not created yet)");
    }
    println!("Entries: {}", stats.entries);
    println!("Source maps: {}", stats.source_maps);
    println!("Shards: {}", stats.shards);
    println!("Size: {} bytes", stats.bytes);
    Ok(())
}

fn clean_command(cache_dir: &Path) -> anyhow::Result<()> {
    if !cache_dir.exists() {
        println!("Nothing to clean at {}", cache_dir.display());
        return Ok(());
    }
    std::fs::remove_dir_all(cache_dir)
        .with_context(|| format!("Failed to remove {}", cache_dir.display()))?;
    println!("Removed {}", cache_dir.display());
    Ok(())
}

fn watch_mode(cache: &CompileCache, dir: &Path) -> anyhow::Result<()> {
    use notify::{Event, RecursiveMode, Watcher};
    use std::sync::mpsc::channel;
    use std::time::{Duration, Instant};

    let (tx, rx) = channel();
    let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
        if let Ok(event) = res {
            let _ = tx.send(event);
        }
    })?;
    watcher
        .watch(dir, RecursiveMode::Recursive)
        .with_context(|| format!("Failed to watch {}", dir.display()))?;

    println!(
        "Watching {} for changes... (Press Ctrl+C to stop)",
        dir.display()
    );

    let mut pending: Vec<PathBuf> = Vec::new();
    let mut last_event = Instant::now();
    let debounce_duration = Duration::from_millis(100);

    loop {
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => {
                let paths = changed_paths(event);
                if !paths.is_empty() {
                    for path in paths {
                        if !pending.contains(&path) {
                            pending.push(path);
                        }
                    }
                    last_event = Instant::now();
                }
            }
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                // Report once the burst of events has settled
                if !pending.is_empty() && last_event.elapsed() >= debounce_duration {
                    let changed = std::mem::take(&mut pending);
                    report_changes(cache, &changed);
                }
            }
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                return Err(anyhow::anyhow!("File watcher disconnected"));
            }
        }
    }
}

/// Paths whose content an event may have changed
///
/// A rename counts for its destination: editors that save through a temp
/// file rename it over the edited file.
fn changed_paths(event: notify::Event) -> Vec<PathBuf> {
    use notify::event::{EventKind, ModifyKind, RenameMode};

    match event.kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.into_iter().last().into_iter().collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Vec::new(),
        EventKind::Modify(ModifyKind::Name(_))
        | EventKind::Modify(ModifyKind::Data(_))
        | EventKind::Modify(ModifyKind::Any)
        | EventKind::Create(_)
        | EventKind::Remove(_) => event.paths,
        _ => Vec::new(),
    }
}

fn report_changes(cache: &CompileCache, changed: &[PathBuf]) {
    for path in changed {
        println!("\nChanged: {}", path.display());
    }
    let affected = affected_files(cache, changed, true);
    info!("{} file(s) affected", affected.len());
    for path in &affected {
        if !changed.contains(path) {
            println!("  affects {}", path.display());
        }
    }
}
