use crate::config::{LoggingConfig, Section};
use std::{
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{filter::Targets, fmt};

use file_rotate::{
    compression::Compression,
    suffix::AppendCount,
    ContentLimit, FileRotate,
};

const DEFAULT_SECTION: &str = "default";
const DEFAULT_MAX_SIZE_MB: u64 = 100;
const DEFAULT_MAX_BACKUPS: usize = 3;

// -------- level helpers --------

/// Empty means "not set"; unknown names fall back to INFO.
fn parse_level(s: &str) -> Option<LevelFilter> {
    match s.trim().to_ascii_lowercase().as_str() {
        "" => None,
        "trace" => Some(LevelFilter::TRACE),
        "debug" => Some(LevelFilter::DEBUG),
        "info" => Some(LevelFilter::INFO),
        "warn" => Some(LevelFilter::WARN),
        "error" => Some(LevelFilter::ERROR),
        "off" | "none" => Some(LevelFilter::OFF),
        _ => Some(LevelFilter::INFO),
    }
}

/// Returns true if target == prefix or target starts with "prefix::"
fn matches_prefix(target: &str, prefix: &str) -> bool {
    target == prefix
        || (target.starts_with(prefix) && target[prefix.len()..].starts_with("::"))
}

// -------- rotating writer --------

#[derive(Clone)]
struct RotWriter(Arc<Mutex<FileRotate<AppendCount>>>);

impl Write for RotWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self.0.lock() {
            Ok(mut file) => file.write(buf),
            // a panicked writer loses the line, not the process
            Err(_) => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self.0.lock() {
            Ok(mut file) => file.flush(),
            Err(_) => Ok(()),
        }
    }
}

/// Resolve a log file path against `base_dir` (home_dir).
fn resolve_log_path(file: &str, base_dir: &Path) -> PathBuf {
    let p = Path::new(file);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base_dir.join(p)
    }
}

fn open_rotating(section: &Section, base_dir: &Path) -> std::io::Result<RotWriter> {
    let path = resolve_log_path(&section.file, base_dir);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let max_bytes = section.max_size_mb.unwrap_or(DEFAULT_MAX_SIZE_MB) * 1024 * 1024;
    let backups = section.max_backups.unwrap_or(DEFAULT_MAX_BACKUPS);

    let rot = FileRotate::new(
        &path,
        AppendCount::new(backups),
        ContentLimit::BytesSurpassed(max_bytes as usize),
        Compression::None,
        #[cfg(unix)]
        None,
    );
    Ok(RotWriter(Arc::new(Mutex::new(rot))))
}

// -------- file routing --------

/// Sends each record to the file of the longest matching target prefix,
/// or to the default file.
#[derive(Clone, Default)]
struct FileRouter {
    default: Option<RotWriter>,
    by_prefix: Vec<(String, RotWriter)>,
}

impl FileRouter {
    fn build(cfg: &LoggingConfig, base_dir: &Path) -> Self {
        let mut router = FileRouter::default();
        for (key, section) in cfg {
            if section.file.trim().is_empty() {
                continue;
            }
            match open_rotating(section, base_dir) {
                Ok(writer) if key == DEFAULT_SECTION => router.default = Some(writer),
                Ok(writer) => router.by_prefix.push((key.clone(), writer)),
                Err(e) => eprintln!(
                    "Failed to open log file '{}' for '{}': {}",
                    section.file, key, e
                ),
            }
        }
        // longest prefix first
        router
            .by_prefix
            .sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        router
    }

    fn is_empty(&self) -> bool {
        self.default.is_none() && self.by_prefix.is_empty()
    }

    fn route(&self, target: &str) -> Option<&RotWriter> {
        self.by_prefix
            .iter()
            .find(|(prefix, _)| matches_prefix(target, prefix))
            .map(|(_, w)| w)
            .or(self.default.as_ref())
    }
}

/// Writer that drops output when no file is routed.
struct Routed(Option<RotWriter>);

impl Write for Routed {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.0 {
            Some(w) => w.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.0 {
            Some(w) => w.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> fmt::MakeWriter<'a> for FileRouter {
    type Writer = Routed;

    fn make_writer(&'a self) -> Self::Writer {
        Routed(self.default.clone())
    }

    fn make_writer_for(&'a self, meta: &tracing::Metadata<'_>) -> Self::Writer {
        Routed(self.route(meta.target()).cloned())
    }
}

// -------- filters --------

fn prefix_sections(cfg: &LoggingConfig) -> impl Iterator<Item = (&String, &Section)> {
    cfg.iter().filter(|(k, _)| k.as_str() != DEFAULT_SECTION)
}

/// Console: default section level for everything, each prefix section
/// overriding its own targets.
fn console_targets(cfg: &LoggingConfig) -> Targets {
    let default = cfg
        .get(DEFAULT_SECTION)
        .and_then(|s| parse_level(&s.console_level))
        .unwrap_or(LevelFilter::INFO);
    prefix_sections(cfg).fold(Targets::new().with_default(default), |targets, (prefix, s)| {
        match parse_level(&s.console_level) {
            Some(level) => targets.with_target(prefix.clone(), level),
            None => targets,
        }
    })
}

/// Files: the default file takes everything at its level; a prefix
/// section with its own file or level overrides for its targets. With no
/// default file, only prefixes that own a file are written.
fn file_targets(cfg: &LoggingConfig, router: &FileRouter) -> Targets {
    let default = match (router.default.is_some(), cfg.get(DEFAULT_SECTION)) {
        (true, Some(s)) => parse_level(&s.file_level).unwrap_or(LevelFilter::DEBUG),
        _ => LevelFilter::OFF,
    };
    prefix_sections(cfg).fold(Targets::new().with_default(default), |targets, (prefix, s)| {
        let owns_file = router.by_prefix.iter().any(|(p, _)| p == prefix);
        let level = match parse_level(&s.file_level) {
            Some(level) if owns_file || router.default.is_some() => level,
            None if owns_file => LevelFilter::DEBUG,
            _ => return targets,
        };
        targets.with_target(prefix.clone(), level)
    })
}

// -------- public init --------

/// Initialize logging from a configuration.
/// - `cfg`: sections keyed by target prefix, plus the "default" catch-all
/// - `base_dir`: resolves relative log file paths (the normalized home_dir)
///
/// Safe to call more than once; only the first subscriber is installed.
pub fn init_logging_from_config(cfg: &LoggingConfig, base_dir: &Path) {
    use tracing_subscriber::{layer::SubscriberExt, prelude::*, Registry};

    // Bridge `log` → `tracing` *before* installing the subscriber
    let _ = tracing_log::LogTracer::init();

    let ansi = atty::is(atty::Stream::Stdout);
    let console = fmt::layer()
        .with_ansi(ansi)
        .with_target(true)
        .with_level(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_filter(console_targets(cfg));

    let router = FileRouter::build(cfg, base_dir);
    let file = if router.is_empty() {
        None
    } else {
        let targets = file_targets(cfg, &router);
        Some(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_target(true)
                .with_level(true)
                .with_timer(fmt::time::UtcTime::rfc_3339())
                .with_writer(router)
                .with_filter(targets),
        )
    };

    let _ = Registry::default().with(console).with(file).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_logging_config;
    use tempfile::tempdir;
    use tracing::Level;

    fn section(console: &str, file: &str, file_level: &str) -> Section {
        Section {
            console_level: console.into(),
            file: file.into(),
            file_level: file_level.into(),
            max_backups: Some(2),
            max_size_mb: Some(1),
        }
    }

    fn enabled(targets: &Targets, target: &str, level: Level) -> bool {
        targets.would_enable(target, &level)
    }

    #[test]
    fn test_level_parsing() {
        assert_eq!(parse_level("trace"), Some(LevelFilter::TRACE));
        assert_eq!(parse_level("DEBUG"), Some(LevelFilter::DEBUG));
        assert_eq!(parse_level(" Info "), Some(LevelFilter::INFO));
        assert_eq!(parse_level("warn"), Some(LevelFilter::WARN));
        assert_eq!(parse_level("ERROR"), Some(LevelFilter::ERROR));
        assert_eq!(parse_level("off"), Some(LevelFilter::OFF));
        assert_eq!(parse_level("none"), Some(LevelFilter::OFF));
        assert_eq!(parse_level(""), None);
        assert_eq!(parse_level("loud"), Some(LevelFilter::INFO));
    }

    #[test]
    fn test_prefix_matching_respects_path_segments() {
        assert!(matches_prefix("modtree", "modtree"));
        assert!(matches_prefix("modtree::module", "modtree"));
        assert!(!matches_prefix("modtree_server", "modtree"));
    }

    #[test]
    fn test_console_targets_default_and_overrides() {
        let mut cfg = default_logging_config();
        cfg.insert("modtree::dispatch".into(), section("trace", "", ""));
        cfg.insert("noisy".into(), section("off", "", ""));

        let targets = console_targets(&cfg);
        assert!(enabled(&targets, "modtree_server", Level::INFO));
        assert!(!enabled(&targets, "modtree_server", Level::DEBUG));
        assert!(enabled(&targets, "modtree::dispatch", Level::TRACE));
        assert!(!enabled(&targets, "noisy::inner", Level::ERROR));
    }

    #[test]
    fn test_file_router_prefers_longest_prefix() {
        let tmp = tempdir().unwrap();
        let mut cfg = LoggingConfig::new();
        cfg.insert("default".into(), section("info", "logs/all.log", "debug"));
        cfg.insert("modtree".into(), section("info", "logs/tree.log", "debug"));
        cfg.insert("modtree::dispatch".into(), section("info", "logs/dispatch.log", "trace"));

        let router = FileRouter::build(&cfg, tmp.path());

        let pick = |target: &str| {
            let w = router.route(target).unwrap();
            if Arc::ptr_eq(&w.0, &router.default.as_ref().unwrap().0) {
                "default".to_string()
            } else {
                router
                    .by_prefix
                    .iter()
                    .find(|(_, x)| Arc::ptr_eq(&x.0, &w.0))
                    .map(|(p, _)| p.clone())
                    .unwrap()
            }
        };
        assert_eq!(pick("modtree::dispatch"), "modtree::dispatch");
        assert_eq!(pick("modtree::module"), "modtree");
        assert_eq!(pick("other"), "default");
        assert!(tmp.path().join("logs").is_dir());
    }

    #[test]
    fn test_file_targets_without_default_file() {
        let tmp = tempdir().unwrap();
        let mut cfg = LoggingConfig::new();
        cfg.insert("default".into(), section("info", "", "debug"));
        cfg.insert("modtree".into(), section("info", "logs/tree.log", ""));

        let router = FileRouter::build(&cfg, tmp.path());
        let targets = file_targets(&cfg, &router);

        assert!(enabled(&targets, "modtree::module", Level::DEBUG));
        assert!(!enabled(&targets, "other", Level::ERROR));
    }

    #[test]
    fn test_file_paths_resolved_against_home_dir() {
        let tmp = tempdir().unwrap();
        let resolved = resolve_log_path("logs/test.log", tmp.path());
        assert!(resolved.starts_with(tmp.path()));
        assert!(resolved.ends_with("logs/test.log"));

        let abs = tmp.path().join("abs.log");
        assert_eq!(resolve_log_path(abs.to_str().unwrap(), Path::new("/elsewhere")), abs);
    }

    #[test]
    fn test_rotating_writer_creates_parent_and_writes() {
        let tmp = tempdir().unwrap();
        let s = section("info", "nested/dir/app.log", "debug");

        let mut w = open_rotating(&s, tmp.path()).unwrap();
        w.write_all(b"hello\n").unwrap();
        w.flush().unwrap();

        let written = std::fs::read_to_string(tmp.path().join("nested/dir/app.log")).unwrap();
        assert_eq!(written, "hello\n");
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        let tmp = tempdir().unwrap();
        let cfg = default_logging_config();
        init_logging_from_config(&cfg, tmp.path());
        init_logging_from_config(&cfg, tmp.path());
        tracing::info!("logging initialized");
    }
}
