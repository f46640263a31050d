use anyhow::{Context, Result};
use modtree::config::{deep_merge, ModuleConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::paths::resolve_home_dir;

/// Application configuration: process-wide settings plus the configuration
/// of the root module, which nests every child module.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Base directory for relative log paths; normalized to an absolute path.
    #[serde(default)]
    pub home_dir: String,
    /// Id of the root module.
    #[serde(default = "default_root_id")]
    pub root_id: String,
    /// Logging configuration (optional, uses defaults if None).
    pub logging: Option<LoggingConfig>,
    /// Directory of `<child id>.yaml` files merged into `app.modules` (optional).
    #[serde(default)]
    pub modules_dir: Option<String>,
    /// Root module configuration.
    #[serde(default)]
    pub app: ModuleConfig,
}

/// Logging configuration - maps target prefixes to their logging settings.
/// Key "default" is the catch-all for logs that don't match explicit prefixes.
pub type LoggingConfig = HashMap<String, Section>;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Section {
    pub console_level: String, // "info", "debug", "error", "off"
    #[serde(default)]
    pub file: String, // "logs/modtree.log"; empty disables the file
    #[serde(default)]
    pub file_level: String,
    #[serde(default)]
    pub max_backups: Option<usize>, // How many rotated files to keep
    #[serde(default)]
    pub max_size_mb: Option<u64>, // Max size of the file in MB
}

fn default_root_id() -> String {
    modtree::module::DEFAULT_ROOT_ID.to_string()
}

const DEFAULT_SUBDIR: &str = ".modtree";

/// Create a default logging configuration.
pub fn default_logging_config() -> LoggingConfig {
    let mut logging = HashMap::new();
    logging.insert(
        "default".to_string(),
        Section {
            console_level: "info".to_string(),
            file: "logs/modtree.log".to_string(),
            file_level: "debug".to_string(),
            max_backups: Some(3),
            max_size_mb: Some(100),
        },
    );
    logging
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            // Empty => platform default: $HOME/.modtree or %APPDATA%/.modtree
            home_dir: String::new(),
            root_id: default_root_id(),
            logging: Some(default_logging_config()),
            modules_dir: None,
            app: ModuleConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration with layered loading: defaults → YAML file → environment variables.
    /// Also normalizes `home_dir` into an absolute path and creates the directory.
    pub fn load_layered<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        use figment::{
            providers::{Env, Format, Serialized, Yaml},
            Figment,
        };

        let path = config_path.as_ref();
        anyhow::ensure!(path.is_file(), "config file not found: {}", path.display());

        // Optional sections stay None unless provided by YAML/ENV.
        let base = AppConfig {
            logging: None,
            ..AppConfig::default()
        };

        let figment = Figment::new()
            .merge(Serialized::defaults(base))
            .merge(Yaml::file(path))
            // Example: APP__ROOT_ID=shop maps to root_id
            .merge(env_provider());

        let mut config: AppConfig = figment
            .extract()
            .with_context(|| format!("Failed to extract config from {}", path.display()))?;

        // figment dictionaries are sorted; declaration order of components
        // and child modules is significant, so rebuild `app` from the file.
        let mut app = ordered_app_section(path)?;
        if let Ok(overlay) = Figment::from(env_provider()).extract_inner::<Value>("app") {
            deep_merge(&mut app, overlay);
        }
        config.app = serde_json::from_value(app).context("Invalid 'app' section")?;

        normalize_home_dir_inplace(&mut config).context("Failed to resolve home_dir")?;

        if let Some(dir) = config.modules_dir.clone() {
            merge_module_files(&mut config.app, dir)?;
        }

        Ok(config)
    }

    /// Load configuration from file or create with default values.
    /// Also normalizes `home_dir` into an absolute path and creates the directory.
    pub fn load_or_default<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_layered(path),
            None => {
                let mut c = Self::default();
                normalize_home_dir_inplace(&mut c)
                    .context("Failed to resolve home_dir (defaults)")?;
                Ok(c)
            }
        }
    }

    /// Serialize configuration to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config to YAML")
    }

    /// Apply overrides from command line arguments.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        let logging = self.logging.get_or_insert_with(default_logging_config);
        if let Some(default_section) = logging.get_mut("default") {
            default_section.console_level = match args.verbose {
                0 => default_section.console_level.clone(), // keep
                1 => "debug".to_string(),
                _ => "trace".to_string(),
            };
        }
    }
}

/// Command line arguments relevant to configuration.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config: Option<String>,
    pub print_config: bool,
    pub verbose: u8,
}

fn env_provider() -> figment::providers::Env {
    figment::providers::Env::prefixed("APP__").split("__")
}

/// The `app` subtree of the YAML file with its key order intact.
fn ordered_app_section(path: &Path) -> Result<Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let doc: Value = serde_yaml::from_str(&raw)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(match doc.get("app") {
        Some(app @ Value::Object(_)) => app.clone(),
        _ => Value::Object(Default::default()),
    })
}

/// Normalize `home_dir` using `resolve_home_dir` and store the absolute path back.
fn normalize_home_dir_inplace(config: &mut AppConfig) -> Result<()> {
    // Treat empty string as "not provided" => None.
    let opt = if config.home_dir.trim().is_empty() {
        None
    } else {
        Some(config.home_dir.clone())
    };

    let resolved: PathBuf =
        resolve_home_dir(opt, DEFAULT_SUBDIR, /*create*/ true).context("home_dir normalization failed")?;

    config.home_dir = resolved.to_string_lossy().to_string();
    Ok(())
}

/// Each `<id>.yaml` in `dir` becomes (or is merged under) child module `<id>`
/// of the root. Files are applied in name order; inline config wins.
fn merge_module_files(app: &mut ModuleConfig, dir: impl AsRef<Path>) -> Result<()> {
    use std::fs;
    let dir = dir.as_ref();
    if !dir.exists() {
        return Ok(());
    }
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|s| s.to_str())
                .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "yml" | "yaml"))
                .unwrap_or(false)
        })
        .collect();
    files.sort();

    for path in files {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_string();
        let raw = fs::read_to_string(&path)?;
        let mut value: Value = serde_yaml::from_str(&raw)
            .with_context(|| format!("Failed to parse module file {}", path.display()))?;
        if let Some(inline) = app.modules.get(&name) {
            deep_merge(&mut value, inline.clone());
        }
        app.modules.insert(name, value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    /// Helper: a normalized home_dir should be absolute and not start with '~'.
    fn is_normalized_path(p: &str) -> bool {
        let pb = PathBuf::from(p);
        pb.is_absolute() && !p.starts_with('~')
    }

    fn write_config(dir: &Path, body: &str) -> PathBuf {
        let home = dir.join("home").to_string_lossy().replace('\\', "/");
        let path = dir.join("cfg.yaml");
        fs::write(&path, format!("home_dir: \"{home}\"\n{body}")).unwrap();
        path
    }

    #[test]
    fn test_default_config_structure() {
        let config = AppConfig::default();

        assert_eq!(config.home_dir, "");
        assert_eq!(config.root_id, "app");
        let logging = config.logging.as_ref().unwrap();
        let default_section = &logging["default"];
        assert_eq!(default_section.console_level, "info");
        assert_eq!(default_section.file, "logs/modtree.log");
        assert!(config.app.components.is_empty());
        assert!(config.app.modules.is_empty());
    }

    #[test]
    fn test_load_layered_keeps_declaration_order() {
        let tmp = tempdir().unwrap();
        let cfg_path = write_config(
            tmp.path(),
            r#"
root_id: shop
logging:
  default:
    console_level: debug
    file: "logs/default.log"
app:
  params:
    region: eu
  components:
    zeta: { class: memory_cache, ttl: 5 }
    alpha: { class: clock, depends: zeta }
    beta: false
  modules:
    orders: {}
    catalog:
      mountPath: /products
"#,
        );

        let config = AppConfig::load_layered(&cfg_path).unwrap();

        assert!(is_normalized_path(&config.home_dir));
        assert!(config.home_dir.ends_with("home"));
        assert_eq!(config.root_id, "shop");
        let components: Vec<&str> = config.app.components.keys().map(String::as_str).collect();
        assert_eq!(components, vec!["zeta", "alpha", "beta"]);
        let modules: Vec<&str> = config.app.modules.keys().map(String::as_str).collect();
        assert_eq!(modules, vec!["orders", "catalog"]);
        assert_eq!(config.app.params["region"], "eu");

        let logging = config.logging.as_ref().unwrap();
        assert_eq!(logging["default"].console_level, "debug");
        assert_eq!(logging["default"].file, "logs/default.log");
    }

    #[test]
    fn test_minimal_yaml_config() {
        let tmp = tempdir().unwrap();
        let cfg_path = write_config(tmp.path(), "");

        let config = AppConfig::load_layered(&cfg_path).unwrap();

        assert_eq!(config.root_id, "app");
        assert!(config.logging.is_none());
        assert_eq!(config.app, ModuleConfig::default());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let tmp = tempdir().unwrap();
        let err = AppConfig::load_layered(tmp.path().join("nope.yaml")).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn test_unknown_top_level_key_is_rejected() {
        let tmp = tempdir().unwrap();
        let cfg_path = write_config(tmp.path(), "server:\n  port: 1\n");
        assert!(AppConfig::load_layered(&cfg_path).is_err());
    }

    #[test]
    fn test_load_or_default_without_file() {
        let config = AppConfig::load_or_default(None::<&str>).unwrap();
        assert!(is_normalized_path(&config.home_dir));
        assert!(config.home_dir.ends_with(DEFAULT_SUBDIR));
        assert!(config.logging.is_some());
    }

    #[test]
    fn test_cli_verbose_levels_matrix() {
        for (verbose_level, expected_log_level) in [
            (0, "info"), // unchanged from default
            (1, "debug"),
            (2, "trace"),
            (3, "trace"), // cap at trace
        ] {
            let mut config = AppConfig::default();
            let args = CliArgs {
                verbose: verbose_level,
                ..CliArgs::default()
            };

            config.apply_cli_overrides(&args);

            let logging = config.logging.as_ref().unwrap();
            assert_eq!(logging["default"].console_level, expected_log_level);
        }
    }

    #[test]
    fn test_cli_overrides_create_logging_when_absent() {
        let mut config = AppConfig {
            logging: None,
            ..AppConfig::default()
        };
        config.apply_cli_overrides(&CliArgs {
            verbose: 1,
            ..CliArgs::default()
        });
        assert_eq!(config.logging.unwrap()["default"].console_level, "debug");
    }

    #[test]
    fn test_modules_dir_files_become_child_modules() {
        let tmp = tempdir().unwrap();
        let modules_dir = tmp.path().join("modules");
        fs::create_dir_all(&modules_dir).unwrap();
        fs::write(
            modules_dir.join("billing.yaml"),
            "components:\n  ledger: { class: memory_cache }\nparams:\n  currency: EUR\n",
        )
        .unwrap();
        fs::write(modules_dir.join("notes.txt"), "ignored").unwrap();

        let modules_dir_str = modules_dir.to_string_lossy().replace('\\', "/");
        let cfg_path = write_config(
            tmp.path(),
            &format!(
                r#"
modules_dir: "{modules_dir_str}"
app:
  modules:
    billing:
      params:
        currency: USD
"#
            ),
        );

        let config = AppConfig::load_layered(&cfg_path).unwrap();

        let billing = &config.app.modules["billing"];
        assert_eq!(billing["components"]["ledger"]["class"], "memory_cache");
        // inline config wins over the file
        assert_eq!(billing["params"]["currency"], "USD");
        assert!(!config.app.modules.contains_key("notes"));
    }

    #[test]
    fn test_to_yaml_roundtrip_basic() {
        let mut config = AppConfig::default();
        config.app = ModuleConfig::new().param("region", serde_json::json!("eu"));
        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("logging:"));
        assert!(yaml.contains("app:"));

        let roundtrip: AppConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(roundtrip.root_id, config.root_id);
        assert_eq!(roundtrip.app, config.app);
    }
}
