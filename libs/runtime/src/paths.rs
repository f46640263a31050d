use std::env;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HomeDirError {
    #[error("cannot determine the user home directory ({0} is not set)")]
    NoHome(&'static str),
    #[error("cannot create home directory '{path}'")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot resolve relative home directory '{0}'")]
    Relative(String),
}

#[cfg(windows)]
const HOME_VAR: &str = "APPDATA";
#[cfg(not(windows))]
const HOME_VAR: &str = "HOME";

fn user_home() -> Result<PathBuf, HomeDirError> {
    env::var_os(HOME_VAR)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .ok_or(HomeDirError::NoHome(HOME_VAR))
}

/// Resolve the application home directory to an absolute path.
///
/// - `None`: `<user home>/<default_subdir>` (`$HOME` on Unix, `%APPDATA%` on Windows)
/// - `~` / `~/x`: expanded against the user home
/// - relative paths: joined with the current directory
pub fn resolve_home_dir(
    configured: Option<String>,
    default_subdir: &str,
    create: bool,
) -> Result<PathBuf, HomeDirError> {
    let path = match configured.as_deref() {
        None => user_home()?.join(default_subdir),
        Some("~") => user_home()?,
        Some(p) if p.starts_with("~/") || p.starts_with("~\\") => user_home()?.join(&p[2..]),
        Some(p) if Path::new(p).is_absolute() => PathBuf::from(p),
        Some(p) => env::current_dir()
            .map_err(|_| HomeDirError::Relative(p.to_string()))?
            .join(p),
    };

    if create {
        std::fs::create_dir_all(&path).map_err(|source| HomeDirError::Create {
            path: path.clone(),
            source,
        })?;
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn absolute_paths_are_kept_and_created() {
        let tmp = tempdir().unwrap();
        let target = tmp.path().join("nested/home");
        let resolved =
            resolve_home_dir(Some(target.to_string_lossy().to_string()), ".modtree", true).unwrap();
        assert_eq!(resolved, target);
        assert!(target.is_dir());
    }

    #[test]
    fn tilde_expands_against_user_home() {
        let home = user_home().unwrap();
        let resolved = resolve_home_dir(Some("~/.modtree_test".into()), ".modtree", false).unwrap();
        assert_eq!(resolved, home.join(".modtree_test"));
    }

    #[test]
    fn missing_value_uses_default_subdir() {
        let resolved = resolve_home_dir(None, ".modtree", false).unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with(".modtree"));
    }
}
