use std::path::{Path, PathBuf};

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "dapdrive.toml";

/// Per-user config directory (`~/.config/dapdrive`), if a home directory
/// can be determined.
pub fn user_config_dir() -> Option<PathBuf> {
    dirs::home_dir()
        .or_else(|| std::env::var_os("HOME").map(PathBuf::from))
        .map(|home| home.join(".config").join("dapdrive"))
}

/// Places searched for a config file, most specific first.
pub fn config_candidates(cwd: &Path, user_dir: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = vec![cwd.join(LOCAL_CONFIG_FILE)];
    if let Some(dir) = user_dir {
        candidates.push(dir.join("config.toml"));
    }
    candidates
}

/// Pick the config file to load: an explicit path always wins, otherwise
/// the first existing candidate. Falls back to the local file name so the
/// caller reports a useful "not found" path.
pub fn resolve_config_path(explicit: Option<&Path>, cwd: &Path) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    let user_dir = user_config_dir();
    config_candidates(cwd, user_dir.as_deref())
        .into_iter()
        .find(|p| p.is_file())
        .unwrap_or_else(|| cwd.join(LOCAL_CONFIG_FILE))
}
