use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    #[serde(alias = "url")]
    pub server: Option<String>,
    pub no_color: Option<bool>,
    pub export_dir: Option<String>,
    pub verbose: Option<u8>,
}

const CONFIG_DIR: &str = ".hospdir";
const CONFIG_FILE: &str = "config.yml";

/// `~/.hospdir/config.yml`, when a home directory can be determined.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR).join(CONFIG_FILE))
}

/// Resolves a leading `~` against the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    expand_with_home(path, dirs::home_dir().as_deref())
}

fn expand_with_home(path: &str, home: Option<&Path>) -> PathBuf {
    match (path, home) {
        ("~", Some(home)) => home.to_path_buf(),
        (_, Some(home)) => match path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
            Some(rest) => home.join(rest),
            None => PathBuf::from(path),
        },
        (_, None) => PathBuf::from(path),
    }
}

/// Reads the YAML config. A missing file yields the defaults only when the
/// path was not asked for explicitly; an empty file always does.
pub fn load_config(path: &Path, allow_missing: bool) -> Result<ConfigFile, String> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return if allow_missing {
                Ok(ConfigFile::default())
            } else {
                Err(format!("config file not found '{}'", path.display()))
            };
        }
        Err(e) => return Err(format!("failed to read config '{}': {e}", path.display())),
    };
    if contents.trim().is_empty() {
        return Ok(ConfigFile::default());
    }
    serde_yaml::from_str(&contents)
        .map_err(|e| format!("failed to parse config '{}': {e}", path.display()))
}

fn default_config_yaml() -> String {
    r#"# hospdir config
#
# Location (default):
#   ~/.hospdir/config.yml

# Directory service
server: http://localhost:5000

# Where `export` writes moroccan_hospitals_<date>.json (defaults to the
# current directory)
# export_dir: ~/Downloads

# Output styling
no_color: false

# Log verbosity: 0 (off), 1 (info), 2 (debug), 3 (trace)
verbose: 0
"#
    .to_string()
}

pub fn ensure_default_config_file(path: &Path) -> Result<bool, String> {
    if path.exists() {
        return Ok(false);
    }
    let parent = path
        .parent()
        .ok_or_else(|| format!("invalid config path '{}'", path.display()))?;
    fs::create_dir_all(parent).map_err(|e| {
        format!(
            "failed to create config directory '{}': {e}",
            parent.display()
        )
    })?;
    let contents = default_config_yaml();
    fs::write(path, contents)
        .map_err(|e| format!("failed to write config file '{}': {e}", path.display()))?;
    Ok(true)
}
