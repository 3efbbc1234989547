use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Worker configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Product name, the first half of the generation name.
  pub product: String,
  /// Semantic version, the second half of the generation name.
  pub version: String,
  /// Application origin. Responses from this origin are "basic" and
  /// eligible for caching; everything else is opaque.
  pub origin: String,
  /// Resources seeded into every new generation at install.
  #[serde(default = "default_manifest")]
  pub manifest: Vec<String>,
  /// Document served when the network fails for an HTML request.
  #[serde(default = "default_offline_fallback")]
  pub offline_fallback: String,
  /// Endpoint queued commands are replayed against.
  #[serde(default = "default_command_endpoint")]
  pub command_endpoint: String,
  /// Cache database location (default: platform data dir).
  pub cache_path: Option<PathBuf>,
}

fn default_manifest() -> Vec<String> {
  ["/", "/index.html", "/manifest.json"]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_offline_fallback() -> String {
  "/index.html".to_string()
}

fn default_command_endpoint() -> String {
  "/api/helmet/command".to_string()
}

impl Config {
  /// The name of the generation this worker owns: `{product}-v{version}`.
  pub fn generation_name(&self) -> String {
    format!("{}-v{}", self.product, self.version)
  }

  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./helmsw.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/helmsw/config.yaml
  /// 4. ~/.config/helmsw/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/helmsw/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("helmsw.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("helmsw").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_generation_name_format() {
    let config: Config = serde_yaml::from_str(
      "product: jarvis-helmet\nversion: 1.0.0\norigin: http://localhost:8080\n",
    )
    .unwrap();
    assert_eq!(config.generation_name(), "jarvis-helmet-v1.0.0");
  }

  #[test]
  fn test_defaults_fill_optional_fields() {
    let config: Config =
      serde_yaml::from_str("product: helmet\nversion: 2.1.0\norigin: http://localhost:8080\n")
        .unwrap();
    assert_eq!(config.manifest, vec!["/", "/index.html", "/manifest.json"]);
    assert_eq!(config.offline_fallback, "/index.html");
    assert_eq!(config.command_endpoint, "/api/helmet/command");
    assert!(config.cache_path.is_none());
  }

  #[test]
  fn test_explicit_fields_override_defaults() {
    let config: Config = serde_yaml::from_str(
      "product: helmet\n\
       version: 2.1.0\n\
       origin: http://localhost:8080\n\
       manifest: [/, /app.html]\n\
       offline_fallback: /app.html\n",
    )
    .unwrap();
    assert_eq!(config.manifest, vec!["/", "/app.html"]);
    assert_eq!(config.offline_fallback, "/app.html");
  }
}
