use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::time::Duration;

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

pub const RC_ENV_VAR: &str =
  "TASKDECKRC";
pub const DATA_ENV_VAR: &str =
  "TASKDECK_DATA";
const RC_FILE_NAME: &str =
  ".taskdeckrc";
const DEFAULT_DATA_DIR: &str =
  ".taskdeck";
const DEFAULT_AUTH_DELAY_MS: u64 =
  1000;

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let mut map = HashMap::new();
    map.insert(
      "data.location".to_string(),
      format!("~/{DEFAULT_DATA_DIR}")
    );
    map.insert(
      "color".to_string(),
      "on".to_string()
    );
    map.insert(
      "auth.delay_ms".to_string(),
      DEFAULT_AUTH_DELAY_MS.to_string()
    );

    Self {
      map,
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let rc = resolve_rc_path(
      rc_override
    )?;
    if let Some(path) = rc {
      info!(rc = %path.display(), "loading rc file");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no rc file found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> anyhow::Result<Option<bool>> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(key, v))
      .transpose()
  }

  /// Simulated latency of login and
  /// register.
  pub fn auth_delay(
    &self
  ) -> anyhow::Result<Duration> {
    let raw = self
      .get("auth.delay_ms")
      .unwrap_or_else(|| {
        DEFAULT_AUTH_DELAY_MS.to_string()
      });
    let millis: u64 = raw
      .trim()
      .parse()
      .with_context(|| {
        format!(
          "invalid auth.delay_ms: {raw}"
        )
      })?;
    Ok(Duration::from_millis(millis))
  }

  pub fn timezone(
    &self
  ) -> Option<String> {
    self.get("timezone")
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;
    self.parse_text(&text, &path)?;
    self
      .loaded_files
      .push(path);
    Ok(())
  }

  fn parse_text(
    &mut self,
    text: &str,
    origin: &Path
  ) -> anyhow::Result<()> {
    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let line = raw_line
        .split_once('#')
        .map(|(before, _)| before)
        .unwrap_or(raw_line)
        .trim();
      if line.is_empty() {
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            origin.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

/// `--data` wins, then `TASKDECK_DATA`,
/// then `data.location`.
#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Ok(env_dir) =
    std::env::var(DATA_ENV_VAR)
    && !env_dir.trim().is_empty()
  {
    PathBuf::from(env_dir)
  } else if let Some(cfg_value) =
    cfg.get("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var(RC_ENV_VAR)
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory; skipping rc file"
    );
    return Ok(None);
  };
  let candidate = home.join(RC_FILE_NAME);
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  Ok(home.join(DEFAULT_DATA_DIR))
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(
  key: &str,
  s: &str
) -> anyhow::Result<bool> {
  match s
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "1" | "y" | "yes" | "on"
    | "true" => Ok(true),
    | "0" | "n" | "no" | "off"
    | "false" => Ok(false),
    | other => {
      Err(anyhow!(
        "invalid {key} setting: {other}"
      ))
    }
  }
}

#[cfg(test)]
mod tests {
  use std::path::Path;
  use std::time::Duration;

  use tempfile::tempdir;

  use super::Config;

  #[test]
  fn defaults_cover_every_known_key() {
    let cfg = Config::default();
    assert_eq!(
      cfg.get_bool("color")
        .expect("bool"),
      Some(true)
    );
    assert_eq!(
      cfg.auth_delay().expect("delay"),
      Duration::from_millis(1000)
    );
    // Unset so the system zone applies.
    assert_eq!(cfg.timezone(), None);
  }

  #[test]
  fn rc_file_lines_and_overrides() {
    let temp = tempdir().expect("tempdir");
    let rc = temp.path().join("rc");
    std::fs::write(
      &rc,
      "# taskdeck settings\n\
       color = off\n\
       timezone = Europe/Berlin  # office\n\
       \n\
       auth.delay_ms=0\n"
    )
    .expect("write rc");

    let mut cfg = Config::load(Some(
      rc.as_path()
    ))
    .expect("load rc");
    assert_eq!(cfg.loaded_files, vec![
      rc.clone()
    ]);
    assert_eq!(
      cfg.get_bool("color")
        .expect("bool"),
      Some(false)
    );
    assert_eq!(
      cfg.timezone().as_deref(),
      Some("Europe/Berlin")
    );
    assert_eq!(
      cfg.auth_delay().expect("delay"),
      Duration::ZERO
    );

    cfg.apply_overrides(vec![(
      "rc.color".to_string(),
      "yes".to_string()
    )]);
    assert_eq!(
      cfg.get_bool("color")
        .expect("bool"),
      Some(true)
    );
  }

  #[test]
  fn malformed_lines_are_rejected() {
    let mut cfg = Config::default();
    assert!(
      cfg
        .parse_text(
          "color on",
          Path::new("inline")
        )
        .is_err()
    );

    cfg.apply_overrides(vec![(
      "color".to_string(),
      "sometimes".to_string()
    )]);
    assert!(cfg.get_bool("color").is_err());
  }
}
