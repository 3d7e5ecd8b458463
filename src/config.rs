//! Configuration loading
//!
//! Settings come from `~/.config/scrape_to_md/config.yml` when it exists and
//! fall back to defaults rooted in the user's home directory otherwise.

use crate::error::{BrowserError, ConfigError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default Chrome DevTools Protocol port
pub const DEFAULT_CDP_PORT: u16 = 9222;

/// Default pause after DOM-ready before reading the page
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 2000;

/// Default navigation budget
pub const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 30_000;

const APP_DIR: &str = "scrape_to_md";

/// Commented template written by `scrape-to-md init`
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# scrape_to_md configuration

# Default output directory for scraped content
output_dir: ~/Documents/scraped

# Optional daemon configuration (defaults shown)
daemon:
  # Chrome DevTools Protocol port
  cdp_port: 9222

  # Chrome profile directory (maintains sessions/cookies)
  chrome_profile: ~/.local/share/scrape_to_md/chrome_profile

  # Log files directory
  logs_dir: ~/.local/share/scrape_to_md/logs

  # PID files directory
  pids_dir: ~/.local/share/scrape_to_md/pids

  # Unix socket path for daemon communication
  socket_path: ~/.local/share/scrape_to_md/chrome_scraper.sock

  # Pause after the page is DOM-ready, for client-side rendering
  settle_delay_ms: 2000

  # Navigation timeout
  navigation_timeout_ms: 30000

  # Explicit Chrome/Chromium executable (auto-detected when unset)
  # chrome_path: /usr/bin/google-chrome
"#;

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Where Markdown files are written
    pub output_dir: PathBuf,
    /// Daemon log directory
    pub logs_dir: PathBuf,
    /// Directory holding the daemon and browser PID files
    pub pids_dir: PathBuf,
    /// Persisted Chrome profile (cookies, logins)
    pub chrome_profile: PathBuf,
    /// Daemon Unix socket
    pub socket_path: PathBuf,
    /// Remote debugging port
    pub cdp_port: u16,
    /// Explicit browser executable
    pub chrome_path: Option<PathBuf>,
    /// Pause after DOM-ready in the daemon path
    pub settle_delay_ms: u64,
    /// Navigation budget for both scrape paths
    pub navigation_timeout_ms: u64,
}

/// Raw file layout, every key optional
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    output_dir: Option<String>,
    #[serde(default)]
    daemon: Option<DaemonSection>,
}

#[derive(Debug, Default, Deserialize)]
struct DaemonSection {
    logs_dir: Option<String>,
    pids_dir: Option<String>,
    chrome_profile: Option<String>,
    socket_path: Option<String>,
    cdp_port: Option<u16>,
    chrome_path: Option<String>,
    settle_delay_ms: Option<u64>,
    navigation_timeout_ms: Option<u64>,
}

/// Outcome of loading configuration, carrying a warning to log once
/// logging is initialized.
#[derive(Debug)]
pub struct LoadedConfig {
    /// Effective configuration
    pub config: Config,
    /// Set when the file existed but could not be used
    pub warning: Option<ConfigError>,
}

impl Config {
    /// Defaults rooted at `home`
    pub fn defaults_for_home(home: &Path) -> Self {
        let data_dir = home.join(".local").join("share").join(APP_DIR);
        Self {
            output_dir: home.join("Documents").join("scraped"),
            logs_dir: data_dir.join("logs"),
            pids_dir: data_dir.join("pids"),
            chrome_profile: data_dir.join("chrome_profile"),
            socket_path: data_dir.join("chrome_scraper.sock"),
            cdp_port: DEFAULT_CDP_PORT,
            chrome_path: None,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            navigation_timeout_ms: DEFAULT_NAVIGATION_TIMEOUT_MS,
        }
    }

    /// Path of the user-level config file under `home`
    pub fn file_path_for_home(home: &Path) -> PathBuf {
        home.join(".config").join(APP_DIR).join("config.yml")
    }

    /// Path of the user-level config file for the current user
    pub fn file_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(Self::file_path_for_home(&home))
    }

    /// Load configuration for the current user.
    pub fn load() -> Result<LoadedConfig> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(Self::load_for_home(&home))
    }

    /// Load configuration as if `home` were the user's home directory.
    ///
    /// A missing file yields defaults silently; an unreadable or malformed
    /// file yields defaults plus a warning.
    pub fn load_for_home(home: &Path) -> LoadedConfig {
        let defaults = Self::defaults_for_home(home);
        let path = Self::file_path_for_home(home);

        if !path.exists() {
            return LoadedConfig {
                config: defaults,
                warning: None,
            };
        }

        let parsed = std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|text| Self::parse_file(&text).map_err(|e| e.to_string()));

        match parsed {
            Ok(file) => LoadedConfig {
                config: defaults.overlay(file, home),
                warning: None,
            },
            Err(message) => LoadedConfig {
                config: defaults,
                warning: Some(ConfigError::Malformed {
                    path: path.display().to_string(),
                    message,
                }),
            },
        }
    }

    fn parse_file(text: &str) -> std::result::Result<FileConfig, serde_yaml::Error> {
        // An empty document deserializes to unit, not a mapping
        if text.trim().is_empty() {
            return Ok(FileConfig::default());
        }
        serde_yaml::from_str(text)
    }

    fn overlay(mut self, file: FileConfig, home: &Path) -> Self {
        if let Some(dir) = file.output_dir {
            self.output_dir = expand_tilde(&dir, home);
        }
        if let Some(daemon) = file.daemon {
            if let Some(v) = daemon.logs_dir {
                self.logs_dir = expand_tilde(&v, home);
            }
            if let Some(v) = daemon.pids_dir {
                self.pids_dir = expand_tilde(&v, home);
            }
            if let Some(v) = daemon.chrome_profile {
                self.chrome_profile = expand_tilde(&v, home);
            }
            if let Some(v) = daemon.socket_path {
                self.socket_path = expand_tilde(&v, home);
            }
            if let Some(v) = daemon.cdp_port {
                self.cdp_port = v;
            }
            if let Some(v) = daemon.chrome_path {
                self.chrome_path = Some(expand_tilde(&v, home));
            }
            if let Some(v) = daemon.settle_delay_ms {
                self.settle_delay_ms = v;
            }
            if let Some(v) = daemon.navigation_timeout_ms {
                self.navigation_timeout_ms = v;
            }
        }
        self
    }

    /// PID file of the daemon process
    pub fn daemon_pid_file(&self) -> PathBuf {
        self.pids_dir.join("chrome_service.pid")
    }

    /// PID file of the browser the daemon launched
    pub fn chrome_pid_file(&self) -> PathBuf {
        self.pids_dir.join("chrome_browser.pid")
    }

    /// Find the Chrome executable to launch.
    ///
    /// Order: configured path, per-platform install locations, then `PATH`.
    pub fn find_chrome_executable(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.chrome_path {
            if path.exists() {
                return Ok(path.clone());
            }
            return Err(BrowserError::ExecutableNotFound(path.display().to_string()).into());
        }

        let candidates = platform_chrome_paths();
        if let Some(found) = candidates.iter().map(PathBuf::from).find(|p| p.exists()) {
            return Ok(found);
        }

        const PATH_NAMES: [&str; 4] = [
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
        ];
        if let Some(found) = PATH_NAMES.iter().find_map(|name| which::which(name).ok()) {
            return Ok(found);
        }

        let searched: Vec<&str> = candidates.iter().copied().chain(PATH_NAMES).collect();
        Err(BrowserError::ExecutableNotFound(searched.join(", ")).into())
    }
}

fn platform_chrome_paths() -> &'static [&'static str] {
    if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ]
    } else if cfg!(target_os = "windows") {
        &[
            "C:\\Program Files\\Google\\Chrome\\Application\\chrome.exe",
            "C:\\Program Files (x86)\\Google\\Chrome\\Application\\chrome.exe",
            "C:\\Program Files\\Chromium\\Application\\chrome.exe",
        ]
    } else {
        &[
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
        ]
    }
}

/// Expand a leading `~` against `home`
pub fn expand_tilde(raw: &str, home: &Path) -> PathBuf {
    if raw == "~" {
        home.to_path_buf()
    } else if let Some(rest) = raw.strip_prefix("~/") {
        home.join(rest)
    } else {
        PathBuf::from(raw)
    }
}
