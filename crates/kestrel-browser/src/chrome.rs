use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use crate::{Error, Result};

/// How kestrel launches Chrome for a session
#[derive(Debug, Clone)]
pub struct ChromeConfig {
    /// Explicit binary path; discovery runs when absent
    pub chrome_path: Option<PathBuf>,
    /// Run with a visible window instead of headless
    pub headed: bool,
    /// Persistent profile directory; a throwaway profile when absent
    pub profile_dir: Option<PathBuf>,
    pub debugging_port: u16,
}

impl Default for ChromeConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headed: false,
            profile_dir: None,
            debugging_port: 9222,
        }
    }
}

/// Locate a Chrome/Chromium binary: explicit path, then PATH lookup,
/// then platform-conventional locations.
pub fn find_chrome(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(Error::ChromeNotFound(format!(
            "no Chrome binary at {}",
            path.display()
        )));
    }

    for name in ["google-chrome", "chromium", "chromium-browser", "chrome"] {
        if let Ok(found) = which::which(name) {
            return Ok(found);
        }
    }

    for path in conventional_paths() {
        if path.exists() {
            return Ok(path);
        }
    }

    Err(Error::ChromeNotFound(
        "no Chrome or Chromium binary found; pass --chrome-path".to_string(),
    ))
}

fn conventional_paths() -> Vec<PathBuf> {
    #[cfg(target_os = "macos")]
    return vec![
        PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
        PathBuf::from("/Applications/Chromium.app/Contents/MacOS/Chromium"),
    ];

    #[cfg(target_os = "linux")]
    return vec![
        PathBuf::from("/usr/bin/google-chrome"),
        PathBuf::from("/usr/bin/chromium"),
        PathBuf::from("/usr/bin/chromium-browser"),
        PathBuf::from("/snap/bin/chromium"),
    ];

    #[cfg(target_os = "windows")]
    return vec![
        PathBuf::from(r"C:\Program Files\Google\Chrome\Application\chrome.exe"),
        PathBuf::from(r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe"),
    ];

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    return vec![];
}

enum Profile {
    Temporary(tempfile::TempDir),
    Persistent(PathBuf),
}

impl Profile {
    fn path(&self) -> &Path {
        match self {
            Profile::Temporary(dir) => dir.path(),
            Profile::Persistent(path) => path,
        }
    }
}

/// A running Chrome process owned by one kestrel session.
///
/// The process and any temporary profile are torn down on drop; sessions
/// never share a Chrome instance.
pub struct ChromeSession {
    child: Child,
    profile: Profile,
    debugging_port: u16,
}

impl ChromeSession {
    /// Launch Chrome per the config and return the running session
    pub fn launch(config: &ChromeConfig) -> Result<Self> {
        let binary = find_chrome(config.chrome_path.as_deref())?;

        let profile = match &config.profile_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                Profile::Persistent(dir.clone())
            }
            None => Profile::Temporary(tempfile::tempdir()?),
        };

        let args = build_args(config, profile.path());
        tracing::debug!("Launching {} {}", binary.display(), args.join(" "));

        let child = Command::new(&binary)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::Browser(format!("failed to launch Chrome: {}", e)))?;

        tracing::info!(
            pid = child.id(),
            port = config.debugging_port,
            "Chrome launched"
        );

        Ok(Self {
            child,
            profile,
            debugging_port: config.debugging_port,
        })
    }

    pub fn debugging_port(&self) -> u16 {
        self.debugging_port
    }

    pub fn profile_path(&self) -> &Path {
        self.profile.path()
    }

    /// Terminate the Chrome process
    pub fn kill(&mut self) {
        if let Err(e) = self.child.kill() {
            tracing::debug!("Chrome already exited: {}", e);
        }
        let _ = self.child.wait();
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        self.kill();
    }
}

fn build_args(config: &ChromeConfig, profile_path: &Path) -> Vec<String> {
    let mut args = vec![
        format!("--remote-debugging-port={}", config.debugging_port),
        format!("--user-data-dir={}", profile_path.display()),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--disable-background-networking".to_string(),
        "--disable-popup-blocking".to_string(),
    ];
    if !config.headed {
        args.push("--headless=new".to_string());
    }
    args.push("about:blank".to_string());
    args
}
