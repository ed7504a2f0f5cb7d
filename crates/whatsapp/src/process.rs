//! Supervision of the Node.js sidecar hosting the WhatsApp Web client.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use {
    anyhow::{Context, Result, bail},
    tokio::{
        io::{AsyncBufReadExt, BufReader},
        process::{Child, Command},
    },
    tracing::{debug, error, info, warn},
};

use crate::sidecar::DEFAULT_SIDECAR_PORT;

/// Directory name of the bundled sidecar.
const SIDECAR_DIR_NAME: &str = "sidecar/whatsapp-web";

/// Grace period between SIGTERM and kill.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to a running sidecar process.
pub struct SidecarProcess {
    child: Child,
    port: u16,
}

impl SidecarProcess {
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether the process is still alive.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Stop the process: SIGTERM first, kill if it outlives [`STOP_TIMEOUT`].
    pub async fn stop(&mut self) -> Result<()> {
        info!("stopping WhatsApp sidecar");

        #[cfg(unix)]
        {
            use nix::{
                sys::signal::{Signal, kill},
                unistd::Pid,
            };

            if let Some(pid) = self.child.id()
                && let Ok(pid) = i32::try_from(pid)
            {
                let _ = kill(Pid::from_raw(pid), Signal::SIGTERM);
            }
        }

        #[cfg(not(unix))]
        {
            let _ = self.child.kill().await;
        }

        match tokio::time::timeout(STOP_TIMEOUT, self.child.wait()).await {
            Ok(Ok(status)) => info!(?status, "WhatsApp sidecar exited"),
            Ok(Err(e)) => warn!(error = %e, "error waiting for sidecar"),
            Err(_) => {
                warn!("sidecar did not exit in time, killing");
                self.child.kill().await.context("failed to kill sidecar")?;
            },
        }
        Ok(())
    }
}

/// How to start the sidecar.
#[derive(Debug, Clone)]
pub struct SidecarConfig {
    /// Directory containing the sidecar's `package.json`.
    pub sidecar_dir: PathBuf,
    pub port: u16,
    /// Where the WhatsApp Web session is persisted.
    pub auth_dir: Option<PathBuf>,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            sidecar_dir: PathBuf::new(),
            port: DEFAULT_SIDECAR_PORT,
            auth_dir: None,
        }
    }
}

/// Locate the sidecar directory.
///
/// Searches in order:
/// 1. `explicit` if given
/// 2. `COURIER_WHATSAPP_SIDECAR_DIR`
/// 3. Next to the executable (`../sidecar/whatsapp-web`, then `../../…` for
///    `cargo run`)
/// 4. Relative to the working directory
pub fn find_sidecar_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    find_sidecar_dir_with(explicit, std::env::var("COURIER_WHATSAPP_SIDECAR_DIR").ok())
}

fn find_sidecar_dir_with(explicit: Option<&Path>, env_dir: Option<String>) -> Result<PathBuf> {
    let has_manifest = |p: &Path| p.join("package.json").exists();

    if let Some(path) = explicit {
        if has_manifest(path) {
            return Ok(path.to_path_buf());
        }
        bail!("no package.json in sidecar directory {}", path.display());
    }

    if let Some(dir) = env_dir {
        let path = PathBuf::from(&dir);
        if has_manifest(&path) {
            return Ok(path);
        }
        warn!(path = %dir, "COURIER_WHATSAPP_SIDECAR_DIR set but package.json not found");
    }

    if let Ok(exe) = std::env::current_exe()
        && let Some(exe_dir) = exe.parent()
    {
        for up in ["..", "../.."] {
            let candidate = exe_dir.join(up).join(SIDECAR_DIR_NAME);
            if has_manifest(&candidate) {
                return Ok(candidate);
            }
        }
    }

    for prefix in [".", "..", "../.."] {
        let candidate = Path::new(prefix).join(SIDECAR_DIR_NAME);
        if has_manifest(&candidate) {
            return Ok(candidate.canonicalize().unwrap_or(candidate));
        }
    }

    bail!(
        "WhatsApp sidecar not found. Set COURIER_WHATSAPP_SIDECAR_DIR or run from a checkout \
         containing {SIDECAR_DIR_NAME}/package.json"
    )
}

/// Spawn the sidecar, installing its npm dependencies first if needed.
pub async fn start_sidecar(config: SidecarConfig) -> Result<SidecarProcess> {
    let dir = &config.sidecar_dir;
    if !dir.join("package.json").exists() {
        bail!("WhatsApp sidecar not found at {}", dir.display());
    }

    if !dir.join("node_modules").exists() {
        run_npm_install(dir).await?;
    }

    info!(path = %dir.display(), port = config.port, "starting WhatsApp sidecar");

    let mut cmd = Command::new("node");
    cmd.arg("index.js")
        .current_dir(dir)
        .env("COURIER_WHATSAPP_PORT", config.port.to_string())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(auth_dir) = &config.auth_dir {
        cmd.env("COURIER_WHATSAPP_AUTH_DIR", auth_dir);
    }

    let mut child = cmd.spawn().context("failed to spawn sidecar")?;

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                forward_log_line(&line);
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                warn!(target: "whatsapp_sidecar", "{line}");
            }
        });
    }

    // Catch immediate crashes (missing node, syntax errors).
    tokio::time::sleep(Duration::from_millis(500)).await;
    if let Some(status) = child
        .try_wait()
        .context("failed to check sidecar status")?
    {
        bail!("sidecar exited immediately with status {status}");
    }

    info!(port = config.port, "WhatsApp sidecar started");
    Ok(SidecarProcess {
        child,
        port: config.port,
    })
}

/// Re-emit a sidecar stdout line through tracing. JSON lines carry a
/// pino-style numeric `level`.
fn forward_log_line(line: &str) {
    match parse_log_line(line) {
        Some((level, msg)) => match level {
            10 | 20 => debug!(target: "whatsapp_sidecar", "{msg}"),
            30 => info!(target: "whatsapp_sidecar", "{msg}"),
            40 => warn!(target: "whatsapp_sidecar", "{msg}"),
            _ => error!(target: "whatsapp_sidecar", "{msg}"),
        },
        None => info!(target: "whatsapp_sidecar", "{line}"),
    }
}

fn parse_log_line(line: &str) -> Option<(u64, String)> {
    if !line.starts_with('{') {
        return None;
    }
    let log: serde_json::Value = serde_json::from_str(line).ok()?;
    let level = log.get("level").and_then(|v| v.as_u64()).unwrap_or(30);
    let msg = log.get("msg").and_then(|v| v.as_str()).unwrap_or(line);
    Some((level, msg.to_string()))
}

async fn run_npm_install(dir: &Path) -> Result<()> {
    info!(path = %dir.display(), "running npm install for sidecar");
    let output = Command::new("npm")
        .arg("install")
        .arg("--omit=dev")
        .current_dir(dir)
        .output()
        .await
        .context("failed to run npm install")?;
    if !output.status.success() {
        bail!(
            "npm install failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(())
}
