//! Test server management.
//!
//! Spawns and manages egress-rotator instances for integration testing.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;

/// Knobs for one spawned instance.
pub struct ServerOptions {
    pub trace_url: String,
    /// Exit code of the VPN disconnect command.
    pub disconnect_exit: u8,
    pub api_key: Option<String>,
    /// Extra environment variables for the process.
    pub env: Vec<(String, String)>,
}

impl ServerOptions {
    pub fn new(trace_url: &str) -> Self {
        Self {
            trace_url: trace_url.to_string(),
            disconnect_exit: 0,
            api_key: None,
            env: Vec::new(),
        }
    }
}

/// A test server instance.
pub struct TestServer {
    child: Child,
    port: u16,
    data_dir: TempDir,
}

impl TestServer {
    /// Spawn a new test server with the given options.
    pub async fn spawn(options: ServerOptions) -> anyhow::Result<Self> {
        let data_dir = tempfile::tempdir()?;
        let port = free_port()?;
        let firewall_log = data_dir.path().join("firewall.log");

        let api_key = options
            .api_key
            .as_deref()
            .map(|key| format!("api_key = \"{key}\"\n"))
            .unwrap_or_default();

        let config_content = format!(
            r#"
[server]
listen = "127.0.0.1:{port}"
metrics_port = 0
{api_key}
[blacklist]
path = "{blacklist}"

[resolver]
trace_url = "{trace_url}"
timeout_secs = 2
attempts = 2
retry_delay_ms = 0

[vpn]
disconnect = ["sh", "-c", "exit {disconnect_exit}"]
connect = ["true"]
settle_delay_ms = 0
command_timeout_secs = 5

[firewall]
block = ["sh", "-c", "echo block {{ip}} >> {log}"]
check = []
unblock = ["sh", "-c", "echo unblock {{ip}} >> {log}"]
command_timeout_secs = 5

[rotation]
poll_attempts = 2
poll_interval_ms = 0
"#,
            blacklist = data_dir.path().join("blacklist.json").display(),
            trace_url = options.trace_url,
            disconnect_exit = options.disconnect_exit,
            log = firewall_log.display(),
        );

        let config_path = data_dir.path().join("rotator.toml");
        std::fs::write(&config_path, config_content)?;

        let mut command = Command::new(env!("CARGO_BIN_EXE_egress-rotator"));
        command.arg(&config_path);
        for var in [
            "ROTATOR_API_KEY",
            "ROTATOR_API_KEY_HEADER",
            "ROTATOR_PREFER_IPV4",
            "ROTATOR_LISTEN",
            "ROTATOR_BLACKLIST_FILE",
            "ROTATOR_TRACE_URL",
            "ROTATOR_METRICS_PORT",
        ] {
            command.env_remove(var);
        }
        command.envs(options.env);

        let server = Self {
            child: command.spawn()?,
            port,
            data_dir,
        };

        server.wait_until_ready().await?;
        Ok(server)
    }

    /// Wait until the server is accepting connections.
    async fn wait_until_ready(&self) -> anyhow::Result<()> {
        for _ in 0..50 {
            if tokio::net::TcpStream::connect(("127.0.0.1", self.port))
                .await
                .is_ok()
            {
                return Ok(());
            }
            sleep(Duration::from_millis(100)).await;
        }
        anyhow::bail!("Server failed to start within 5 seconds")
    }

    /// Base URL of the control API.
    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    pub fn blacklist_path(&self) -> PathBuf {
        self.data_dir.path().join("blacklist.json")
    }

    /// Lines the fake firewall commands have written so far.
    pub fn firewall_calls(&self) -> Vec<String> {
        read_lines(&self.data_dir.path().join("firewall.log"))
    }

    /// Send SIGTERM and wait for the process to exit.
    #[allow(dead_code)]
    pub async fn terminate(&mut self) -> anyhow::Result<ExitStatus> {
        let status = Command::new("kill")
            .args(["-TERM", &self.child.id().to_string()])
            .status()?;
        anyhow::ensure!(status.success(), "kill -TERM failed");

        for _ in 0..50 {
            if let Some(status) = self.child.try_wait()? {
                return Ok(status);
            }
            sleep(Duration::from_millis(100)).await;
        }
        anyhow::bail!("Server did not exit within 5 seconds of SIGTERM")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .map(|s| s.lines().map(str::to_string).collect())
        .unwrap_or_default()
}
