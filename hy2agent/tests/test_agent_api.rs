use std::{
    net::SocketAddr,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use hy2agent::{
    config::{AgentConfig, PolicyStore},
    runtime::{CommandOutput, DaemonBinary, DaemonInstaller, ServiceSupervisor},
    server::{self, AgentState},
    AgentResult,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::{fs, net::TcpListener};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const API_KEY_HEADER: &str = "X-API-Key";

const BANNER: &str = "Version:\tv2.5.2\nBuildDate:\t2024-10-05T10:00:00Z\nBuildType:\trelease\n\
                      Platform:\tlinux\nArchitecture:\tamd64\n";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A unit that is active exactly between `start` and `stop`.
#[derive(Default)]
struct ToggleUnit {
    active: AtomicBool,
}

struct InstalledBinary;

struct NoopInstaller;

struct Agent {
    base: String,
    home: TempDir,
    hysteria_dir: TempDir,
    client: reqwest::Client,
    api_key: String,
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[test_log::test(tokio::test)]
async fn test_fresh_home_generates_key_and_gates_requests() -> anyhow::Result<()> {
    let agent = Agent::spawn().await?;
    assert_eq!(agent.api_key.len(), 64);

    let response = agent
        .client
        .get(agent.url("/api/v1/config/whitelist"))
        .send()
        .await?;
    assert_eq!(response.status(), 401);

    let response = agent
        .client
        .get(agent.url("/api/v1/config/whitelist"))
        .header(API_KEY_HEADER, "not-the-key")
        .send()
        .await?;
    assert_eq!(response.status(), 401);

    let response = agent.get("/api/v1/config/whitelist").await?;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await?;
    assert_eq!(body["whitelist"], json!([]));

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_whitelist_update_locks_out_other_sources() -> anyhow::Result<()> {
    let agent = Agent::spawn().await?;

    let response = agent
        .put("/api/v1/config/whitelist", json!({ "ips": ["10.9.9.9"] }))
        .await?;
    assert_eq!(response.status(), 200);

    let persisted: Value = serde_json::from_slice(&fs::read(agent.policy_path()).await?)?;
    assert_eq!(persisted["ip_whitelist"], json!(["10.9.9.9"]));
    assert_eq!(persisted["api_key"], json!(agent.api_key));

    let response = agent.get("/api/v1/config/whitelist").await?;
    assert_eq!(response.status(), 403);

    // The persisted policy survives a reload.
    let reloaded = PolicyStore::load_from_home(agent.home.path()).await?;
    assert!(!reloaded.read().await.whitelist_is_empty());

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_service_lifecycle_round_trip() -> anyhow::Result<()> {
    let agent = Agent::spawn().await?;

    let status: Value = agent.get("/api/v1/hysteria/status").await?.json().await?;
    assert_eq!(status["is_installed"], json!(true));
    assert_eq!(status["is_running"], json!(false));
    assert_eq!(status["version"], json!("v2.5.2"));

    let response = agent.post("/api/v1/hysteria/start").await?;
    assert_eq!(response.status(), 200);

    let status: Value = agent.get("/api/v1/hysteria/status").await?.json().await?;
    assert_eq!(status["is_running"], json!(true));
    assert_eq!(status["service_status"], json!("running"));

    let response = agent.post("/api/v1/hysteria/stop").await?;
    assert_eq!(response.status(), 200);

    let status: Value = agent.get("/api/v1/hysteria/status").await?.json().await?;
    assert_eq!(status["is_running"], json!(false));

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_config_update_keeps_a_backup() -> anyhow::Result<()> {
    let agent = Agent::spawn().await?;
    let config_path = agent.hysteria_dir.path().join("config.yaml");
    fs::write(&config_path, "listen: :443\n").await?;

    let response = agent
        .put("/api/v1/hysteria/config", json!({ "config": "listen: :8443\n" }))
        .await?;
    assert_eq!(response.status(), 200);
    assert_eq!(fs::read_to_string(&config_path).await?, "listen: :8443\n");

    let body: Value = agent.get("/api/v1/hysteria/config/backups").await?.json().await?;
    let backups = body["backups"].as_array().cloned().unwrap_or_default();
    assert_eq!(backups.len(), 1);

    let name = backups[0].as_str().unwrap_or_default().to_string();
    assert!(name.starts_with("config.yaml.bak."));
    assert_eq!(
        fs::read_to_string(agent.hysteria_dir.path().join(&name)).await?,
        "listen: :443\n"
    );

    let response = agent
        .post_json("/api/v1/hysteria/config/restore", json!({ "backup": name }))
        .await?;
    assert_eq!(response.status(), 200);
    assert_eq!(fs::read_to_string(&config_path).await?, "listen: :443\n");

    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Agent {
    async fn spawn() -> anyhow::Result<Self> {
        let home = TempDir::new()?;
        let hysteria_dir = TempDir::new()?;

        let config = AgentConfig::builder()
            .home_dir(home.path())
            .hysteria_config_path(hysteria_dir.path().join("config.yaml"))
            .verify_delay(Duration::from_millis(10))
            .request_timeout(Duration::from_secs(5))
            .build();

        let policy = Arc::new(PolicyStore::load_or_init(config.policy_path()).await?);
        let api_key = policy.read().await.get_api_key().clone();

        let state = AgentState::with_host(
            &config,
            policy,
            Arc::new(ToggleUnit::default()),
            Arc::new(InstalledBinary),
            Arc::new(NoopInstaller),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr: SocketAddr = listener.local_addr()?;
        tokio::spawn(server::serve(listener, state));

        Ok(Self {
            base: format!("http://{}", addr),
            home,
            hysteria_dir,
            client: reqwest::Client::new(),
            api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn policy_path(&self) -> PathBuf {
        self.home.path().join("config.json")
    }

    async fn get(&self, path: &str) -> reqwest::Result<reqwest::Response> {
        self.client
            .get(self.url(path))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
    }

    async fn post(&self, path: &str) -> reqwest::Result<reqwest::Response> {
        self.client
            .post(self.url(path))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
    }

    async fn post_json(&self, path: &str, body: Value) -> reqwest::Result<reqwest::Response> {
        self.client
            .post(self.url(path))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await
    }

    async fn put(&self, path: &str, body: Value) -> reqwest::Result<reqwest::Response> {
        self.client
            .put(self.url(path))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl ServiceSupervisor for ToggleUnit {
    async fn status_report(&self) -> String {
        let active = if self.active.load(Ordering::SeqCst) {
            "active (running)"
        } else {
            "inactive (dead)"
        };

        format!(
            "● hysteria-server.service - Hysteria Server Service\n     \
             Loaded: loaded (/etc/systemd/system/hysteria-server.service; enabled)\n     \
             Active: {active} since Thu 2024-10-17 10:00:00 UTC\n"
        )
    }

    async fn is_active(&self) -> String {
        if self.active.load(Ordering::SeqCst) {
            "active".to_string()
        } else {
            "inactive".to_string()
        }
    }

    async fn start(&self) -> AgentResult<()> {
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> AgentResult<()> {
        self.active.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn restart(&self) -> AgentResult<()> {
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn enable(&self) -> AgentResult<()> {
        Ok(())
    }

    async fn journal(&self, args: &[String]) -> AgentResult<String> {
        Ok(args.join(" "))
    }
}

#[async_trait]
impl DaemonBinary for InstalledBinary {
    fn is_installed(&self) -> bool {
        true
    }

    async fn version_banner(&self) -> Option<String> {
        Some(BANNER.to_string())
    }
}

#[async_trait]
impl DaemonInstaller for NoopInstaller {
    async fn run(&self, _args: &[String]) -> AgentResult<CommandOutput> {
        Ok(CommandOutput {
            success: true,
            output: String::new(),
        })
    }
}
