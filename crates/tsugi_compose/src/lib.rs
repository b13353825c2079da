//! Stack execution provider: opaque `pull` / `down` / `up` /
//! `list_services` operations against a compose project, shelling out to
//! the compose CLI.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, warn};

/// Opaque stack operations, keyed by project name. The updater redeploys a
/// whole stack through this; it never reasons about individual services.
#[async_trait]
pub trait StackProvider: Send + Sync {
    async fn pull(&self, stack: &str) -> Result<()>;
    async fn down(&self, stack: &str) -> Result<()>;
    async fn up(&self, stack: &str) -> Result<()>;
    async fn list_services(&self, stack: &str) -> Result<Vec<String>>;
}

/// `docker compose`-backed provider.
pub struct ComposeCli {
    program: String,
}

impl ComposeCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, stack: &str, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("compose").arg("-p").arg(stack).args(args);
        info!("[STACK] {} compose -p {} {}", self.program, stack, args.join(" "));

        let output = cmd
            .output()
            .await
            .with_context(|| format!("Failed to spawn {} compose", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("[STACK] compose {:?} failed for '{}': {}", args, stack, stderr.trim());
            anyhow::bail!(
                "compose {} failed for stack '{}': {}",
                args.first().unwrap_or(&""),
                stack,
                stderr.trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for ComposeCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

#[async_trait]
impl StackProvider for ComposeCli {
    async fn pull(&self, stack: &str) -> Result<()> {
        self.run(stack, &["pull"]).await.map(|_| ())
    }

    async fn down(&self, stack: &str) -> Result<()> {
        self.run(stack, &["down"]).await.map(|_| ())
    }

    async fn up(&self, stack: &str) -> Result<()> {
        self.run(stack, &["up", "-d"]).await.map(|_| ())
    }

    async fn list_services(&self, stack: &str) -> Result<Vec<String>> {
        let stdout = self.run(stack, &["ps", "--services"]).await?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }
}
