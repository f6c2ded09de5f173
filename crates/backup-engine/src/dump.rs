//! Database dump/restore interface
//!
//! The engine treats the protected database as an opaque byte stream
//! behind this trait. `PgDump` shells out to the PostgreSQL client tools;
//! `MemoryDatabase` backs development and tests. Both dump and restore
//! are assumed atomic at the granularity of one call.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::process::Output;
use tokio::process::Command;
use tracing::{info, warn};

use crate::error::{BackupError, BackupResult};

/// Dump and restore seam for the protected database.
#[async_trait]
pub trait DatabaseDump: Send + Sync {
    /// Produce a single consistent point-in-time export.
    async fn dump(&self) -> BackupResult<Vec<u8>>;

    /// Replace the database contents with `data`, a byte stream produced
    /// by [`DatabaseDump::dump`].
    async fn restore(&self, data: &[u8]) -> BackupResult<()>;
}

/// PostgreSQL connection parameters.
#[derive(Debug, Clone)]
pub struct PgConfig {
    pub host: String,
    pub port: String,
    pub dbname: String,
    pub user: String,
    pub password: String,
}

impl PgConfig {
    /// Read connection parameters from the standard `PG*` environment
    /// variables. The password travels via the child environment, never
    /// the command line.
    pub fn from_env() -> BackupResult<Self> {
        let var = |name: &str| std::env::var(name).unwrap_or_default();
        let config = Self {
            host: var("PGHOST"),
            port: var("PGPORT"),
            dbname: var("PGDATABASE"),
            user: var("PGUSER"),
            password: var("PGPASSWORD"),
        };

        if config.dbname.is_empty() || config.user.is_empty() {
            return Err(BackupError::Configuration {
                message: "PGDATABASE and PGUSER must be set".to_string(),
            });
        }
        Ok(config)
    }
}

/// [`DatabaseDump`] over the PostgreSQL client tools.
pub struct PgDump {
    config: PgConfig,
}

impl PgDump {
    pub fn new(config: PgConfig) -> Self {
        Self { config }
    }

    fn command(&self, tool: &str) -> Command {
        let mut cmd = Command::new(tool);
        cmd.arg("-h")
            .arg(&self.config.host)
            .arg("-p")
            .arg(&self.config.port)
            .arg("-U")
            .arg(&self.config.user)
            .env("PGPASSWORD", &self.config.password)
            .kill_on_drop(true);
        cmd
    }

    async fn run(&self, mut cmd: Command, tool: &str) -> BackupResult<Output> {
        cmd.output()
            .await
            .map_err(|err| BackupError::RestoreMechanism {
                reason: format!("failed to run {tool}: {err}"),
            })
    }

    fn stderr_of(output: &Output) -> String {
        String::from_utf8_lossy(&output.stderr).trim().to_string()
    }

    /// Terminate other connections so drop/create cannot block. Failures
    /// are logged and ignored; the restore tools report the real error.
    async fn terminate_connections(&self) {
        let mut cmd = self.command("psql");
        cmd.arg("-d").arg("postgres").arg("-c").arg(format!(
            "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
             WHERE datname = '{}' AND pid <> pg_backend_pid();",
            self.config.dbname
        ));

        match self.run(cmd, "psql").await {
            Ok(output) if output.status.success() => {}
            Ok(output) => {
                warn!(stderr = %Self::stderr_of(&output), "could not terminate connections")
            }
            Err(err) => warn!(error = %err, "could not terminate connections"),
        }
    }
}

#[async_trait]
impl DatabaseDump for PgDump {
    async fn dump(&self) -> BackupResult<Vec<u8>> {
        info!(database = %self.config.dbname, "creating database dump");

        let mut cmd = self.command("pg_dump");
        // Custom format: compressed, restorable with pg_restore.
        cmd.arg("-d").arg(&self.config.dbname).arg("-F").arg("c");

        let output = cmd.output().await.map_err(|err| BackupError::Dump {
            reason: format!("failed to run pg_dump: {err}"),
        })?;
        if !output.status.success() {
            return Err(BackupError::Dump {
                reason: Self::stderr_of(&output),
            });
        }
        Ok(output.stdout)
    }

    async fn restore(&self, data: &[u8]) -> BackupResult<()> {
        // The temp file is removed on drop, covering every exit path.
        let artifact = tempfile::NamedTempFile::new()?;
        tokio::fs::write(artifact.path(), data).await?;

        self.terminate_connections().await;

        let mut drop_cmd = self.command("dropdb");
        drop_cmd.arg("--if-exists").arg(&self.config.dbname);
        let output = self.run(drop_cmd, "dropdb").await?;
        if !output.status.success() {
            return Err(BackupError::RestoreMechanism {
                reason: format!("dropdb: {}", Self::stderr_of(&output)),
            });
        }

        let mut create_cmd = self.command("createdb");
        create_cmd.arg(&self.config.dbname);
        let output = self.run(create_cmd, "createdb").await?;
        if !output.status.success() {
            return Err(BackupError::RestoreMechanism {
                reason: format!("createdb: {}", Self::stderr_of(&output)),
            });
        }

        let mut restore_cmd = self.command("pg_restore");
        restore_cmd
            .arg("-d")
            .arg(&self.config.dbname)
            .arg("--clean")
            .arg("--no-owner")
            .arg("--no-privileges")
            .arg(artifact.path());
        let output = self.run(restore_cmd, "pg_restore").await?;
        if !output.status.success() {
            return Err(BackupError::RestoreMechanism {
                reason: format!("pg_restore: {}", Self::stderr_of(&output)),
            });
        }

        info!(database = %self.config.dbname, "database restore completed");
        Ok(())
    }
}

/// In-memory [`DatabaseDump`] for development and testing. Dumps are
/// deterministic, so round-trip digests are comparable.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    state: RwLock<Vec<u8>>,
}

impl MemoryDatabase {
    pub fn new(initial: impl Into<Vec<u8>>) -> Self {
        Self {
            state: RwLock::new(initial.into()),
        }
    }

    /// Current database contents.
    pub fn contents(&self) -> Vec<u8> {
        self.state.read().clone()
    }

    /// Mutate the contents, simulating application writes.
    pub fn set_contents(&self, data: impl Into<Vec<u8>>) {
        *self.state.write() = data.into();
    }
}

#[async_trait]
impl DatabaseDump for MemoryDatabase {
    async fn dump(&self) -> BackupResult<Vec<u8>> {
        Ok(self.state.read().clone())
    }

    async fn restore(&self, data: &[u8]) -> BackupResult<()> {
        *self.state.write() = data.to_vec();
        Ok(())
    }
}
