use super::{package_command, systemctl, INSTALL_DATABASE};
use crate::config::ProvisionConfig;
use crate::domain::model::{CommandSpec, ProvisionContext, StepResult};
use crate::domain::ports::{run_checked, CommandRunner, ProvisionStep, Storage};
use crate::utils::error::{ProvisionError, Result};
use reqwest::Client;
use std::sync::Arc;

/// 加入資料庫官方簽章金鑰與套件庫，安裝、啟動並設定開機自動啟動
pub struct InstallDatabaseStep<S: Storage> {
    config: Arc<ProvisionConfig>,
    runner: Arc<dyn CommandRunner>,
    storage: S,
    client: Client,
}

impl<S: Storage> InstallDatabaseStep<S> {
    pub fn new(config: Arc<ProvisionConfig>, runner: Arc<dyn CommandRunner>, storage: S) -> Self {
        Self {
            config,
            runner,
            storage,
            client: Client::new(),
        }
    }

    async fn fetch_signing_key(&self) -> Result<Vec<u8>> {
        let url = &self.config.database.key_url;
        tracing::debug!("Downloading signing key from: {}", url);

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ProvisionError::KeyDownloadError {
                url: url.clone(),
                status: response.status().as_u16(),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }

    fn dearmor_command(&self) -> CommandSpec {
        CommandSpec::new("gpg").args([
            "--dearmor".to_string(),
            "--yes".to_string(),
            "-o".to_string(),
            self.config.database.keyring_path.display().to_string(),
        ])
    }

    fn install_commands(&self) -> Vec<CommandSpec> {
        let db = &self.config.database;
        vec![
            package_command(&self.config, ["update".to_string()]),
            package_command(
                &self.config,
                ["install".to_string(), "-y".to_string(), db.package.clone()],
            ),
            systemctl(&self.config, "start", &db.service),
            systemctl(&self.config, "enable", &db.service),
        ]
    }

    /// 確認服務處於 expected 狀態（is-active / is-enabled）
    async fn verify(&self, verb: &str, expected: &str) -> Result<()> {
        let service = &self.config.database.service;
        let output = self
            .runner
            .run(&systemctl(&self.config, verb, service).capture())
            .await?;

        if output.is_success() {
            tracing::info!("✅ {} is {}", service, expected);
            Ok(())
        } else {
            let reported = output.stdout.trim();
            Err(ProvisionError::DaemonInactive {
                service: service.clone(),
                expected: expected.to_string(),
                reported: if reported.is_empty() {
                    "unknown".to_string()
                } else {
                    reported.to_string()
                },
                code: output.code,
            })
        }
    }
}

#[async_trait::async_trait]
impl<S: Storage + 'static> ProvisionStep for InstallDatabaseStep<S> {
    fn name(&self) -> &str {
        INSTALL_DATABASE
    }

    fn describe(&self) -> Vec<String> {
        let db = &self.config.database;
        let mut actions = vec![
            format!("download: {}", db.key_url),
            format!("run: {} (key on stdin)", self.dearmor_command()),
            format!("write: {}", db.repo_file.display()),
        ];
        actions.extend(
            self.install_commands()
                .iter()
                .map(|c| format!("run: {}", c)),
        );
        actions.push(format!(
            "check: {} is-active {} / is-enabled {}",
            self.config.supervisor.systemctl, db.service, db.service
        ));
        actions
    }

    async fn execute(&self, _context: &ProvisionContext) -> Result<StepResult> {
        let db = &self.config.database;

        tracing::info!("🔑 Fetching signing key: {}", db.key_url);
        let key = self.fetch_signing_key().await?;
        run_checked(self.runner.as_ref(), &self.dearmor_command().stdin(key.clone())).await?;

        tracing::info!("📝 Writing repository list: {}", db.repo_file.display());
        self.storage
            .write_file(&db.repo_file, format!("{}\n", db.repo_line).as_bytes())
            .await?;

        for command in self.install_commands() {
            tracing::info!("🍃 {}", command.command_line());
            run_checked(self.runner.as_ref(), &command).await?;
        }

        self.verify("is-active", "active").await?;
        self.verify("is-enabled", "enabled").await?;

        Ok(StepResult::applied(INSTALL_DATABASE)
            .with_metadata("service", serde_json::Value::String(db.service.clone()))
            .with_metadata("key_bytes", serde_json::Value::Number(key.len().into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{LocalStorage, ScriptedRunner};
    use crate::domain::model::CommandOutput;
    use httpmock::prelude::*;
    use tempfile::TempDir;

    const KEY: &str = "-----BEGIN PGP PUBLIC KEY BLOCK-----\ntest\n-----END PGP PUBLIC KEY BLOCK-----\n";

    fn test_config(server: &MockServer, temp_dir: &TempDir) -> ProvisionConfig {
        let mut config = ProvisionConfig::default();
        config.project.root = temp_dir.path().to_path_buf();
        config.database.key_url = server.url("/static/pgp/server-7.0.asc");
        config.database.keyring_path = temp_dir.path().join("keyrings/mongodb.gpg");
        config.database.repo_file = temp_dir.path().join("sources.list.d/mongodb-org-7.0.list");
        config
    }

    #[tokio::test]
    async fn test_full_database_install() {
        let temp_dir = TempDir::new().unwrap();
        let server = MockServer::start();
        let key_mock = server.mock(|when, then| {
            when.method(GET).path("/static/pgp/server-7.0.asc");
            then.status(200).body(KEY);
        });

        let config = test_config(&server, &temp_dir);
        let runner = Arc::new(ScriptedRunner::new());
        let step = InstallDatabaseStep::new(
            Arc::new(config.clone()),
            runner.clone(),
            LocalStorage::new(temp_dir.path()),
        );

        let result = step
            .execute(&ProvisionContext::new("test".to_string()))
            .await
            .unwrap();

        key_mock.assert();
        let calls = runner.calls();
        assert_eq!(calls[0].program, "gpg");
        assert_eq!(calls[0].stdin.as_deref(), Some(KEY.as_bytes()));

        assert_eq!(
            runner.command_lines()[1..].to_vec(),
            vec![
                "apt-get update",
                "apt-get install -y mongodb-org",
                "systemctl start mongod",
                "systemctl enable mongod",
                "systemctl is-active mongod",
                "systemctl is-enabled mongod",
            ]
        );

        let repo = std::fs::read_to_string(&config.database.repo_file).unwrap();
        assert!(repo.contains("repo.mongodb.org"));
        assert_eq!(result.metadata["key_bytes"], serde_json::json!(KEY.len()));
    }

    #[tokio::test]
    async fn test_key_download_failure_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/static/pgp/server-7.0.asc");
            then.status(404);
        });

        let runner = Arc::new(ScriptedRunner::new());
        let step = InstallDatabaseStep::new(
            Arc::new(test_config(&server, &temp_dir)),
            runner.clone(),
            LocalStorage::new(temp_dir.path()),
        );

        let err = step
            .execute(&ProvisionContext::new("test".to_string()))
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisionError::KeyDownloadError { status: 404, .. }));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_key_server_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = ProvisionConfig::default();
        config.project.root = temp_dir.path().to_path_buf();
        config.database.key_url = "http://127.0.0.1:1/key.asc".to_string();
        config.database.keyring_path = temp_dir.path().join("keyrings/mongodb.gpg");
        config.database.repo_file = temp_dir.path().join("sources.list.d/mongodb-org-7.0.list");

        let runner = Arc::new(ScriptedRunner::new());
        let step = InstallDatabaseStep::new(
            Arc::new(config.clone()),
            runner.clone(),
            LocalStorage::new(temp_dir.path()),
        );

        let err = step
            .execute(&ProvisionContext::new("test".to_string()))
            .await
            .unwrap_err();

        assert!(matches!(err.root_cause(), ProvisionError::HttpError(_)));
        assert_eq!(err.category(), crate::utils::error::ErrorCategory::Network);
        assert_eq!(err.exit_code(), 2);
        assert!(!runner.ran("gpg"));
        assert!(runner.calls().is_empty());
        assert!(!config.database.repo_file.exists());
    }

    #[tokio::test]
    async fn test_inactive_daemon_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/static/pgp/server-7.0.asc");
            then.status(200).body(KEY);
        });

        let runner = Arc::new(ScriptedRunner::new().respond(
            "systemctl is-active mongod",
            CommandOutput::failure(3).with_stdout("failed\n"),
        ));
        let step = InstallDatabaseStep::new(
            Arc::new(test_config(&server, &temp_dir)),
            runner.clone(),
            LocalStorage::new(temp_dir.path()),
        );

        let err = step
            .execute(&ProvisionContext::new("test".to_string()))
            .await
            .unwrap_err();

        assert_eq!(err.exit_code(), 3);
        match err {
            ProvisionError::DaemonInactive {
                service, reported, ..
            } => {
                assert_eq!(service, "mongod");
                assert_eq!(reported, "failed");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!runner.ran("systemctl is-enabled"));
    }

    #[tokio::test]
    async fn test_package_conflict_stops_before_start() {
        let temp_dir = TempDir::new().unwrap();
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/static/pgp/server-7.0.asc");
            then.status(200).body(KEY);
        });

        let runner = Arc::new(ScriptedRunner::new().fail_on("apt-get install -y mongodb-org", 100));
        let step = InstallDatabaseStep::new(
            Arc::new(test_config(&server, &temp_dir)),
            runner.clone(),
            LocalStorage::new(temp_dir.path()),
        );

        let err = step
            .execute(&ProvisionContext::new("test".to_string()))
            .await
            .unwrap_err();

        assert_eq!(err.exit_code(), 100);
        assert!(!runner.ran("systemctl start"));
    }
}
