//! Exec provider implementation

use crate::error::{ExecError, Result};
use crate::shell::{DEFAULT_COMMAND_TIMEOUT, DEFAULT_SHELL, Shell, env_key, first_line};
use async_trait::async_trait;
use provflow_cloud::{AuthStatus, ExternalId, Provider, ProviderError, ProviderResult, ResourceStatus};
use provflow_core::{CreateParams, KindCommands, LookupFilter, ProviderConfig, ResourceKind};
use std::collections::BTreeMap;
use std::time::Duration;

/// Drives a cloud CLI through per-kind command lines
///
/// Command output conventions:
/// - `lookup` prints the external id of the match, or nothing
/// - `create` prints the new external id
/// - `describe` prints a status word (`ready`, `available`, `running`, `active`
///   mean ready; `failed` or `error`, optionally followed by a reason, mean failed;
///   anything else means still provisioning)
/// - `delete` output is ignored
///
/// Exit status 75 or throttling messages on stderr are transient, exit status 44
/// or "not found" messages are `NotFound`, anything else is permanent.
pub struct ExecProvider {
    config: ProviderConfig,
    shell: Shell,
    auth_command: Option<String>,
}

impl ExecProvider {
    /// Build from a `provider "exec"` block.
    ///
    /// Recognized settings: `shell` (default `sh`), `timeout` (seconds per
    /// command, default 300), `auth` (command used by `check_auth`).
    pub fn new(config: ProviderConfig) -> Self {
        let program = config
            .config
            .get("shell")
            .cloned()
            .unwrap_or_else(|| DEFAULT_SHELL.to_string());
        let timeout = config
            .config
            .get("timeout")
            .and_then(|t| t.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_COMMAND_TIMEOUT);
        let auth_command = config.config.get("auth").cloned();

        Self {
            config,
            shell: Shell::new(program, timeout),
            auth_command,
        }
    }

    pub fn shell(&self) -> &Shell {
        &self.shell
    }

    /// Kinds without a complete lookup/create/describe/delete mapping
    pub fn unmapped_kinds<'a>(&self, kinds: impl IntoIterator<Item = &'a ResourceKind>) -> Vec<String> {
        let mut unmapped = Vec::new();
        for kind in kinds {
            let problem = match self.config.commands_for(kind.as_str()) {
                None => Some(format!("{} (no commands)", kind)),
                Some(commands) => {
                    let missing = commands.missing_operations();
                    if missing.is_empty() {
                        None
                    } else {
                        Some(format!("{} (missing {})", kind, missing.join(", ")))
                    }
                }
            };
            if let Some(problem) = problem {
                if !unmapped.contains(&problem) {
                    unmapped.push(problem);
                }
            }
        }
        unmapped
    }

    fn commands(&self, kind: &ResourceKind) -> Result<&KindCommands> {
        self.config
            .commands_for(kind.as_str())
            .ok_or_else(|| ExecError::MissingCommand {
                kind: kind.to_string(),
                operation: "any".to_string(),
            })
    }

    fn command<'a>(
        &'a self,
        kind: &ResourceKind,
        operation: &str,
        select: impl Fn(&'a KindCommands) -> Option<&'a String>,
    ) -> Result<&'a str> {
        select(self.commands(kind)?)
            .map(String::as_str)
            .ok_or_else(|| ExecError::MissingCommand {
                kind: kind.to_string(),
                operation: operation.to_string(),
            })
    }

    fn base_env(kind: &ResourceKind) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert("PROV_KIND".to_string(), kind.to_string());
        env
    }

    async fn run_lookup(&self, kind: &ResourceKind, filter: &LookupFilter) -> Result<Option<ExternalId>> {
        let command = self.command(kind, "lookup", |c| c.lookup.as_ref())?;
        let mut env = Self::base_env(kind);
        for (key, value) in filter {
            env.insert(format!("PROV_FILTER_{}", env_key(key)), value.clone());
        }
        env.insert("PROV_FILTER_JSON".to_string(), serde_json::to_string(filter)?);

        let output = self.shell.run(command, &env).await?;
        Ok(match first_line(&output) {
            None | Some("null") | Some("None") => None,
            Some(id) => Some(ExternalId::new(id)),
        })
    }

    async fn run_create(&self, kind: &ResourceKind, params: &CreateParams) -> Result<ExternalId> {
        let command = self.command(kind, "create", |c| c.create.as_ref())?;
        let mut env = Self::base_env(kind);
        for (key, value) in params {
            let value = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            env.insert(format!("PROV_PARAM_{}", env_key(key)), value);
        }
        env.insert("PROV_PARAMS_JSON".to_string(), serde_json::to_string(params)?);

        let output = self.shell.run(command, &env).await?;
        first_line(&output)
            .map(ExternalId::new)
            .ok_or_else(|| ExecError::UnexpectedOutput("create printed no external id".to_string()))
    }

    async fn run_describe(&self, kind: &ResourceKind, external_id: &ExternalId) -> Result<ResourceStatus> {
        let command = self.command(kind, "describe", |c| c.describe.as_ref())?;
        let mut env = Self::base_env(kind);
        env.insert("PROV_EXTERNAL_ID".to_string(), external_id.to_string());

        let output = self.shell.run(command, &env).await?;
        Ok(parse_status(first_line(&output).unwrap_or_default()))
    }

    async fn run_delete(&self, kind: &ResourceKind, external_id: &ExternalId) -> Result<()> {
        let command = self.command(kind, "delete", |c| c.delete.as_ref())?;
        let mut env = Self::base_env(kind);
        env.insert("PROV_EXTERNAL_ID".to_string(), external_id.to_string());

        self.shell.run(command, &env).await?;
        Ok(())
    }
}

/// Map a `describe` status line to a resource status
fn parse_status(line: &str) -> ResourceStatus {
    let lower = line.to_lowercase();
    let word = lower
        .split(|c: char| c.is_whitespace() || c == ':')
        .next()
        .unwrap_or_default();

    match word {
        "ready" | "available" | "running" | "active" | "up" => ResourceStatus::Ready,
        "failed" | "error" | "fail" => {
            let reason = line[word.len()..].trim_start_matches([':', ' ']).trim();
            if reason.is_empty() {
                ResourceStatus::Failed(line.to_string())
            } else {
                ResourceStatus::Failed(reason.to_string())
            }
        }
        _ => ResourceStatus::Provisioning,
    }
}

#[async_trait]
impl Provider for ExecProvider {
    fn name(&self) -> &str {
        "exec"
    }

    async fn check_auth(&self) -> ProviderResult<AuthStatus> {
        if let Err(e) = self.shell.check_available().await {
            return Ok(AuthStatus::failed(e.to_string()));
        }

        let Some(command) = &self.auth_command else {
            return Ok(AuthStatus::ok(format!("shell: {}", self.shell.program())));
        };

        match self.shell.run(command, &BTreeMap::new()).await {
            Ok(output) => Ok(AuthStatus::ok(
                first_line(&output).unwrap_or("authenticated").to_string(),
            )),
            Err(ExecError::CommandFailed { stderr, .. }) => Ok(AuthStatus::failed(stderr)),
            Err(e) => Err(e.into()),
        }
    }

    async fn lookup(
        &self,
        kind: &ResourceKind,
        filter: &LookupFilter,
    ) -> ProviderResult<Option<ExternalId>> {
        match self.run_lookup(kind, filter).await {
            Ok(found) => Ok(found),
            Err(e) => match ProviderError::from(e) {
                // a lookup that finds nothing is not an error
                ProviderError::NotFound(_) => Ok(None),
                other => Err(other),
            },
        }
    }

    async fn create(&self, kind: &ResourceKind, params: &CreateParams) -> ProviderResult<ExternalId> {
        Ok(self.run_create(kind, params).await?)
    }

    async fn describe(
        &self,
        kind: &ResourceKind,
        external_id: &ExternalId,
    ) -> ProviderResult<ResourceStatus> {
        Ok(self.run_describe(kind, external_id).await?)
    }

    async fn delete(&self, kind: &ResourceKind, external_id: &ExternalId) -> ProviderResult<()> {
        Ok(self.run_delete(kind, external_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(commands: KindCommands) -> ExecProvider {
        let mut config = ProviderConfig {
            name: "exec".to_string(),
            ..Default::default()
        };
        config.kinds.insert("network".to_string(), commands);
        ExecProvider::new(config)
    }

    fn commands(lookup: &str, create: &str, describe: &str, delete: &str) -> KindCommands {
        KindCommands {
            lookup: Some(lookup.to_string()),
            create: Some(create.to_string()),
            describe: Some(describe.to_string()),
            delete: Some(delete.to_string()),
        }
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status("available"), ResourceStatus::Ready);
        assert_eq!(parse_status("RUNNING"), ResourceStatus::Ready);
        assert_eq!(parse_status("pending"), ResourceStatus::Provisioning);
        assert_eq!(parse_status(""), ResourceStatus::Provisioning);
        assert_eq!(
            parse_status("failed: image not found"),
            ResourceStatus::Failed("image not found".to_string())
        );
        assert_eq!(
            parse_status("error"),
            ResourceStatus::Failed("error".to_string())
        );
    }

    #[tokio::test]
    async fn test_lookup_empty_output_is_none() {
        let p = provider(commands("true", "echo x", "echo ready", "true"));
        let mut filter = LookupFilter::new();
        filter.insert("name".into(), "web-vpc".into());
        assert_eq!(p.lookup(&ResourceKind::Network, &filter).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_lookup_receives_filter() {
        let p = provider(commands(
            "echo \"vpc-$PROV_FILTER_NAME\"",
            "echo x",
            "echo ready",
            "true",
        ));
        let mut filter = LookupFilter::new();
        filter.insert("name".into(), "web".into());
        assert_eq!(
            p.lookup(&ResourceKind::Network, &filter).await.unwrap(),
            Some(ExternalId::new("vpc-web"))
        );
    }

    #[tokio::test]
    async fn test_create_receives_params() {
        let p = provider(commands(
            "true",
            "echo \"vpc-$PROV_PARAM_CIDR_BLOCK\"",
            "echo ready",
            "true",
        ));
        let mut params = CreateParams::new();
        params.insert("cidr-block".into(), serde_json::json!("10.0.0.0/16"));
        assert_eq!(
            p.create(&ResourceKind::Network, &params).await.unwrap(),
            ExternalId::new("vpc-10.0.0.0/16")
        );
    }

    #[tokio::test]
    async fn test_create_without_output_is_permanent() {
        let p = provider(commands("true", "true", "echo ready", "true"));
        let err = p
            .create(&ResourceKind::Network, &CreateParams::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Permanent(_)));
    }

    #[tokio::test]
    async fn test_describe_and_delete_receive_external_id() {
        let p = provider(commands(
            "true",
            "echo x",
            "test \"$PROV_EXTERNAL_ID\" = vpc-1 && echo available",
            "echo 'vpc not found' >&2; exit 1",
        ));
        let id = ExternalId::new("vpc-1");
        assert_eq!(
            p.describe(&ResourceKind::Network, &id).await.unwrap(),
            ResourceStatus::Ready
        );
        assert!(matches!(
            p.delete(&ResourceKind::Network, &id).await,
            Err(ProviderError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_tempfail_exit_is_transient() {
        let p = provider(commands("true", "exit 75", "echo ready", "true"));
        let err = p
            .create(&ResourceKind::Network, &CreateParams::new())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_unmapped_kind() {
        let p = provider(commands("true", "echo x", "echo ready", "true"));
        let err = p
            .create(&ResourceKind::Database, &CreateParams::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Permanent(_)));

        let unmapped = p.unmapped_kinds([&ResourceKind::Network, &ResourceKind::Database]);
        assert_eq!(unmapped, vec!["database (no commands)".to_string()]);
    }

    #[tokio::test]
    async fn test_check_auth_command() {
        let mut config = ProviderConfig::default();
        config.config.insert("auth".into(), "echo 'denied' >&2; exit 1".into());
        let status = ExecProvider::new(config).check_auth().await.unwrap();
        assert!(!status.authenticated);
        assert_eq!(status.error.as_deref(), Some("denied"));

        let status = ExecProvider::new(ProviderConfig::default())
            .check_auth()
            .await
            .unwrap();
        assert!(status.authenticated);
    }
}
