use crate::error::{FlowError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// 既存リソース検出用のフィルタ（冪等性キー）
pub type LookupFilter = BTreeMap<String, String>;

/// 作成パラメータ
pub type CreateParams = serde_json::Map<String, serde_json::Value>;

/// デフォルトの準備完了待機タイムアウト（秒）
pub const DEFAULT_READINESS_TIMEOUT_SECS: u64 = 600;

/// プロビジョニング対象リソースの宣言的定義
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// プラン内で一意なID
    pub id: String,
    /// リソース種別
    pub kind: ResourceKind,
    /// 既存リソースの検出条件
    #[serde(default)]
    pub lookup_filter: LookupFilter,
    /// 作成時のパラメータ
    #[serde(default)]
    pub create_params: CreateParams,
    /// 依存するリソースID
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// ロールバック時の補償方法
    #[serde(default)]
    pub delete_action: DeleteAction,
    /// 準備完了待機のタイムアウト（秒）
    #[serde(default = "default_readiness_timeout")]
    pub readiness_timeout_secs: u64,
}

fn default_readiness_timeout() -> u64 {
    DEFAULT_READINESS_TIMEOUT_SECS
}

impl ResourceSpec {
    pub fn new(id: impl Into<String>, kind: impl Into<ResourceKind>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            lookup_filter: LookupFilter::new(),
            create_params: CreateParams::new(),
            depends_on: Vec::new(),
            delete_action: DeleteAction::default(),
            readiness_timeout_secs: DEFAULT_READINESS_TIMEOUT_SECS,
        }
    }

    pub fn with_lookup(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.lookup_filter.insert(key.into(), value.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.create_params.insert(key.into(), value);
        self
    }

    pub fn with_dependency(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        if !self.depends_on.contains(&id) {
            self.depends_on.push(id);
        }
        self
    }

    pub fn with_delete_action(mut self, action: DeleteAction) -> Self {
        self.delete_action = action;
        self
    }

    pub fn with_readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout_secs = timeout.as_secs();
        self
    }

    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_secs)
    }

    /// 入力パラメータを検証（プロビジョニング開始前）
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(FlowError::validation("<unnamed>", "IDが空です"));
        }
        if !self
            .id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(FlowError::validation(
                &self.id,
                "IDには英数字・'-'・'_' のみ使用できます",
            ));
        }
        if matches!(&self.kind, ResourceKind::Other(kind) if kind.trim().is_empty()) {
            return Err(FlowError::validation(&self.id, "kind が空です"));
        }
        // lookup が冪等性キーなので空は許可しない
        if self.lookup_filter.is_empty() {
            return Err(FlowError::validation(
                &self.id,
                "lookup フィルタが空です（再実行時の重複作成を防ぐために必須）",
            ));
        }
        if let Some((key, _)) = self.lookup_filter.iter().find(|(_, v)| v.is_empty()) {
            return Err(FlowError::validation(
                &self.id,
                format!("lookup '{}' の値が空です", key),
            ));
        }
        if self.readiness_timeout_secs == 0 {
            return Err(FlowError::validation(
                &self.id,
                "readiness timeout は1秒以上を指定してください",
            ));
        }
        Ok(())
    }
}

/// リソース種別
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResourceKind {
    Network,
    Subnet,
    SecurityRule,
    ComputeInstance,
    Database,
    /// 上記以外（プロバイダー定義の種別）
    Other(String),
}

impl ResourceKind {
    pub fn as_str(&self) -> &str {
        match self {
            ResourceKind::Network => "network",
            ResourceKind::Subnet => "subnet",
            ResourceKind::SecurityRule => "security-rule",
            ResourceKind::ComputeInstance => "compute-instance",
            ResourceKind::Database => "database",
            ResourceKind::Other(kind) => kind,
        }
    }
}

impl From<&str> for ResourceKind {
    fn from(s: &str) -> Self {
        match s {
            "network" => ResourceKind::Network,
            "subnet" => ResourceKind::Subnet,
            "security-rule" | "security_rule" => ResourceKind::SecurityRule,
            "compute-instance" | "compute_instance" | "instance" => ResourceKind::ComputeInstance,
            "database" => ResourceKind::Database,
            other => ResourceKind::Other(other.to_string()),
        }
    }
}

impl From<String> for ResourceKind {
    fn from(s: String) -> Self {
        ResourceKind::from(s.as_str())
    }
}

impl From<ResourceKind> for String {
    fn from(kind: ResourceKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ロールバック時の補償方法
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeleteAction {
    /// この実行で作成したリソースのみ削除（既存リソースは残す）
    #[default]
    Delete,
    /// 既存リソースを採用した場合でも削除
    Always,
    /// 削除しない
    Retain,
}

impl DeleteAction {
    /// 文字列からパース
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "delete" => Some(Self::Delete),
            "always" | "always-delete" => Some(Self::Always),
            "retain" | "keep" => Some(Self::Retain),
            _ => None,
        }
    }

    /// 補償として削除すべきかどうか
    pub fn should_delete(&self, adopted: bool) -> bool {
        match self {
            Self::Delete => !adopted,
            Self::Always => true,
            Self::Retain => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_spec() -> ResourceSpec {
        ResourceSpec::new("network", "network").with_lookup("name", "web-vpc")
    }

    #[test]
    fn test_kind_round_trip_through_string() {
        assert_eq!(ResourceKind::from("security-rule"), ResourceKind::SecurityRule);
        assert_eq!(ResourceKind::SecurityRule.to_string(), "security-rule");
        assert_eq!(
            ResourceKind::from("load-balancer"),
            ResourceKind::Other("load-balancer".to_string())
        );
    }

    #[test]
    fn test_validate_accepts_valid_spec() {
        assert!(valid_spec().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_lookup() {
        let spec = ResourceSpec::new("network", "network");
        let err = spec.validate().unwrap_err();
        assert!(matches!(err, FlowError::Validation { .. }));
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_validate_rejects_bad_id_and_zero_timeout() {
        let spec = ResourceSpec::new("web vpc", "network").with_lookup("name", "x");
        assert!(spec.validate().is_err());

        let spec = valid_spec().with_readiness_timeout(Duration::ZERO);
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_with_dependency_is_deduplicated() {
        let spec = valid_spec().with_dependency("a").with_dependency("a");
        assert_eq!(spec.depends_on, vec!["a".to_string()]);
    }

    #[test]
    fn test_delete_action() {
        assert_eq!(DeleteAction::parse("retain"), Some(DeleteAction::Retain));
        assert_eq!(DeleteAction::parse("bogus"), None);
        assert!(DeleteAction::Delete.should_delete(false));
        assert!(!DeleteAction::Delete.should_delete(true));
        assert!(DeleteAction::Always.should_delete(true));
        assert!(!DeleteAction::Retain.should_delete(false));
    }
}
