use super::{PlanSettings, ProviderConfig, ResourceSpec};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// プランファイル全体
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanFile {
    /// プロジェクト名
    pub name: String,
    /// オーケストレーター設定
    pub settings: PlanSettings,
    /// プロバイダー定義
    pub providers: HashMap<String, ProviderConfig>,
    /// リソース定義（宣言順）
    pub resources: Vec<ResourceSpec>,
    /// プロジェクトレベルの変数
    pub variables: HashMap<String, String>,
}

impl PlanFile {
    pub fn resource(&self, id: &str) -> Option<&ResourceSpec> {
        self.resources.iter().find(|r| r.id == id)
    }
}
