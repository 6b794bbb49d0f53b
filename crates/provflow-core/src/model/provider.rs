use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// プロバイダー定義（`provider` ノード）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// プロバイダー名（exec, memory など）
    pub name: String,
    /// 種別ごとのコマンド定義
    #[serde(default)]
    pub kinds: BTreeMap<String, KindCommands>,
    /// 追加設定
    #[serde(default)]
    pub config: HashMap<String, String>,
}

impl ProviderConfig {
    pub fn commands_for(&self, kind: &str) -> Option<&KindCommands> {
        self.kinds.get(kind)
    }
}

/// 1種別分の lookup/create/describe/delete コマンド
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KindCommands {
    pub lookup: Option<String>,
    pub create: Option<String>,
    pub describe: Option<String>,
    pub delete: Option<String>,
}

impl KindCommands {
    /// 未定義の操作名を返す
    pub fn missing_operations(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.lookup.is_none() {
            missing.push("lookup");
        }
        if self.create.is_none() {
            missing.push("create");
        }
        if self.describe.is_none() {
            missing.push("describe");
        }
        if self.delete.is_none() {
            missing.push("delete");
        }
        missing
    }
}
