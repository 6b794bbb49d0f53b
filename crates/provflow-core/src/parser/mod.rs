//! KDLパーサー
//!
//! provflow のプランファイル（provision.kdl）をパースします。
//! 各ノードタイプのパース処理はモジュールに分離されています。

mod provider;
mod resource;
mod settings;

use provider::parse_provider;
use settings::parse_settings;

pub use resource::parse_resource;

use crate::error::{FlowError, Result};
use crate::model::PlanFile;
use kdl::{KdlDocument, KdlNode, KdlValue};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// KDLファイルをパースしてPlanFileを生成
pub fn parse_kdl_file<P: AsRef<Path>>(path: P) -> Result<PlanFile> {
    let content = fs::read_to_string(path.as_ref()).map_err(|e| FlowError::IoError {
        path: path.as_ref().to_path_buf(),
        message: e.to_string(),
    })?;
    parse_kdl_string(&content, default_name(path.as_ref()))
}

/// ファイルの親ディレクトリ名をデフォルトのプロジェクト名にする
pub(crate) fn default_name(path: &Path) -> String {
    path.parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("unnamed")
        .to_string()
}

/// KDL文字列をパース
pub fn parse_kdl_string(content: &str, default_name: String) -> Result<PlanFile> {
    let doc: KdlDocument = content.parse()?;

    let mut plan = PlanFile {
        name: default_name,
        ..Default::default()
    };

    for node in doc.nodes() {
        match node.name().value() {
            "project" => {
                if let Some(project_name) = first_string(node) {
                    plan.name = project_name.to_string();
                }
            }
            "settings" => {
                if let Some(children) = node.children() {
                    plan.settings = parse_settings(children)?;
                }
            }
            "provider" => {
                let provider = parse_provider(node)?;
                plan.providers.insert(provider.name.clone(), provider);
            }
            "resource" => {
                let resource = parse_resource(node)?;
                plan.resources.push(resource);
            }
            "variables" => {
                plan.variables.extend(parse_variables(node));
            }
            _ => {
                // 不明なノードはスキップ
            }
        }
    }

    Ok(plan)
}

/// variables ブロックだけを抽出（テンプレート展開前の事前パス用）
pub fn parse_variables_only(content: &str) -> Result<HashMap<String, String>> {
    let doc: KdlDocument = content.parse()?;
    Ok(doc
        .nodes()
        .iter()
        .filter(|n| n.name().value() == "variables")
        .flat_map(parse_variables)
        .collect())
}

fn parse_variables(node: &KdlNode) -> HashMap<String, String> {
    let mut variables = HashMap::new();
    if let Some(vars) = node.children() {
        for var in vars.nodes() {
            let key = var.name().value().to_string();
            let value = first_string(var).unwrap_or("").to_string();
            variables.insert(key, value);
        }
    }
    variables
}

/// 最初の位置引数（文字列）
pub(crate) fn first_string(node: &KdlNode) -> Option<&str> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
}

/// 全ての位置引数（文字列）
pub(crate) fn string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string().map(|s| s.to_string()))
        .collect()
}

/// プロパティ（key=value）の一覧
pub(crate) fn properties(node: &KdlNode) -> impl Iterator<Item = (&str, &KdlValue)> {
    node.entries()
        .iter()
        .filter_map(|e| e.name().map(|name| (name.value(), e.value())))
}

pub(crate) fn property<'a>(node: &'a KdlNode, key: &str) -> Option<&'a KdlValue> {
    properties(node).find(|(k, _)| *k == key).map(|(_, v)| v)
}

/// 最初の位置引数を非負整数として取得
pub(crate) fn first_u64(node: &KdlNode) -> Result<Option<u64>> {
    match node
        .entries()
        .iter()
        .find(|e| e.name().is_none())
        .map(|e| e.value())
    {
        Some(value) => value_as_u64(node.name().value(), value).map(Some),
        None => Ok(None),
    }
}

pub(crate) fn value_as_u64(key: &str, value: &KdlValue) -> Result<u64> {
    value
        .as_integer()
        .and_then(|v| u64::try_from(v).ok())
        .ok_or_else(|| {
            FlowError::InvalidConfig(format!("{} には0以上の整数を指定してください", key))
        })
}

/// KDLの値をJSONに変換
pub(crate) fn kdl_to_json(value: &KdlValue) -> serde_json::Value {
    if let Some(s) = value.as_string() {
        serde_json::Value::String(s.to_string())
    } else if let Some(i) = value.as_integer() {
        i64::try_from(i)
            .map(serde_json::Value::from)
            .unwrap_or_else(|_| serde_json::Value::String(i.to_string()))
    } else if let Some(f) = value.as_float() {
        serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    } else if let Some(b) = value.as_bool() {
        serde_json::Value::Bool(b)
    } else {
        serde_json::Value::Null
    }
}

/// KDLの値を文字列として取得（数値・真偽値も許可）
pub(crate) fn kdl_to_string(value: &KdlValue) -> String {
    match kdl_to_json(value) {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}
