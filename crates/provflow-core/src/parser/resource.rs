//! resource ノードのパース

use super::{first_string, first_u64, kdl_to_json, kdl_to_string, properties, property, string_args};
use crate::error::{FlowError, Result};
use crate::model::{DeleteAction, ResourceSpec};
use kdl::KdlNode;

/// resource ノードをパース
///
/// ```kdl
/// resource "subnet" kind="subnet" {
///     depends-on "network"
///     lookup name="web-subnet"
///     params cidr="10.0.1.0/24"
///     readiness timeout=300
///     on-rollback "delete"
/// }
/// ```
pub fn parse_resource(node: &KdlNode) -> Result<ResourceSpec> {
    let id = first_string(node)
        .ok_or_else(|| FlowError::InvalidConfig("resource requires an id".to_string()))?
        .to_string();

    let mut kind = property(node, "kind").and_then(|v| v.as_string()).map(|s| s.to_string());
    let mut spec = ResourceSpec::new(id.clone(), "");

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "kind" => {
                    kind = first_string(child).map(|s| s.to_string());
                }
                "lookup" => {
                    for (key, value) in properties(child) {
                        spec.lookup_filter.insert(key.to_string(), kdl_to_string(value));
                    }
                    // ネスト記法: lookup { name "web-vpc" }
                    if let Some(filters) = child.children() {
                        for filter in filters.nodes() {
                            let value = filter
                                .entries()
                                .first()
                                .map(|e| kdl_to_string(e.value()))
                                .unwrap_or_default();
                            spec.lookup_filter
                                .insert(filter.name().value().to_string(), value);
                        }
                    }
                }
                "params" => {
                    for (key, value) in properties(child) {
                        spec.create_params.insert(key.to_string(), kdl_to_json(value));
                    }
                    if let Some(params) = child.children() {
                        for param in params.nodes() {
                            let values: Vec<_> = param
                                .entries()
                                .iter()
                                .filter(|e| e.name().is_none())
                                .map(|e| kdl_to_json(e.value()))
                                .collect();
                            // 複数の値は配列として保存
                            let value = match values.len() {
                                0 => serde_json::Value::Null,
                                1 => values.into_iter().next().unwrap_or_default(),
                                _ => serde_json::Value::Array(values),
                            };
                            spec.create_params
                                .insert(param.name().value().to_string(), value);
                        }
                    }
                }
                "depends-on" | "depends_on" => {
                    for dependency in string_args(child) {
                        spec = spec.with_dependency(dependency);
                    }
                }
                "readiness" => {
                    if let Some(timeout) = property(child, "timeout") {
                        spec.readiness_timeout_secs = super::value_as_u64("timeout", timeout)?;
                    }
                }
                "timeout" => {
                    if let Some(timeout) = first_u64(child)? {
                        spec.readiness_timeout_secs = timeout;
                    }
                }
                "on-rollback" | "on_rollback" | "delete-action" | "delete_action" => {
                    let value = first_string(child).unwrap_or("");
                    spec.delete_action = DeleteAction::parse(value).ok_or_else(|| {
                        FlowError::InvalidConfig(format!(
                            "resource '{}': on-rollback には delete / always / retain を指定してください（指定値: '{}'）",
                            id, value
                        ))
                    })?;
                }
                _ => {}
            }
        }
    }

    let kind = kind.ok_or_else(|| {
        FlowError::InvalidConfig(format!("resource '{}' requires a kind", id))
    })?;
    spec.kind = kind.into();

    Ok(spec)
}
