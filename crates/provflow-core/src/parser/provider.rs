//! provider ノードのパース

use super::{first_string, kdl_to_string};
use crate::error::{FlowError, Result};
use crate::model::{KindCommands, ProviderConfig, ResourceKind};
use kdl::KdlNode;

/// provider ノードをパース
pub fn parse_provider(node: &KdlNode) -> Result<ProviderConfig> {
    let name = first_string(node)
        .ok_or_else(|| FlowError::InvalidConfig("provider requires a name".to_string()))?
        .to_string();

    let mut provider = ProviderConfig {
        name,
        ..Default::default()
    };

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "kind" => {
                    let kind = first_string(child).ok_or_else(|| {
                        FlowError::InvalidConfig(format!(
                            "provider '{}': kind requires a name",
                            provider.name
                        ))
                    })?;
                    let mut commands = KindCommands::default();
                    if let Some(ops) = child.children() {
                        for op in ops.nodes() {
                            let command = first_string(op).map(|s| s.to_string());
                            match op.name().value() {
                                "lookup" => commands.lookup = command,
                                "create" => commands.create = command,
                                "describe" => commands.describe = command,
                                "delete" => commands.delete = command,
                                _ => {}
                            }
                        }
                    }
                    // 表記ゆれ（security_rule / security-rule）を正規化
                    let kind = ResourceKind::from(kind).as_str().to_string();
                    provider.kinds.insert(kind, commands);
                }
                // 追加設定はconfigに保存
                other => {
                    if let Some(entry) = child.entries().first() {
                        provider
                            .config
                            .insert(other.to_string(), kdl_to_string(entry.value()));
                    }
                }
            }
        }
    }

    Ok(provider)
}
