//! settings ノードのパース

use super::{first_u64, property, value_as_u64};
use crate::error::Result;
use crate::model::PlanSettings;
use kdl::KdlDocument;

/// settings ブロックをパース
pub fn parse_settings(doc: &KdlDocument) -> Result<PlanSettings> {
    let mut settings = PlanSettings::default();

    for node in doc.nodes() {
        match node.name().value() {
            "max-parallel" | "max_parallel" => {
                if let Some(value) = first_u64(node)? {
                    settings.max_parallel = value.max(1) as usize;
                }
            }
            "poll-interval" | "poll_interval" => {
                if let Some(value) = first_u64(node)? {
                    settings.poll_interval_secs = value.max(1);
                }
            }
            "run-deadline" | "run_deadline" => {
                settings.run_deadline_secs = first_u64(node)?;
            }
            "retry" => {
                if let Some(value) = property(node, "max-attempts") {
                    settings.retry.max_attempts = value_as_u64("max-attempts", value)?.max(1) as u32;
                }
                if let Some(value) = property(node, "initial-delay") {
                    settings.retry.initial_delay_ms = value_as_u64("initial-delay", value)?;
                }
                if let Some(value) = property(node, "max-delay") {
                    settings.retry.max_delay_ms = value_as_u64("max-delay", value)?;
                }
                if let Some(value) = property(node, "multiplier").and_then(|v| {
                    v.as_float().or_else(|| v.as_integer().map(|i| i as f64))
                }) {
                    settings.retry.multiplier = value;
                }
            }
            _ => {}
        }
    }

    Ok(settings)
}
