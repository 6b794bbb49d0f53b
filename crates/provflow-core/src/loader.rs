//! プランファイルの読み込み（テンプレート展開 + パース）

use crate::error::{FlowError, Result};
use crate::model::PlanFile;
use crate::parser::{default_name, parse_kdl_string, parse_variables_only};
use crate::template::{TemplateProcessor, Variables};
use std::path::Path;
use tracing::{debug, info};

/// プランファイルを読み込む
///
/// 変数の優先順位（後勝ち）:
/// 1. `PROV_` で始まる環境変数
/// 2. ファイル内の `variables` ブロック
/// 3. 呼び出し側から渡された変数（CLIの `--var`）
#[tracing::instrument(skip(overrides))]
pub fn load_plan_file(path: &Path, overrides: &Variables) -> Result<PlanFile> {
    let content = std::fs::read_to_string(path).map_err(|e| FlowError::IoError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    load_plan_str(&content, default_name(path), overrides)
}

/// 文字列からプランを読み込む
pub fn load_plan_str(content: &str, default_name: String, overrides: &Variables) -> Result<PlanFile> {
    let mut processor = TemplateProcessor::new();
    processor.add_env_variables();

    // variables ブロック自体はテンプレート展開前に取り出す
    let file_variables = parse_variables_only(content)?;
    debug!(count = file_variables.len(), "Loaded file variables");
    processor.add_variables(&file_variables);
    processor.add_variables(overrides);

    let rendered = processor.render(content)?;
    let mut plan = parse_kdl_string(&rendered, default_name)?;
    plan.variables.extend(overrides.clone());

    info!(
        project = %plan.name,
        resources = plan.resources.len(),
        providers = plan.providers.len(),
        "Loaded plan file"
    );
    Ok(plan)
}
