//! provflow core
//!
//! プロビジョニング対象リソースのモデル、プランファイル（KDL）のパーサー、
//! 依存関係順のプランビルダーを提供します。
//!
//! このクレートはプロバイダーを一切呼び出しません。構成エラー
//! （循環依存・未定義の依存先）と入力検証エラーはすべてここで検出されます。

pub mod error;
pub mod loader;
pub mod model;
pub mod parser;
pub mod plan;
pub mod template;

pub use error::{FlowError, Result};
pub use loader::{load_plan_file, load_plan_str};
pub use model::*;
pub use parser::{parse_kdl_file, parse_kdl_string};
pub use plan::ProvisioningPlan;
pub use template::{TemplateProcessor, Variables};

/// 全リソースの入力パラメータを検証
pub fn validate_resources(resources: &[ResourceSpec]) -> Result<()> {
    resources.iter().try_for_each(ResourceSpec::validate)
}
