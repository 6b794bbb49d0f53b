//! テンプレート展開機能
//!
//! Teraを使用してプランファイルの `{{ name }}` プレースホルダを展開します。

use crate::error::{FlowError, Result};
use std::collections::HashMap;
use tera::{Context, Tera};
use tracing::{debug, info};

/// テンプレートに公開する環境変数のプレフィックス
const ALLOWED_ENV_PREFIX: &str = "PROV_";

/// 変数コンテキスト
pub type Variables = HashMap<String, String>;

/// テンプレートプロセッサ
pub struct TemplateProcessor {
    tera: Tera,
    context: Context,
}

impl TemplateProcessor {
    /// 新しいテンプレートプロセッサを作成
    pub fn new() -> Self {
        Self {
            tera: Tera::default(),
            context: Context::new(),
        }
    }

    /// 変数を追加
    pub fn add_variable(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.context.insert(key.into(), &value.into());
    }

    /// 複数の変数を追加（既存の値は上書き）
    pub fn add_variables(&mut self, variables: &Variables) {
        for (key, value) in variables {
            self.context.insert(key.clone(), value);
        }
    }

    /// 環境変数を追加（PROV_ プレフィックスのみ）
    #[tracing::instrument(skip(self))]
    pub fn add_env_variables(&mut self) {
        let mut count = 0;
        for (key, value) in std::env::vars() {
            if key.starts_with(ALLOWED_ENV_PREFIX) {
                debug!(key = %key, "Adding environment variable");
                self.context.insert(key, &value);
                count += 1;
            }
        }
        info!(env_var_count = count, "Added filtered environment variables");
    }

    /// テンプレートを展開
    pub fn render(&mut self, template: &str) -> Result<String> {
        self.tera
            .render_str(template, &self.context)
            .map_err(|e| FlowError::TemplateRenderError(error_chain(&e)))
    }
}

impl Default for TemplateProcessor {
    fn default() -> Self {
        Self::new()
    }
}

/// Teraのエラーは原因が source に入っているので連結して返す
fn error_chain(err: &tera::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
