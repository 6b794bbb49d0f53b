use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("KDLパースエラー: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("ファイル読み込みエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO エラー: {path}\n理由: {message}")]
    IoError { path: PathBuf, message: String },

    #[error("テンプレート展開エラー: {0}")]
    TemplateRenderError(String),

    #[error("無効な設定: {0}")]
    InvalidConfig(String),

    #[error("リソース '{resource}' の検証エラー: {message}")]
    Validation { resource: String, message: String },

    #[error("リソースIDが重複しています: {0}")]
    DuplicateResource(String),

    #[error(
        "リソース '{resource}' が未定義のリソース '{dependency}' に依存しています\nヒント: depends-on に指定したIDを確認してください"
    )]
    UnknownDependency { resource: String, dependency: String },

    #[error("循環依存が検出されました: {0}")]
    CircularDependency(String),
}

impl FlowError {
    /// 依存グラフの構成エラーかどうか（プロバイダー呼び出し前に必ず検出される）
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            FlowError::DuplicateResource(_)
                | FlowError::UnknownDependency { .. }
                | FlowError::CircularDependency(_)
        )
    }

    pub(crate) fn validation(resource: impl Into<String>, message: impl Into<String>) -> Self {
        FlowError::Validation {
            resource: resource.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;
