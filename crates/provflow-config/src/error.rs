use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "プランファイルが見つかりません。以下の場所を確認してください:\n\
        - カレントディレクトリ: provision.local.kdl, .provision.local.kdl, provision.kdl, .provision.kdl\n\
        - ./.provflow/ ディレクトリ\n\
        - ~/.config/provflow/provision.kdl\n\
        または PROVFLOW_CONFIG_PATH 環境変数、--file オプションで直接指定できます"
    )]
    PlanFileNotFound,

    #[error("PROVFLOW_CONFIG_PATH が存在しないファイルを指しています: {0}")]
    ConfigPathNotFound(PathBuf),

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
