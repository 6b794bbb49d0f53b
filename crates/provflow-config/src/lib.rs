pub mod error;

pub use error::*;

use std::path::{Path, PathBuf};

/// プランファイルのパスを直接指定する環境変数
pub const CONFIG_PATH_ENV: &str = "PROVFLOW_CONFIG_PATH";

/// プロジェクト内の作業ディレクトリ名
pub const PROJECT_DIR: &str = ".provflow";

/// 検索対象のファイル名（優先順）
pub const PLAN_FILE_CANDIDATES: [&str; 4] = [
    "provision.local.kdl",
    ".provision.local.kdl",
    "provision.kdl",
    ".provision.kdl",
];

/// 実行レポートの既定の出力先（`<base>/.provflow/runs`）
pub fn default_report_dir(base: &Path) -> PathBuf {
    base.join(PROJECT_DIR).join("runs")
}

/// カレントディレクトリを起点にプランファイルを探す
pub fn find_plan_file() -> Result<PathBuf> {
    let current_dir = std::env::current_dir()?;
    find_plan_file_from(&current_dir)
}

/// プランファイルを探す
///
/// 以下の優先順位で検索:
/// 1. 環境変数 PROVFLOW_CONFIG_PATH (直接パス指定)
/// 2. 起点ディレクトリ: provision.local.kdl, .provision.local.kdl, provision.kdl, .provision.kdl
/// 3. ./.provflow/ ディレクトリ内: 同様の順序
/// 4. ~/.config/provflow/provision.kdl (グローバル設定)
pub fn find_plan_file_from(base: &Path) -> Result<PathBuf> {
    // 1. 環境変数で直接指定（存在しなければ他を探さずエラー）
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::ConfigPathNotFound(path));
    }

    // 2. 起点ディレクトリで検索
    if let Some(path) = first_existing(base) {
        return Ok(path);
    }

    // 3. ./.provflow/ ディレクトリで検索
    let project_dir = base.join(PROJECT_DIR);
    if project_dir.is_dir() {
        if let Some(path) = first_existing(&project_dir) {
            return Ok(path);
        }
    }

    // 4. グローバル設定ファイル
    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("provflow").join("provision.kdl");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::PlanFileNotFound)
}

fn first_existing(dir: &Path) -> Option<PathBuf> {
    PLAN_FILE_CANDIDATES
        .iter()
        .map(|filename| dir.join(filename))
        .find(|path| path.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    #[test]
    fn test_default_report_dir() {
        let dir = default_report_dir(Path::new("/work"));
        assert_eq!(dir, PathBuf::from("/work/.provflow/runs"));
    }

    #[test]
    #[serial]
    fn test_find_plan_file_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        fs::write(temp_dir.path().join("provision.kdl"), "// test").unwrap();

        // テンポラリディレクトリに移動
        std::env::set_current_dir(&temp_dir).unwrap();

        let result = find_plan_file();

        // 元のディレクトリに戻る
        std::env::set_current_dir(original_dir).unwrap();

        assert!(result.unwrap().ends_with("provision.kdl"));
    }

    #[test]
    #[serial]
    fn test_local_file_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("provision.kdl"), "// shared").unwrap();
        fs::write(temp_dir.path().join("provision.local.kdl"), "// local").unwrap();

        let result = find_plan_file_from(temp_dir.path()).unwrap();

        // provision.local.kdl が優先される
        assert!(result.ends_with("provision.local.kdl"));
    }

    #[test]
    #[serial]
    fn test_hidden_local_file_beats_visible_shared_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join(".provision.local.kdl"), "// hidden local").unwrap();
        fs::write(temp_dir.path().join("provision.kdl"), "// visible").unwrap();

        let result = find_plan_file_from(temp_dir.path()).unwrap();
        assert!(result.ends_with(".provision.local.kdl"));
    }

    #[test]
    #[serial]
    fn test_find_plan_file_in_project_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let project_dir = temp_dir.path().join(".provflow");
        fs::create_dir(&project_dir).unwrap();
        fs::write(project_dir.join("provision.kdl"), "// in project dir").unwrap();

        let result = find_plan_file_from(temp_dir.path()).unwrap();
        assert!(result.ends_with(".provflow/provision.kdl"));
    }

    #[test]
    #[serial]
    fn test_env_var_takes_precedence() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("provision.kdl"), "// local").unwrap();
        let config_path = temp_dir.path().join("custom.kdl");
        fs::write(&config_path, "// custom").unwrap();

        unsafe {
            std::env::set_var(CONFIG_PATH_ENV, config_path.to_str().unwrap());
        }

        let result = find_plan_file_from(temp_dir.path());

        // クリーンアップ
        unsafe {
            std::env::remove_var(CONFIG_PATH_ENV);
        }

        assert_eq!(result.unwrap(), config_path);
    }

    #[test]
    #[serial]
    fn test_env_var_pointing_nowhere_is_an_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("provision.kdl"), "// local").unwrap();
        let missing = temp_dir.path().join("missing.kdl");

        unsafe {
            std::env::set_var(CONFIG_PATH_ENV, missing.to_str().unwrap());
        }

        let result = find_plan_file_from(temp_dir.path());

        unsafe {
            std::env::remove_var(CONFIG_PATH_ENV);
        }

        assert!(matches!(result, Err(ConfigError::ConfigPathNotFound(_))));
    }
}
