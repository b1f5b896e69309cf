pub mod error;
pub mod model;
pub mod parser;

pub use error::*;
pub use model::DeskflowConfig;
pub use parser::{parse_config, parse_duration, validate};

use std::path::{Path, PathBuf};

/// 設定ファイルを直接指定する環境変数
pub const CONFIG_ENV: &str = "DESKFLOW_CONFIG";

const CANDIDATES: [&str; 2] = ["deskflow.local.kdl", "deskflow.kdl"];

/// deskflow.kdl を探す
///
/// 以下の優先順位で設定ファイルを検索:
/// 1. 環境変数 DESKFLOW_CONFIG (直接パス指定、存在しなければエラー)
/// 2. カレントディレクトリ: deskflow.local.kdl, deskflow.kdl
/// 3. ./.deskflow/ ディレクトリ内: 同様の順序
/// 4. ~/.config/deskflow/deskflow.kdl (グローバル設定)
///
/// どれも見つからなければ `Ok(None)` (組み込みのデフォルト値で動作する)
pub fn find_config_file() -> Result<Option<PathBuf>> {
    // 1. 環境変数で直接指定
    if let Ok(config_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(config_path);
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path));
        }
        return Ok(Some(path));
    }

    let current_dir = std::env::current_dir()?;

    // 2. カレントディレクトリ → 3. ./.deskflow/
    for dir in [current_dir.clone(), current_dir.join(".deskflow")] {
        for filename in &CANDIDATES {
            let path = dir.join(filename);
            if path.is_file() {
                return Ok(Some(path));
            }
        }
    }

    // 4. グローバル設定ファイル
    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("deskflow").join("deskflow.kdl");
        if global_config.is_file() {
            return Ok(Some(global_config));
        }
    }

    Ok(None)
}

/// 設定を読み込む
///
/// `explicit` が指定されていればそのファイルのみを読む。
pub fn load(explicit: Option<&Path>) -> Result<DeskflowConfig> {
    let path = match explicit {
        Some(path) if !path.is_file() => return Err(ConfigError::FileNotFound(path.to_path_buf())),
        Some(path) => Some(path.to_path_buf()),
        None => find_config_file()?,
    };

    let Some(path) = path else {
        tracing::debug!("No config file found, using built-in defaults");
        return Ok(DeskflowConfig::default());
    };

    tracing::debug!("Loading config from {}", path.display());
    let content = std::fs::read_to_string(&path)?;
    let mut config = parse_config(&content)?;
    config.source = Some(path);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    /// カレントディレクトリを一時的に移動して実行
    fn in_dir<T>(dir: &Path, f: impl FnOnce() -> T) -> T {
        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir).unwrap();
        let result = f();
        std::env::set_current_dir(original_dir).unwrap();
        result
    }

    #[test]
    #[serial]
    fn test_find_config_file_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("deskflow.kdl"), "// test").unwrap();

        let found = temp_env::with_var_unset(CONFIG_ENV, || {
            in_dir(temp_dir.path(), || find_config_file().unwrap())
        });
        assert!(found.unwrap().ends_with("deskflow.kdl"));
    }

    #[test]
    #[serial]
    fn test_find_config_file_local_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("deskflow.kdl"), "// shared").unwrap();
        fs::write(temp_dir.path().join("deskflow.local.kdl"), "// local").unwrap();

        let found = temp_env::with_var_unset(CONFIG_ENV, || {
            in_dir(temp_dir.path(), || find_config_file().unwrap())
        });
        // deskflow.local.kdl が優先される
        assert!(found.unwrap().ends_with("deskflow.local.kdl"));
    }

    #[test]
    #[serial]
    fn test_find_config_file_in_deskflow_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let deskflow_dir = temp_dir.path().join(".deskflow");
        fs::create_dir(&deskflow_dir).unwrap();
        fs::write(deskflow_dir.join("deskflow.kdl"), "// in dir").unwrap();

        let found = temp_env::with_var_unset(CONFIG_ENV, || {
            in_dir(temp_dir.path(), || find_config_file().unwrap())
        });
        assert!(found.unwrap().ends_with(".deskflow/deskflow.kdl"));
    }

    #[test]
    #[serial]
    fn test_find_config_file_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("custom.kdl");
        fs::write(&config_path, "// custom").unwrap();

        let found = temp_env::with_var(CONFIG_ENV, Some(&config_path), || {
            find_config_file().unwrap()
        });
        assert_eq!(found, Some(config_path));
    }

    #[test]
    #[serial]
    fn test_find_config_file_env_var_missing_file() {
        let result = temp_env::with_var(CONFIG_ENV, Some("/nonexistent/deskflow.kdl"), || {
            find_config_file()
        });
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    #[serial]
    fn test_load_explicit_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("lab.kdl");
        fs::write(
            &config_path,
            r#"
region "eu-central-1"
desktop {
    directory "d-lab"
    user "bob"
}
"#,
        )
        .unwrap();

        let config = load(Some(&config_path)).unwrap();
        assert_eq!(config.region.as_deref(), Some("eu-central-1"));
        assert_eq!(config.plan.desktop.directory_id, "d-lab");
        assert_eq!(config.plan.desktop.user_name, "bob");
        assert_eq!(config.source, Some(config_path));
    }

    #[test]
    fn test_load_explicit_path_not_found() {
        let result = load(Some(Path::new("/nonexistent/deskflow.kdl")));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    #[serial]
    fn test_load_invalid_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("broken.kdl");
        fs::write(&config_path, "bundle { root-storage \"big\"; }").unwrap();

        let result = load(Some(&config_path));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}
