//! ユーティリティモジュール
//!
//! 各種ユーティリティ機能を提供します。

pub mod logging;

/// パス関連のユーティリティ
pub mod path {
    use std::path::{Path, PathBuf};

    /// キャッシュディレクトリを取得
    pub fn get_cache_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join("remote-display-rs")
    }

    /// パスが存在するか確認し、ディレクトリなら作成
    pub fn ensure_dir_exists(path: &Path) -> std::io::Result<()> {
        if !path.exists() {
            std::fs::create_dir_all(path)?;
        } else if !path.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("Path exists but is not a directory: {:?}", path),
            ));
        }
        Ok(())
    }
}
