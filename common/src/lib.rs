//! リモートディスプレイ共通ライブラリ
//!
//! 画像デコードと描画パイプラインで共有される機能を提供します。
//! ワイヤデータモデル、LZ コーデック、zlib 展開、エラー型、設定、ロギングを含みます。

pub mod compression;
pub mod config;
pub mod error;
pub mod lz;
pub mod protocol;
pub mod utils;

// 主要コンポーネントを再エクスポート
pub use error::{CacheKind, CommonError, ErrorCode, ErrorDetails, Result};
pub use config::DisplayConfig;
pub use lz::{LzDecoder, LzEncoder, LzHeader, LzImageType};

use log::info;

/// ライブラリのバージョン
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// ライブラリを初期化
///
/// 設定に従ってロガーとパニックハンドラを設定します。
pub fn initialize(config: &DisplayConfig) -> Result<()> {
    let level = config.log.log_level()?;

    // ロガーを初期化
    if let Err(e) = utils::logging::init_logger(level, config.log.file.as_deref()) {
        eprintln!("ロガーの初期化に失敗しました: {}", e);
    }

    // パニックハンドラを設定
    utils::logging::set_panic_hook();

    info!(
        "リモートディスプレイ共通ライブラリ初期化 - バージョン: {}, ログレベル: {}",
        VERSION,
        level.as_str()
    );

    Ok(())
}
