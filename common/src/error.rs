//! エラー型定義
//!
//! 画像デコードと描画パイプラインで使用する共通エラー型を定義します。
//! デコード中の致命的な失敗は呼び出し元へ `Result` として返され、
//! 呼び出し元は該当する更新だけを破棄して処理を継続します。

use std::fmt;
use std::io;
use thiserror::Error;

/// キャッシュの種別
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    /// 画像キャッシュ
    Image,
    /// パレットキャッシュ
    Palette,
}

impl CacheKind {
    /// 種別名を取得
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::Image => "image",
            CacheKind::Palette => "palette",
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 共通エラー
#[derive(Error, Debug)]
pub enum CommonError {
    /// 入出力エラー
    #[error("I/Oエラー: {0}")]
    IoError(#[from] io::Error),

    /// プロトコル・形式違反（マジック不一致、サイズ不一致、未知のタグなど）
    #[error("プロトコル違反: {0}")]
    ProtocolError(String),

    /// サポートされていない形式
    #[error("サポートされていない形式: {0}")]
    UnsupportedFormat(String),

    /// リソース上限超過
    #[error("リソース上限を超えました: {0}")]
    ResourceExhausted(String),

    /// キャッシュに存在しないID
    #[error("{kind}キャッシュにID {id} が存在しません")]
    CacheMiss {
        /// キャッシュ種別
        kind: CacheKind,
        /// 要求されたID
        id: u64,
    },

    /// 無効なパラメータ
    #[error("無効なパラメータ: {0}")]
    InvalidParameterError(String),

    /// 設定エラー
    #[error("設定エラー: {0}")]
    ConfigError(String),

    /// 圧縮・解凍エラー
    #[error("圧縮・解凍エラー: {0}")]
    CompressionError(String),

    /// その他のエラー
    #[error("{0}")]
    Other(String),
}

impl CommonError {
    /// 形式違反エラーを作成
    pub fn protocol(message: impl Into<String>) -> Self {
        CommonError::ProtocolError(message.into())
    }

    /// 非対応形式エラーを作成
    pub fn unsupported(message: impl Into<String>) -> Self {
        CommonError::UnsupportedFormat(message.into())
    }

    /// 対応するエラーコードを取得
    pub fn code(&self) -> ErrorCode {
        match self {
            CommonError::IoError(_) => ErrorCode::IoError,
            CommonError::ProtocolError(_) => ErrorCode::ProtocolError,
            CommonError::UnsupportedFormat(_) => ErrorCode::UnsupportedFormat,
            CommonError::ResourceExhausted(_) => ErrorCode::ResourceExhausted,
            CommonError::CacheMiss { .. } => ErrorCode::CacheMiss,
            CommonError::InvalidParameterError(_) => ErrorCode::InvalidParameterError,
            CommonError::ConfigError(_) => ErrorCode::ConfigError,
            CommonError::CompressionError(_) => ErrorCode::CompressionError,
            CommonError::Other(_) => ErrorCode::Other,
        }
    }

    /// セッション全体を継続できないエラーかどうか
    ///
    /// キャッシュIDの欠落はサーバーとの状態不整合を意味するため、
    /// 呼び出し元はセッションを破棄する必要があります。
    /// それ以外のエラーは該当する更新を破棄するだけで構いません。
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, CommonError::CacheMiss { .. })
    }

    /// エラー詳細に変換
    pub fn details(&self) -> ErrorDetails {
        ErrorDetails::new(self.code(), self.to_string())
    }
}

/// エラーコード
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// 成功
    Success = 0,
    /// 一般的なエラー
    GeneralError = 1,
    /// I/Oエラー
    IoError = 2,
    /// プロトコル違反
    ProtocolError = 3,
    /// 非対応形式
    UnsupportedFormat = 4,
    /// リソース上限超過
    ResourceExhausted = 5,
    /// キャッシュ欠落
    CacheMiss = 6,
    /// 無効なパラメータ
    InvalidParameterError = 7,
    /// 設定エラー
    ConfigError = 8,
    /// 圧縮・解凍エラー
    CompressionError = 9,
    /// その他のエラー
    Other = 99,
}

impl ErrorCode {
    /// エラーコードから文字列表現を取得
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Success => "Success",
            ErrorCode::GeneralError => "GeneralError",
            ErrorCode::IoError => "IoError",
            ErrorCode::ProtocolError => "ProtocolError",
            ErrorCode::UnsupportedFormat => "UnsupportedFormat",
            ErrorCode::ResourceExhausted => "ResourceExhausted",
            ErrorCode::CacheMiss => "CacheMiss",
            ErrorCode::InvalidParameterError => "InvalidParameterError",
            ErrorCode::ConfigError => "ConfigError",
            ErrorCode::CompressionError => "CompressionError",
            ErrorCode::Other => "Other",
        }
    }

    /// 数値からエラーコードを取得
    pub fn from_i32(code: i32) -> Self {
        match code {
            0 => ErrorCode::Success,
            1 => ErrorCode::GeneralError,
            2 => ErrorCode::IoError,
            3 => ErrorCode::ProtocolError,
            4 => ErrorCode::UnsupportedFormat,
            5 => ErrorCode::ResourceExhausted,
            6 => ErrorCode::CacheMiss,
            7 => ErrorCode::InvalidParameterError,
            8 => ErrorCode::ConfigError,
            9 => ErrorCode::CompressionError,
            _ => ErrorCode::Other,
        }
    }
}

/// エラー詳細
#[derive(Debug, Clone)]
pub struct ErrorDetails {
    /// エラーコード
    pub code: ErrorCode,
    /// エラーメッセージ
    pub message: String,
    /// エラー発生時のコンテキスト情報（描画コマンド名など）
    pub context: Option<String>,
    /// エラー発生場所
    pub location: Option<String>,
}

impl ErrorDetails {
    /// 新しいエラー詳細を作成
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: None,
            location: None,
        }
    }

    /// コンテキスト情報を追加
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// 発生場所情報を追加
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

impl fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)?;

        if let Some(context) = &self.context {
            write!(f, " (Context: {})", context)?;
        }

        if let Some(location) = &self.location {
            write!(f, " at {}", location)?;
        }

        Ok(())
    }
}

/// 結果型のエイリアス
pub type Result<T> = std::result::Result<T, CommonError>;
