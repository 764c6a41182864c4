//! ロギング機能
//!
//! `log` クレートのマクロを `env_logger` に接続します。
//! 出力先は標準エラー出力、またはファイルを選択できます。

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

use chrono::Local;
use env_logger::{Builder, Env, Target};
use lazy_static::lazy_static;
use log::LevelFilter;
use parking_lot::Mutex;

/// ログレベル
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// トレース情報
    Trace = 0,
    /// デバッグ情報
    Debug = 1,
    /// 一般情報
    Info = 2,
    /// 警告
    Warn = 3,
    /// エラー
    Error = 4,
    /// 致命的エラー
    Fatal = 5,
}

impl LogLevel {
    /// ログレベルを文字列に変換
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }

    /// 文字列からログレベルを解析
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "TRACE" => Some(LogLevel::Trace),
            "DEBUG" => Some(LogLevel::Debug),
            "INFO" => Some(LogLevel::Info),
            "WARN" | "WARNING" => Some(LogLevel::Warn),
            "ERROR" | "ERR" => Some(LogLevel::Error),
            "FATAL" | "CRITICAL" => Some(LogLevel::Fatal),
            _ => None,
        }
    }

    /// `log` クレートのフィルタに変換
    ///
    /// `Fatal` に対応するレベルは存在しないため `Error` として扱います。
    pub fn to_filter(&self) -> LevelFilter {
        match self {
            LogLevel::Trace => LevelFilter::Trace,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Error | LogLevel::Fatal => LevelFilter::Error,
        }
    }
}

lazy_static! {
    /// ロガー初期化済みフラグ
    static ref LOGGER_INITIALIZED: Mutex<bool> = Mutex::new(false);
}

/// グローバルロガーを初期化
///
/// 二回目以降の呼び出しは何もしません。`RUST_LOG` が設定されている場合は
/// そちらが優先されます。
pub fn init_logger(level: LogLevel, file: Option<&Path>) -> io::Result<()> {
    let mut initialized = LOGGER_INITIALIZED.lock();
    if *initialized {
        return Ok(());
    }

    let mut builder = Builder::from_env(Env::default().default_filter_or(level.as_str().to_lowercase()));
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} [{}] {}",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.args()
        )
    });

    if let Some(path) = file {
        // ディレクトリが存在しない場合は作成
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let log_file = OpenOptions::new()
            .write(true)
            .create(true)
            .append(true)
            .open(path)?;
        builder.target(Target::Pipe(Box::new(log_file)));
    }

    // テストなどで既にロガーが設定されている場合は無視
    let _ = builder.try_init();
    *initialized = true;

    Ok(())
}

/// パニック時のログ記録ハンドラーを設定
pub fn set_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let message = match panic_info.payload().downcast_ref::<&str>() {
            Some(s) => *s,
            None => match panic_info.payload().downcast_ref::<String>() {
                Some(s) => s.as_str(),
                None => "Unknown panic payload",
            },
        };

        let location = match panic_info.location() {
            Some(loc) => format!(" at {}:{}", loc.file(), loc.line()),
            None => String::new(),
        };

        log::error!("Panic: {}{}", message, location);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parse() {
        assert_eq!(LogLevel::from_str("warning"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_str("Critical"), Some(LogLevel::Fatal));
        assert_eq!(LogLevel::from_str("loud"), None);
        assert_eq!(LogLevel::Fatal.to_filter(), LevelFilter::Error);
    }

    #[test]
    fn test_init_twice_is_noop() {
        init_logger(LogLevel::Debug, None).expect("ロガーの初期化に失敗しました");
        init_logger(LogLevel::Error, None).expect("二回目の初期化に失敗しました");
        log::debug!("ロガー初期化テスト");
    }
}
