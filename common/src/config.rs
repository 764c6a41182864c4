//! 設定管理
//!
//! 画像デコーダと描画エンジンの設定の読み込み、保存、および
//! 環境変数による上書き機能を提供します。

use serde::{Serialize, Deserialize};
use std::path::{Path, PathBuf};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use thiserror::Error;

use crate::utils::logging::LogLevel;

/// LZ 展開で許容する最大ピクセル数の既定値
pub const DEFAULT_MAX_LZ_PIXELS: u64 = 1 << 25;

/// 設定エラー
#[derive(Error, Debug)]
pub enum ConfigError {
    /// I/O エラー
    #[error("設定の読み書き中にI/Oエラーが発生しました: {0}")]
    IoError(#[from] io::Error),

    /// JSON エラー
    #[error("JSONの解析に失敗しました: {0}")]
    JsonError(#[from] serde_json::Error),

    /// TOML デシリアライズエラー
    #[error("TOMLの解析に失敗しました: {0}")]
    TomlDeError(#[from] toml::de::Error),

    /// TOML シリアライズエラー
    #[error("TOMLのシリアライズに失敗しました: {0}")]
    TomlSerError(#[from] toml::ser::Error),

    /// 不正な設定値
    #[error("設定値 '{key}' が不正です: {value}")]
    InvalidValue {
        /// 設定キー
        key: String,
        /// 与えられた値
        value: String,
    },

    /// その他のエラー
    #[error("設定エラー: {0}")]
    Other(String),
}

impl From<ConfigError> for crate::error::CommonError {
    fn from(err: ConfigError) -> Self {
        crate::error::CommonError::ConfigError(err.to_string())
    }
}

/// 設定形式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// JSON 形式
    Json,
    /// TOML 形式
    Toml,
}

impl Default for ConfigFormat {
    fn default() -> Self {
        ConfigFormat::Toml
    }
}

impl ConfigFormat {
    /// ファイル拡張子から設定形式を判定
    pub fn from_extension(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| match ext.to_lowercase().as_str() {
                "json" => Some(ConfigFormat::Json),
                "toml" => Some(ConfigFormat::Toml),
                _ => None,
            })
    }
}

/// ログ設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// ログレベル（"trace"〜"fatal"）
    pub level: String,
    /// ログ出力先ファイル（未指定なら標準エラー出力）
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl LogConfig {
    /// ログレベルを解析
    pub fn log_level(&self) -> Result<LogLevel, ConfigError> {
        LogLevel::from_str(&self.level).ok_or_else(|| ConfigError::InvalidValue {
            key: "log.level".to_string(),
            value: self.level.clone(),
        })
    }
}

/// キャンバス設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    /// キャンバスのピクセル形式（"xrgb32" / "argb32" / "rgb555" / "rgb565"）
    pub format: String,
    /// ゼロ幅線のバイアス（オクタントごとのビット集合）
    pub zero_line_bias: u32,
    /// 既定のスケーリングモード（"interpolate" / "nearest"）
    pub default_scale_mode: String,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            format: "xrgb32".to_string(),
            // オクタント 2, 3, 4, 5 で軸方向の step を優先
            zero_line_bias: (1 << 3) | (1 << 7) | (1 << 6) | (1 << 4),
            default_scale_mode: "interpolate".to_string(),
        }
    }
}

/// デコーダ設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// LZ 展開で許容する最大ピクセル数
    pub max_lz_pixels: u64,
    /// デコード結果をダンプするかどうか
    pub dump_images: bool,
    /// ダンプ先ディレクトリ（未指定ならキャッシュディレクトリ配下）
    pub dump_dir: Option<PathBuf>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_lz_pixels: DEFAULT_MAX_LZ_PIXELS,
            dump_images: false,
            dump_dir: None,
        }
    }
}

/// 表示パイプライン全体の設定
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// ログ設定
    pub log: LogConfig,
    /// キャンバス設定
    pub canvas: CanvasConfig,
    /// デコーダ設定
    pub decoder: DecoderConfig,
}

impl DisplayConfig {
    /// 既定値の設定を作成
    pub fn new() -> Self {
        Self::default()
    }

    /// ファイルから設定を読み込み
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let format = ConfigFormat::from_extension(path).unwrap_or_default();

        let mut file = File::open(path)?;
        let mut content = String::new();
        file.read_to_string(&mut content)?;

        Self::from_str_with_format(&content, format)
    }

    /// 文字列から設定を読み込み
    pub fn from_str_with_format(content: &str, format: ConfigFormat) -> Result<Self, ConfigError> {
        let config = match format {
            ConfigFormat::Json => serde_json::from_str(content)?,
            ConfigFormat::Toml => toml::from_str(content)?,
        };
        Ok(config)
    }

    /// 文字列に変換
    pub fn to_string_with_format(&self, format: ConfigFormat) -> Result<String, ConfigError> {
        let content = match format {
            ConfigFormat::Json => serde_json::to_string_pretty(self)?,
            ConfigFormat::Toml => toml::to_string(self)?,
        };
        Ok(content)
    }

    /// 設定をファイルに保存
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();

        // ディレクトリが存在することを確認
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let format = ConfigFormat::from_extension(path).unwrap_or_default();
        let content = self.to_string_with_format(format)?;

        let mut file = File::create(path)?;
        file.write_all(content.as_bytes())?;

        Ok(())
    }

    /// 環境変数で設定を上書き
    ///
    /// `{prefix}_LOG_LEVEL` のように、セクション名とキー名を大文字で連結した
    /// 変数名を参照します。
    pub fn apply_env(&mut self, prefix: &str) -> Result<(), ConfigError> {
        self.apply_vars(prefix, |name| std::env::var(name).ok())
    }

    fn apply_vars<F>(&mut self, prefix: &str, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let key = |name: &str| format!("{}_{}", prefix, name);

        if let Some(level) = lookup(&key("LOG_LEVEL")) {
            self.log.level = level;
        }
        if let Some(file) = lookup(&key("LOG_FILE")) {
            self.log.file = Some(PathBuf::from(file));
        }
        if let Some(format) = lookup(&key("CANVAS_FORMAT")) {
            self.canvas.format = format;
        }
        if let Some(bias) = lookup(&key("CANVAS_ZERO_LINE_BIAS")) {
            self.canvas.zero_line_bias = parse_value("canvas.zero_line_bias", &bias)?;
        }
        if let Some(mode) = lookup(&key("CANVAS_SCALE_MODE")) {
            self.canvas.default_scale_mode = mode;
        }
        if let Some(max) = lookup(&key("MAX_LZ_PIXELS")) {
            self.decoder.max_lz_pixels = parse_value("decoder.max_lz_pixels", &max)?;
        }
        if let Some(dump) = lookup(&key("DUMP_IMAGES")) {
            self.decoder.dump_images = parse_bool("decoder.dump_images", &dump)?;
        }
        if let Some(dir) = lookup(&key("DUMP_DIR")) {
            self.decoder.dump_dir = Some(PathBuf::from(dir));
        }

        self.validate()
    }

    /// 設定値を検証
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.log.log_level()?;

        match self.canvas.format.to_lowercase().as_str() {
            "xrgb32" | "argb32" | "rgb555" | "rgb565" => {}
            _ => {
                return Err(ConfigError::InvalidValue {
                    key: "canvas.format".to_string(),
                    value: self.canvas.format.clone(),
                })
            }
        }

        match self.canvas.default_scale_mode.to_lowercase().as_str() {
            "interpolate" | "nearest" => {}
            _ => {
                return Err(ConfigError::InvalidValue {
                    key: "canvas.default_scale_mode".to_string(),
                    value: self.canvas.default_scale_mode.clone(),
                })
            }
        }

        if self.decoder.max_lz_pixels == 0 {
            return Err(ConfigError::InvalidValue {
                key: "decoder.max_lz_pixels".to_string(),
                value: "0".to_string(),
            });
        }

        Ok(())
    }

    /// ダンプ先ディレクトリを解決
    pub fn dump_dir(&self) -> PathBuf {
        self.decoder
            .dump_dir
            .clone()
            .unwrap_or_else(|| crate::utils::path::get_cache_dir().join("dump"))
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}
