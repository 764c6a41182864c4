//! 画像キャッシュとパレットキャッシュ
//!
//! サーバーが割り当てたIDでデコード済みサーフェスとパレットを保持します。
//! 存在しないIDの参照はサーバーとの状態不整合なので、
//! [`CommonError::CacheMiss`] として呼び出し元へ返します。

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, error, warn};
use parking_lot::Mutex;
use remote_display_rs_common::protocol::Palette;
use remote_display_rs_common::{CacheKind, CommonError, Result};

use super::surface::Surface;

#[derive(Debug)]
struct ImageEntry {
    surface: Arc<Surface>,
    lossy: bool,
    refs: u32,
}

/// デコード済み画像のキャッシュ
#[derive(Debug, Default)]
pub struct ImageCache {
    entries: HashMap<u64, ImageEntry>,
}

impl ImageCache {
    /// 空のキャッシュを作成
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, id: u64, surface: Arc<Surface>, lossy: bool) {
        if let Some(entry) = self.entries.get_mut(&id) {
            // 既存の内容は上書きしない
            entry.refs += 1;
            warn!("画像キャッシュID {} は登録済みです（参照数 {}）", id, entry.refs);
            return;
        }
        debug!("画像キャッシュに登録: id={} lossy={}", id, lossy);
        self.entries.insert(id, ImageEntry { surface, lossy, refs: 1 });
    }

    /// ロスレス画像を登録
    pub fn put(&mut self, id: u64, surface: Arc<Surface>) {
        self.insert(id, surface, false);
    }

    /// 非可逆画像を登録（後でロスレス版に置き換え可能）
    pub fn put_lossy(&mut self, id: u64, surface: Arc<Surface>) {
        self.insert(id, surface, true);
    }

    /// 非可逆エントリをロスレス版で置き換える
    pub fn replace_lossy(&mut self, id: u64, surface: Arc<Surface>) -> Result<()> {
        let entry = self.entries.get_mut(&id).ok_or_else(|| {
            error!("置き換え対象の画像キャッシュID {} がありません", id);
            CommonError::CacheMiss { kind: CacheKind::Image, id }
        })?;
        if !entry.lossy {
            error!("画像キャッシュID {} はロスレスのため置き換えできません", id);
            return Err(CommonError::protocol(format!(
                "画像キャッシュID {} はロスレスのため置き換えできません",
                id
            )));
        }
        entry.surface = surface;
        entry.lossy = false;
        Ok(())
    }

    /// 画像を取得
    pub fn get(&self, id: u64) -> Result<Arc<Surface>> {
        match self.entries.get(&id) {
            Some(entry) => Ok(Arc::clone(&entry.surface)),
            None => {
                error!("画像キャッシュID {} がありません", id);
                Err(CommonError::CacheMiss { kind: CacheKind::Image, id })
            }
        }
    }

    /// ロスレス画像を取得
    ///
    /// エントリがまだ非可逆ならプロトコル違反です。
    pub fn get_lossless(&self, id: u64) -> Result<Arc<Surface>> {
        let entry = self.entries.get(&id).ok_or_else(|| {
            error!("画像キャッシュID {} がありません", id);
            CommonError::CacheMiss { kind: CacheKind::Image, id }
        })?;
        if entry.lossy {
            error!("画像キャッシュID {} はまだ非可逆です", id);
            return Err(CommonError::protocol(format!(
                "画像キャッシュID {} のロスレス版がありません",
                id
            )));
        }
        Ok(Arc::clone(&entry.surface))
    }

    /// 参照を1つ解放し、参照がなくなれば削除
    ///
    /// 削除した場合は `true` を返します。
    pub fn remove(&mut self, id: u64) -> bool {
        match self.entries.get_mut(&id) {
            Some(entry) if entry.refs > 1 => {
                entry.refs -= 1;
                false
            }
            Some(_) => {
                self.entries.remove(&id);
                true
            }
            None => {
                warn!("削除対象の画像キャッシュID {} がありません", id);
                false
            }
        }
    }

    /// 登録されているか
    pub fn contains(&self, id: u64) -> bool {
        self.entries.contains_key(&id)
    }

    /// 非可逆エントリかどうか
    pub fn is_lossy(&self, id: u64) -> Option<bool> {
        self.entries.get(&id).map(|e| e.lossy)
    }

    /// エントリ数
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 空かどうか
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// すべて破棄
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Debug)]
struct PaletteEntry {
    palette: Arc<Palette>,
    borrowed: u32,
}

/// パレットキャッシュ
#[derive(Debug, Default)]
pub struct PaletteCache {
    entries: HashMap<u64, PaletteEntry>,
}

impl PaletteCache {
    /// 空のキャッシュを作成
    pub fn new() -> Self {
        Self::default()
    }

    /// パレットを `unique` をキーに登録
    pub fn put(&mut self, palette: &Palette) {
        debug!("パレットキャッシュに登録: id={} エントリ数={}", palette.unique, palette.ents.len());
        self.entries.insert(
            palette.unique,
            PaletteEntry { palette: Arc::new(palette.clone()), borrowed: 0 },
        );
    }

    /// パレットを取得
    ///
    /// 使い終わったら [`PaletteCache::release`] を呼びます。
    pub fn get(&mut self, id: u64) -> Result<Arc<Palette>> {
        match self.entries.get_mut(&id) {
            Some(entry) => {
                entry.borrowed += 1;
                Ok(Arc::clone(&entry.palette))
            }
            None => {
                error!("パレットキャッシュID {} がありません", id);
                Err(CommonError::CacheMiss { kind: CacheKind::Palette, id })
            }
        }
    }

    /// 取得したパレットの使用終了を通知
    pub fn release(&mut self, id: u64) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.borrowed = entry.borrowed.saturating_sub(1);
        }
    }

    /// 貸し出し中の数
    pub fn borrowed(&self, id: u64) -> u32 {
        self.entries.get(&id).map(|e| e.borrowed).unwrap_or(0)
    }

    /// エントリ数
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 空かどうか
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// すべて破棄
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// 表示パイプラインで共有するキャッシュ
///
/// 複数スレッドから使う場合に備えて各キャッシュをロックで包みます。
#[derive(Debug, Default)]
pub struct DisplayCaches {
    /// 画像キャッシュ
    pub images: Mutex<ImageCache>,
    /// パレットキャッシュ
    pub palettes: Mutex<PaletteCache>,
}

impl DisplayCaches {
    /// 空のキャッシュを作成
    pub fn new() -> Self {
        Self::default()
    }

    /// セッションのリセット時にすべてのキャッシュを破棄
    pub fn clear_all_caches(&self) {
        self.images.lock().clear();
        self.palettes.lock().clear();
        debug!("画像キャッシュとパレットキャッシュを破棄しました");
    }
}
