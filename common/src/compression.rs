//! zlib 展開
//!
//! ZLIB_GLZ_RGB 画像の外側の zlib ストリームを展開します。
//! 入力は複数チャンクに分かれていてもよく、順に連結して読み込みます。

use std::io::{self, Read, Write};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use thiserror::Error;

use crate::protocol::Chunks;

/// 圧縮エラー
#[derive(Error, Debug)]
pub enum CompressionError {
    /// I/O エラー
    #[error("圧縮・解凍中にI/Oエラーが発生しました: {0}")]
    IoError(#[from] io::Error),

    /// 展開サイズの不一致
    #[error("展開サイズが一致しません: 期待値 {expected}, 実際 {actual}")]
    SizeMismatch {
        /// 期待したバイト数
        expected: usize,
        /// 展開できたバイト数
        actual: usize,
    },
}

impl From<CompressionError> for crate::error::CommonError {
    fn from(err: CompressionError) -> Self {
        crate::error::CommonError::CompressionError(err.to_string())
    }
}

/// チャンク列を1本のストリームとして読む
struct ChunkReader<'a> {
    chunks: &'a [Vec<u8>],
    index: usize,
    offset: usize,
}

impl<'a> ChunkReader<'a> {
    fn new(chunks: &'a Chunks) -> Self {
        Self { chunks: &chunks.chunks, index: 0, offset: 0 }
    }
}

impl Read for ChunkReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while let Some(chunk) = self.chunks.get(self.index) {
            if self.offset < chunk.len() {
                let n = (chunk.len() - self.offset).min(buf.len());
                buf[..n].copy_from_slice(&chunk[self.offset..self.offset + n]);
                self.offset += n;
                return Ok(n);
            }
            // 次のチャンクへ
            self.index += 1;
            self.offset = 0;
        }
        Ok(0)
    }
}

/// zlib ストリームを `expected_size` バイトに展開
///
/// 展開結果が `expected_size` に満たない、または超える場合はエラーです。
pub fn inflate_exact(data: &Chunks, expected_size: usize) -> Result<Vec<u8>, CompressionError> {
    let mut decoder = ZlibDecoder::new(ChunkReader::new(data));
    let mut out = vec![0u8; expected_size];

    let mut filled = 0;
    while filled < expected_size {
        let n = decoder.read(&mut out[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    if filled != expected_size {
        return Err(CompressionError::SizeMismatch { expected: expected_size, actual: filled });
    }

    // 余剰データがないこと
    let mut probe = [0u8; 1];
    if decoder.read(&mut probe)? != 0 {
        return Err(CompressionError::SizeMismatch {
            expected: expected_size,
            actual: expected_size + 1,
        });
    }

    Ok(out)
}

/// zlib で圧縮
pub fn deflate(data: &[u8]) -> Result<Vec<u8>, CompressionError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inflate_multi_chunk() {
        let original: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let compressed = deflate(&original).expect("圧縮に失敗しました");

        // 3分割して渡す
        let third = compressed.len() / 3;
        let chunks = Chunks::from_vec(vec![
            compressed[..third].to_vec(),
            compressed[third..2 * third].to_vec(),
            compressed[2 * third..].to_vec(),
        ]);
        let inflated = inflate_exact(&chunks, original.len()).expect("展開に失敗しました");
        assert_eq!(inflated, original);
    }

    #[test]
    fn test_inflate_size_mismatch() {
        let compressed = deflate(&[1, 2, 3, 4]).expect("圧縮に失敗しました");
        let chunks = Chunks::single(compressed);
        assert!(matches!(
            inflate_exact(&chunks, 8),
            Err(CompressionError::SizeMismatch { expected: 8, actual: 4 })
        ));
        assert!(inflate_exact(&chunks, 2).is_err());
    }

    #[test]
    fn test_inflate_garbage() {
        let chunks = Chunks::single(vec![0xde, 0xad, 0xbe, 0xef]);
        assert!(inflate_exact(&chunks, 4).is_err());
    }
}
