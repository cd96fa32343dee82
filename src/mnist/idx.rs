//! IDX形式（MNIST配布形式）のパーサー
//!
//! ヘッダーはすべてビッグエンディアンの u32。
//! - 画像: magic(2051), 枚数, 行数, 列数, 以降ピクセル(u8)
//! - ラベル: magic(2049), 件数, 以降ラベル(u8)

/// 画像ファイルのマジックナンバー
pub const IMAGE_MAGIC: u32 = 2051;
/// ラベルファイルのマジックナンバー
pub const LABEL_MAGIC: u32 = 2049;

const IMAGE_HEADER_LEN: usize = 16;
const LABEL_HEADER_LEN: usize = 8;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IdxError {
    #[error("IDX header truncated: need {needed} bytes, got {actual}")]
    TruncatedHeader { needed: usize, actual: usize },
    #[error("Unexpected IDX magic number: expected {expected}, got {actual}")]
    BadMagic { expected: u32, actual: u32 },
    #[error("Requested {requested} items but the file holds only {available}")]
    CountTooLarge { requested: usize, available: usize },
    #[error("IDX payload truncated: need {needed} bytes, got {actual}")]
    TruncatedPayload { needed: usize, actual: usize },
    #[error("IDX header dimensions overflow: {count} x {rows} x {cols}")]
    HeaderOverflow { count: usize, rows: usize, cols: usize },
}

/// パース済み画像データ（行優先で連結）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdxImages {
    pub pixels: Vec<u8>,
    pub count: usize,
    pub rows: usize,
    pub cols: usize,
}

fn read_u32_be(buffer: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        buffer[offset],
        buffer[offset + 1],
        buffer[offset + 2],
        buffer[offset + 3],
    ])
}

fn check_header(buffer: &[u8], header_len: usize, magic: u32) -> Result<(), IdxError> {
    if buffer.len() < header_len {
        return Err(IdxError::TruncatedHeader {
            needed: header_len,
            actual: buffer.len(),
        });
    }
    let actual = read_u32_be(buffer, 0);
    if actual != magic {
        return Err(IdxError::BadMagic {
            expected: magic,
            actual,
        });
    }
    Ok(())
}

/// ヘッダーに記録された件数（画像・ラベル共通、magic は検証する）
pub fn header_count(buffer: &[u8], magic: u32) -> Result<usize, IdxError> {
    check_header(buffer, LABEL_HEADER_LEN, magic)?;
    Ok(read_u32_be(buffer, 4) as usize)
}

fn resolve_count(requested: Option<usize>, available: usize) -> Result<usize, IdxError> {
    match requested {
        Some(requested) if requested > available => {
            Err(IdxError::CountTooLarge { requested, available })
        }
        Some(requested) => Ok(requested),
        None => Ok(available),
    }
}

/// 画像ファイルをパース
///
/// `count` が `None` の場合はファイル内の全画像を読み込む。
pub fn parse_images(buffer: &[u8], count: Option<usize>) -> Result<IdxImages, IdxError> {
    check_header(buffer, IMAGE_HEADER_LEN, IMAGE_MAGIC)?;

    let available = read_u32_be(buffer, 4) as usize;
    let rows = read_u32_be(buffer, 8) as usize;
    let cols = read_u32_be(buffer, 12) as usize;
    let count = resolve_count(count, available)?;

    let needed = count
        .checked_mul(rows)
        .and_then(|n| n.checked_mul(cols))
        .and_then(|n| n.checked_add(IMAGE_HEADER_LEN))
        .ok_or(IdxError::HeaderOverflow { count, rows, cols })?;
    if buffer.len() < needed {
        return Err(IdxError::TruncatedPayload {
            needed,
            actual: buffer.len(),
        });
    }

    Ok(IdxImages {
        pixels: buffer[IMAGE_HEADER_LEN..needed].to_vec(),
        count,
        rows,
        cols,
    })
}

/// ラベルファイルをパース
pub fn parse_labels(buffer: &[u8], count: Option<usize>) -> Result<Vec<u8>, IdxError> {
    check_header(buffer, LABEL_HEADER_LEN, LABEL_MAGIC)?;

    let available = read_u32_be(buffer, 4) as usize;
    let count = resolve_count(count, available)?;

    let needed = count.checked_add(LABEL_HEADER_LEN).ok_or(IdxError::HeaderOverflow {
        count,
        rows: 1,
        cols: 1,
    })?;
    if buffer.len() < needed {
        return Err(IdxError::TruncatedPayload {
            needed,
            actual: buffer.len(),
        });
    }

    Ok(buffer[LABEL_HEADER_LEN..needed].to_vec())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn image_file(count: u32, rows: u32, cols: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&IMAGE_MAGIC.to_be_bytes());
        buf.extend_from_slice(&count.to_be_bytes());
        buf.extend_from_slice(&rows.to_be_bytes());
        buf.extend_from_slice(&cols.to_be_bytes());
        for i in 0..(count * rows * cols) {
            buf.push((i % 256) as u8);
        }
        buf
    }

    pub(crate) fn label_file(labels: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&LABEL_MAGIC.to_be_bytes());
        buf.extend_from_slice(&(labels.len() as u32).to_be_bytes());
        buf.extend_from_slice(labels);
        buf
    }

    #[test]
    fn test_parse_images() {
        let buf = image_file(3, 2, 2);
        let images = parse_images(&buf, None).unwrap();
        assert_eq!(images.count, 3);
        assert_eq!(images.rows, 2);
        assert_eq!(images.cols, 2);
        assert_eq!(images.pixels.len(), 12);
        assert_eq!(&images.pixels[4..8], &[4, 5, 6, 7]);
    }

    #[test]
    fn test_parse_images_with_count() {
        let buf = image_file(3, 2, 2);
        let images = parse_images(&buf, Some(2)).unwrap();
        assert_eq!(images.count, 2);
        assert_eq!(images.pixels.len(), 8);
    }

    #[test]
    fn test_count_too_large() {
        let buf = label_file(&[1, 2, 3]);
        assert_eq!(
            parse_labels(&buf, Some(4)),
            Err(IdxError::CountTooLarge {
                requested: 4,
                available: 3
            })
        );
    }

    #[test]
    fn test_bad_magic() {
        let buf = label_file(&[1, 2, 3]);
        let err = parse_images(&buf, None).unwrap_err();
        assert!(matches!(err, IdxError::TruncatedHeader { .. } | IdxError::BadMagic { .. }));

        let buf = image_file(1, 1, 1);
        assert_eq!(
            parse_labels(&buf, None),
            Err(IdxError::BadMagic {
                expected: LABEL_MAGIC,
                actual: IMAGE_MAGIC
            })
        );
    }

    #[test]
    fn test_truncated_payload() {
        let mut buf = image_file(2, 2, 2);
        buf.truncate(buf.len() - 1);
        assert!(matches!(
            parse_images(&buf, None),
            Err(IdxError::TruncatedPayload { .. })
        ));
    }

    #[test]
    fn test_oversized_header_dimensions() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&IMAGE_MAGIC.to_be_bytes());
        for _ in 0..3 {
            buf.extend_from_slice(&u32::MAX.to_be_bytes());
        }
        assert!(matches!(
            parse_images(&buf, None),
            Err(IdxError::HeaderOverflow { .. })
        ));
        assert!(matches!(
            parse_images(&buf, Some(1)),
            Err(IdxError::HeaderOverflow { .. })
        ));
    }

    #[test]
    fn test_header_count() {
        assert_eq!(header_count(&image_file(5, 2, 2), IMAGE_MAGIC), Ok(5));
        assert_eq!(header_count(&label_file(&[1, 2]), LABEL_MAGIC), Ok(2));
        assert!(header_count(&[0, 0], LABEL_MAGIC).is_err());
    }
}
