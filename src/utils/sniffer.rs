use std::io::Cursor;
use tokio::io::{AsyncRead, AsyncReadExt, Chain};

/// Only the first 512 bytes are inspected to detect the media type
pub const SNIFF_LEN: usize = 512;

/// A stream whose leading bytes were inspected.
///
/// `reader` replays the inspected prefix before the rest of the source,
/// so copying it transfers the complete file.
pub struct Sniffed<R> {
    pub mime_type: &'static str,
    pub reader: Chain<Cursor<Vec<u8>>, R>,
}

/// Reads up to [`SNIFF_LEN`] bytes, stopping early only at end of stream.
pub async fn read_prefix<R>(reader: &mut R) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = vec![0u8; SNIFF_LEN];
    let mut n = 0;
    while n < SNIFF_LEN {
        let read = reader.read(&mut buffer[n..]).await?;
        if read == 0 {
            break;
        }
        n += read;
    }
    buffer.truncate(n);
    Ok(buffer)
}

/// Classifies content by its magic bytes alone.
///
/// Unknown binary data and empty input both yield `application/octet-stream`.
pub fn detect_mime_type(prefix: &[u8]) -> &'static str {
    let prefix = &prefix[..prefix.len().min(SNIFF_LEN)];

    if let Some(kind) = infer::get(prefix) {
        return kind.mime_type();
    }

    if prefix.is_empty() || prefix.iter().any(|&b| is_binary_byte(b)) {
        mime::APPLICATION_OCTET_STREAM.as_ref()
    } else {
        mime::TEXT_PLAIN.as_ref()
    }
}

/// Sniffs the media type of `reader` and hands back a stream positioned at the start.
pub async fn sniff<R>(mut reader: R) -> std::io::Result<Sniffed<R>>
where
    R: AsyncRead + Unpin,
{
    let prefix = read_prefix(&mut reader).await?;
    let mime_type = detect_mime_type(&prefix);

    Ok(Sniffed {
        mime_type,
        reader: Cursor::new(prefix).chain(reader),
    })
}

// Control bytes that never appear in text (tab, LF, FF, CR and ESC are allowed)
fn is_binary_byte(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}
