//! Length-prefixed payload frame
//!
//! Layout: `be_u16(len(prefix ++ body)) ++ prefix ++ body ++ 0x00 padding`, with
//! the total a multiple of the chunk size. Decoders read the length field and
//! discard everything after it, so trailing zeros in the body survive.

use crate::errors::{AppError, AppResult};
use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

/// Largest prefix + body the 16-bit length field can describe
pub const MAX_FRAME_CONTENT: usize = u16::MAX as usize;

/// Width of the length field
pub const LENGTH_FIELD_LEN: usize = 2;

/// Build a padded frame around `prefix ++ body`
pub fn frame(prefix: &[u8], body: &[u8], chunk_size: usize) -> AppResult<Vec<u8>> {
    if chunk_size == 0 {
        return Err(AppError::InvalidData(
            "Chunk size must be greater than zero".to_string(),
        ));
    }

    let content_len = prefix.len() + body.len();
    if content_len > MAX_FRAME_CONTENT {
        return Err(AppError::PayloadTooLarge {
            size: content_len,
            max: MAX_FRAME_CONTENT,
        });
    }

    let unpadded = LENGTH_FIELD_LEN + content_len;
    let padded = unpadded.div_ceil(chunk_size) * chunk_size;

    let mut out = Vec::with_capacity(padded);
    out.write_u16::<BigEndian>(content_len as u16)?;
    out.extend_from_slice(prefix);
    out.extend_from_slice(body);
    out.resize(padded, 0);

    Ok(out)
}

/// Recover `prefix ++ body` from a frame, ignoring padding
pub fn unframe(frame: &[u8]) -> AppResult<Vec<u8>> {
    if frame.len() < LENGTH_FIELD_LEN {
        return Err(AppError::InvalidData(format!(
            "Frame of {} bytes has no length field",
            frame.len()
        )));
    }

    let content_len = BigEndian::read_u16(&frame[..LENGTH_FIELD_LEN]) as usize;
    let end = LENGTH_FIELD_LEN + content_len;
    if end > frame.len() {
        return Err(AppError::InvalidData(format!(
            "Frame declares {} content bytes but only {} are present",
            content_len,
            frame.len() - LENGTH_FIELD_LEN
        )));
    }

    Ok(frame[LENGTH_FIELD_LEN..end].to_vec())
}

/// Number of chunks a frame of `content_len` bytes occupies
pub fn chunk_count(content_len: usize, chunk_size: usize) -> usize {
    (LENGTH_FIELD_LEN + content_len).div_ceil(chunk_size)
}
