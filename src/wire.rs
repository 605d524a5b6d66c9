//! Transfer header encoding and chunked payload I/O
//!
//! One transfer is a 4-byte little-endian length header followed by
//! exactly that many payload bytes. Payloads move in bounded chunks so
//! a single call never stages more than `chunk_size` bytes.

use anyhow::{bail, Context, Result};
use std::io::{Read, Write};

use crate::protocol::HEADER_LEN;

/// Encode a payload length as the 4-byte wire header.
pub fn encode_header(len: u32) -> [u8; HEADER_LEN] {
    len.to_le_bytes()
}

/// Decode the 4-byte wire header. Every bit pattern is a valid length.
pub fn decode_header(hdr: [u8; HEADER_LEN]) -> u32 {
    u32::from_le_bytes(hdr)
}

/// Write `data` in sequential chunks of at most `chunk_size` bytes.
/// Returns the total byte count on success; any write error aborts the
/// transfer mid-stream.
pub fn send_payload<W: Write>(w: &mut W, data: &[u8], chunk_size: usize) -> Result<usize> {
    debug_assert!(chunk_size >= 1);
    let mut sent = 0usize;
    while sent < data.len() {
        let end = data.len().min(sent + chunk_size);
        w.write_all(&data[sent..end])
            .with_context(|| format!("send failed after {} of {} bytes", sent, data.len()))?;
        sent = end;
    }
    Ok(sent)
}

/// Read exactly `expected_len` bytes in chunks of at most `chunk_size`.
/// A zero-length read before the full payload arrives means the peer
/// closed early and is reported as an incomplete transfer.
pub fn recv_payload<R: Read>(r: &mut R, expected_len: usize, chunk_size: usize) -> Result<Vec<u8>> {
    debug_assert!(chunk_size >= 1);
    let mut buf = vec![0u8; expected_len];
    let mut filled = 0usize;
    while filled < expected_len {
        let end = expected_len.min(filled + chunk_size);
        let n = r
            .read(&mut buf[filled..end])
            .with_context(|| format!("recv failed after {} of {} bytes", filled, expected_len))?;
        if n == 0 {
            bail!(
                "incomplete transfer: peer closed after {} of {} bytes",
                filled,
                expected_len
            );
        }
        filled += n;
    }
    Ok(buf)
}
