//! There's an abomination called RMID, MIDI embedded in a RIFF file.
//! Support for these files is provided by unwrapping the input slice, stripping away the RIFF
//! wrappers around the raw SMF file.

use crate::{cursor::Cursor, prelude::*};

/// Reads RIFF chunks, whose lengths are little-endian and padded to an even size.
struct RiffChunks<'a>(Cursor<'a>);
impl<'a> Iterator for RiffChunks<'a> {
    type Item = (&'a [u8], &'a [u8]);
    fn next(&mut self) -> Option<(&'a [u8], &'a [u8])> {
        let id = self.0.read_bytes(4).ok()?;
        let len = self.0.read_bytes(4).ok()?;
        let len = u32::from_le_bytes([len[0], len[1], len[2], len[3]]) as usize;
        let mut data = self.0.split_lossy(len);
        if len % 2 == 1 {
            let _pad = self.0.read_u8();
        }
        let len = data.remaining();
        Some((id, data.read_bytes(len).ok()?))
    }
}

/// Get the embedded SMF out of an RMID file.
///
/// Fails if `raw` is not an RMID file at all, in which case it should be parsed as a plain SMF.
pub(crate) fn unwrap(raw: &[u8]) -> Result<&[u8]> {
    let (id, riff) = RiffChunks(Cursor::new(raw))
        .next()
        .ok_or(err_invalid!("no main riff chunk"))?;
    ensure!(id == b"RIFF", err_invalid!("invalid main riff chunk"));
    let mut riff = Cursor::new(riff);
    let formtype = riff
        .read_bytes(4)
        .context(err_invalid!("failed to read riff formtype"))?;
    ensure!(formtype == b"RMID", err_invalid!("not an rmid riff file"));
    for (id, chunk) in RiffChunks(riff) {
        if id == b"data" {
            tracing::debug!(len = chunk.len(), "unwrapped rmid data chunk");
            return Ok(chunk);
        }
    }
    bail!(err_invalid!("no rmid data chunk"))
}
