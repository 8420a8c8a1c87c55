//! Offset-tracking reads over the raw file bytes.

use crate::prelude::*;

/// A read-only view over the file bytes that remembers how far it has read.
///
/// Offsets are always absolute positions in the original buffer, even for cursors created with
/// [`Cursor::split`], so diagnostics can point at the exact byte.
/// Reads never panic: reading past the end of the view fails and leaves the cursor untouched.
#[derive(Copy, Clone, Debug)]
pub struct Cursor<'a> {
    raw: &'a [u8],
    offset: usize,
    end: usize,
}
impl<'a> Cursor<'a> {
    pub fn new(raw: &'a [u8]) -> Cursor<'a> {
        Cursor {
            raw,
            offset: 0,
            end: raw.len(),
        }
    }

    /// Absolute offset of the next byte to be read.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Absolute offset one past the last readable byte.
    #[inline]
    pub fn end(&self) -> usize {
        self.end
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.end - self.offset
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.offset >= self.end
    }

    /// Carve the next `len` bytes out into their own cursor and skip over them.
    ///
    /// Returns `None` if fewer than `len` bytes remain.
    pub fn split(&mut self, len: usize) -> Option<Cursor<'a>> {
        if len > self.remaining() {
            return None;
        }
        let sub = Cursor {
            raw: self.raw,
            offset: self.offset,
            end: self.offset + len,
        };
        self.offset += len;
        Some(sub)
    }

    /// Like `split`, but takes whatever is left if fewer than `len` bytes remain.
    pub fn split_lossy(&mut self, len: usize) -> Cursor<'a> {
        let len = len.min(self.remaining());
        let sub = Cursor {
            raw: self.raw,
            offset: self.offset,
            end: self.offset + len,
        };
        self.offset += len;
        sub
    }

    /// Step back over the last byte read.
    ///
    /// Used to un-read a data byte that turned out to rely on running status.
    pub fn rewind(&mut self, bytes: usize) {
        self.offset = self.offset.saturating_sub(bytes);
    }

    /// Jump to the end of the view, discarding anything unread.
    pub fn skip_to_end(&mut self) {
        self.offset = self.end;
    }

    pub fn peek_u8(&self) -> Option<u8> {
        if self.is_empty() {
            None
        } else {
            Some(self.raw[self.offset])
        }
    }

    pub fn read_u8(&mut self) -> StdResult<u8, &'static ErrorKind> {
        let byte = self
            .peek_u8()
            .ok_or(err_invalid!("unexpected eof while reading byte"))?;
        self.offset += 1;
        Ok(byte)
    }

    /// Read `len` raw bytes.
    pub fn read_bytes(&mut self, len: usize) -> StdResult<&'a [u8], &'static ErrorKind> {
        ensure!(
            len <= self.remaining(),
            err_invalid!("unexpected eof while reading bytes")
        );
        let bytes = &self.raw[self.offset..self.offset + len];
        self.offset += len;
        Ok(bytes)
    }

    /// Read `len` bytes of text.
    ///
    /// Files in the wild carry all sorts of 8-bit encodings, so invalid UTF-8 is replaced
    /// rather than rejected.
    pub fn read_ascii(&mut self, len: usize) -> StdResult<String, &'static ErrorKind> {
        let bytes = self.read_bytes(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Reads a big-endian 16-bit integer.
    pub fn read_u16be(&mut self) -> StdResult<u16, &'static ErrorKind> {
        let bytes = self
            .read_bytes(2)
            .map_err(|_| err_invalid!("failed to read 16-bit integer"))?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Reads a 4-byte big-endian size field.
    pub fn read_u32be_fixed4(&mut self) -> StdResult<u32, &'static ErrorKind> {
        let bytes = self
            .read_bytes(4)
            .map_err(|_| err_invalid!("failed to read 32-bit integer"))?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads a 3-byte big-endian integer, as used by tempo events.
    pub fn read_u24be(&mut self) -> StdResult<u24, &'static ErrorKind> {
        let bytes = self
            .read_bytes(3)
            .map_err(|_| err_invalid!("failed to read 24-bit integer"))?;
        Ok(u24::from(bytes.iter().fold(0, |acc, byte| {
            acc << 8 | *byte as u32
        })))
    }

    /// Reads a MIDI variable-length quantity.
    ///
    /// Seven bits per byte, most significant group first, top bit set on every byte but the
    /// last. At most 4 bytes (28 bits) are allowed.
    pub fn read_varlen(&mut self) -> StdResult<u28, &'static ErrorKind> {
        let start = self.offset;
        let mut int: u32 = 0;
        for _ in 0..4 {
            let byte = match self.read_u8() {
                Ok(byte) => byte,
                Err(_) => {
                    self.offset = start;
                    bail!(err_invalid!("unexpected eof while reading varlen int"));
                }
            };
            int <<= 7;
            int |= bit_range(byte, 0..7) as u32;
            if bit_range(byte, 7..8) == 0 {
                //At most 4 reads of 7 bits each, so the int fits in 28 bits
                return Ok(u28::from(int));
            }
        }
        self.offset = start;
        Err(err_malformed!("varlen integer larger than 4 bytes"))
    }

    /// Reads a slice represented in the input as a varlen `len` followed by `len` bytes.
    pub fn read_varlen_slice(&mut self) -> Result<&'a [u8]> {
        let len = self
            .read_varlen()
            .context(err_invalid!("failed to read varlen slice length"))?
            .as_int();
        Ok(self
            .read_bytes(len as usize)
            .context(err_invalid!("incomplete varlen slice"))?)
    }
}
