//! Simple building-block data that can be read in one go.
//! All primitives have a known, fixed size.

use crate::prelude::*;

/// Slightly restricted integers.
macro_rules! restricted_int {
    {$(#[$attr:meta])* $name:ident : $inner:tt => $bits:expr} => {
        $(#[$attr])*
        #[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Hash, Default)]
        #[repr(transparent)]
        #[allow(non_camel_case_types)]
        pub struct $name($inner);
        impl From<$inner> for $name {
            /// Lossy conversion, loses top bits.
            #[inline]
            fn from(raw: $inner) -> $name {
                $name::new(raw)
            }
        }
        impl From<$name> for $inner {
            #[inline]
            fn from(restricted: $name) -> $inner {restricted.0}
        }
        impl fmt::Display for $name {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
        impl $name {
            const MASK: $inner = (1 << $bits) - 1;

            /// The maximum value that this restricted integer can hold.
            #[inline]
            pub const fn max_value() -> $name {
                $name (Self::MASK)
            }

            /// Creates a restricted int from its non-restricted counterpart by masking off the
            /// extra bits.
            #[inline]
            pub const fn new(raw: $inner) -> $name {
                $name (raw & Self::MASK)
            }

            /// Returns `Some` if the raw integer is within range of the restricted integer, and
            /// `None` otherwise.
            #[inline]
            pub fn try_from(raw: $inner) -> Option<$name> {
                if raw <= Self::MASK {
                    Some($name(raw))
                }else{
                    None
                }
            }

            /// Get the inner integer out of the wrapper.
            /// The inner integer is guaranteed to be in range of the restricted wrapper.
            #[inline]
            pub const fn as_int(self) -> $inner {
                self.0
            }

            #[inline]
            pub(crate) fn check_int(raw: $inner) -> StdResult<$name, &'static ErrorKind> {
                Self::try_from(raw).ok_or_else(
                    || err_invalid!("invalid integer with top bits set")
                )
            }
        }
        impl PartialEq<$inner> for $name {
            fn eq(&self, rhs: &$inner) -> bool {
                self.as_int() == *rhs
            }
        }
        impl PartialOrd<$inner> for $name {
            fn partial_cmp(&self, rhs: &$inner) -> Option<core::cmp::Ordering> {
                Some(self.as_int().cmp(rhs))
            }
        }
    };
}
restricted_int! {
    /// A 15-bit integer type.
    ///
    /// Wraps the `u16` type and ensures that the top bit is always zero.
    u15: u16 => 15
}
restricted_int! {
    /// A 14-bit integer type.
    ///
    /// Wraps the `u16` type and ensures that the top two bits are always zero.
    u14: u16 => 14
}
restricted_int! {
    /// A 7-bit integer type.
    ///
    /// Wraps the `u8` type and ensures that the top bit is always zero.
    u7: u8 => 7
}
restricted_int! {
    /// A 4-bit integer type.
    ///
    /// Wraps the `u8` type and ensures that the top 4 bits are always zero.
    u4: u8 => 4
}
restricted_int! {
    /// A 24-bit integer type.
    ///
    /// Wraps the `u32` type and ensures that the top 8 bits are always zero.
    u24: u32 => 24
}
restricted_int! {
    /// Referred to in the MIDI standard as "variable length int".
    u28: u32 => 28
}

/// The order in which tracks should be laid out when playing back this SMF file.
///
/// Format 2 files (several independent songs in one file) cannot be played and are rejected.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum Format {
    /// This file should have a single track only.
    ///
    /// Only the first track is read, whatever the declared track count.
    SingleTrack,
    /// This file has several tracks that should be played simultaneously.
    ///
    /// Usually the first track controls tempo and other song metadata.
    Parallel,
}
impl Format {
    pub(crate) fn from_code(code: u16) -> Result<Format> {
        Ok(match code {
            0 => Format::SingleTrack,
            1 => Format::Parallel,
            _ => bail!(err_unsupported!("only smf formats 0 and 1 are supported")),
        })
    }

    /// The raw format number, as stored in the header chunk.
    pub fn as_code(self) -> u16 {
        match self {
            Format::SingleTrack => 0,
            Format::Parallel => 1,
        }
    }
}

/// The timing for an SMF file, as declared by the header `division` field.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum Timing {
    /// Specifies ticks/beat as a 15-bit integer.
    ///
    /// The length of a beat is not standard, so in order to fully describe the length of a MIDI
    /// tick the [`MetaMessage::Tempo`](enum.MetaMessage.html#variant.Tempo) event should be
    /// present.
    Metrical(u15),
    /// Specifies ticks/second by dividing a second into frames and then into subframes.
    ///
    /// `fps` is the positive frame rate decoded from the negative two's complement byte.
    Timecode { fps: u8, ticks_per_frame: u8 },
}
impl Timing {
    pub(crate) fn from_division(raw: u16) -> Timing {
        if bit_range(raw, 15..16) != 0 {
            //Negative smpte format in the top byte, ticks per frame in the bottom byte
            let frames_byte = bit_range(raw, 8..16);
            Timing::Timecode {
                fps: (256 - frames_byte) as u8,
                ticks_per_frame: bit_range(raw, 0..8) as u8,
            }
        } else {
            Timing::Metrical(u15::from(raw))
        }
    }

    /// How many ticks make up a quarter note.
    ///
    /// For timecode files this is `fps * ticks_per_frame`.
    pub fn ticks_per_quarter(&self) -> u32 {
        match *self {
            Timing::Metrical(tpq) => tpq.as_int() as u32,
            Timing::Timecode {
                fps,
                ticks_per_frame,
            } => fps as u32 * ticks_per_frame as u32,
        }
    }
}
