use crate::backend::ClientId;
use std::{fmt, io, path::PathBuf};

#[cfg(debug_assertions)]
mod error_impl {
    use super::{Error, ErrorExt, ErrorKind};

    pub type ErrorInner = Box<Chained>;

    #[derive(Clone, Debug)]
    pub struct Chained {
        this: &'static ErrorKind,
        src: Option<Error>,
    }
    impl ErrorExt for Error {
        #[inline]
        fn kind(&self) -> ErrorKind {
            *self.inner.this
        }
        #[inline]
        fn source(&self) -> Option<&Error> {
            self.inner.src.as_ref()
        }
        #[inline]
        fn chain_ctx(self, ctx: &'static ErrorKind) -> Error {
            Error {
                inner: Chained {
                    this: ctx,
                    src: Some(self),
                }
                .into(),
            }
        }
    }
    impl From<&'static ErrorKind> for Error {
        #[inline]
        fn from(kind: &'static ErrorKind) -> Error {
            Error {
                inner: Chained {
                    this: kind,
                    src: None,
                }
                .into(),
            }
        }
    }
}

#[cfg(not(debug_assertions))]
mod error_impl {
    use super::{Error, ErrorExt, ErrorKind};

    /// In release mode errors are just a thin pointer.
    pub type ErrorInner = &'static ErrorKind;
    impl ErrorExt for Error {
        #[inline]
        fn kind(&self) -> ErrorKind {
            *self.inner
        }
        #[inline]
        fn source(&self) -> Option<&Error> {
            None
        }
        #[inline]
        fn chain_ctx(self, ctx: &'static ErrorKind) -> Error {
            Error { inner: ctx }
        }
    }
    impl From<&'static ErrorKind> for Error {
        #[inline]
        fn from(inner: &'static ErrorKind) -> Error {
            Error { inner }
        }
    }
}

/// Represents an error while parsing an SMF file.
///
/// This type wraps an `ErrorKind` and keeps the chain of context it was raised through in
/// debug mode.
/// In release mode it is a thin pointer to a static `ErrorKind`, so `Error::source` always
/// returns `None`.
///
/// For the policy on which errors abort parsing, see [`ErrorKind`](enum.ErrorKind.html).
#[derive(Clone)]
pub struct Error {
    inner: self::error_impl::ErrorInner,
}
impl Error {
    /// Create a new error with the given `ErrorKind`.
    #[inline]
    pub fn new(kind: &'static ErrorKind) -> Error {
        Error::from(kind)
    }

    /// More information about the error itself.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        ErrorExt::kind(self)
    }

    /// The underlying cause for this error.
    ///
    /// Always `None` in release mode, since error chains are not tracked in release.
    #[inline]
    pub fn source(&self) -> Option<&Error> {
        ErrorExt::source(self)
    }

    /// Wrap this error as the cause of a new error of kind `ctx`.
    #[inline]
    pub(crate) fn chain(self, ctx: &'static ErrorKind) -> Error {
        self.chain_ctx(ctx)
    }

    /// Whether parsing can carry on past this error.
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        match self.kind() {
            ErrorKind::Malformed(_) => true,
            ErrorKind::Invalid(_) | ErrorKind::Unsupported(_) => false,
        }
    }
}
impl fmt::Display for Error {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.kind(), f)
    }
}
impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.kind())?;
        let mut maybe_src = self.source();
        while let Some(src) = maybe_src {
            writeln!(f)?;
            write!(f, "  caused by: {}", src.kind())?;
            maybe_src = src.source();
        }
        Ok(())
    }
}
impl std::error::Error for Error {
    #[inline]
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

trait ErrorExt {
    fn kind(&self) -> ErrorKind;
    fn source(&self) -> Option<&Error>;
    fn chain_ctx(self, ctx: &'static ErrorKind) -> Error;
}

/// The type of error that occurred while parsing.
///
/// Errors are broadly categorized into fatal and recoverable classes, and the specific part of
/// the file that was not respected is provided as a non-normative string literal.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Fatal errors while reading the file. It is likely that the file is not a MIDI file or
    /// is severely corrupted.
    ///
    /// No information about the file could be rescued.
    Invalid(&'static str),

    /// Fatal, the file is readable but describes something that cannot be played, such as an
    /// SMF format 2 file.
    Unsupported(&'static str),

    /// Non-fatal error, but the file is clearly corrupted.
    ///
    /// By default these are logged, collected as [`Warning`](struct.Warning.html)s and parsing
    /// continues with whatever data could be decoded.
    /// With the `strict` crate feature enabled they abort parsing instead.
    Malformed(&'static str),
}
impl ErrorKind {
    /// Get the informative message on what exact part of the MIDI format was not respected.
    #[inline]
    pub fn message(&self) -> &'static str {
        match *self {
            ErrorKind::Invalid(msg) => msg,
            ErrorKind::Unsupported(msg) => msg,
            ErrorKind::Malformed(msg) => msg,
        }
    }
}
impl fmt::Display for ErrorKind {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorKind::Invalid(msg) => write!(f, "invalid midi: {}", msg),
            ErrorKind::Unsupported(msg) => write!(f, "unsupported midi: {}", msg),
            ErrorKind::Malformed(msg) => write!(f, "malformed midi: {}", msg),
        }
    }
}

macro_rules! err_invalid {
    ($msg:expr) => {{
        const ERR_KIND: &'static ErrorKind = &ErrorKind::Invalid($msg);
        ERR_KIND
    }};
}
macro_rules! err_unsupported {
    ($msg:expr) => {{
        const ERR_KIND: &'static ErrorKind = &ErrorKind::Unsupported($msg);
        ERR_KIND
    }};
}
macro_rules! err_malformed {
    ($msg:expr) => {{
        const ERR_KIND: &'static ErrorKind = &ErrorKind::Malformed($msg);
        ERR_KIND
    }};
}

pub(crate) trait ResultExt<T> {
    fn context(self, ctx: &'static ErrorKind) -> StdResult<T, Error>;
}
impl<T> ResultExt<T> for StdResult<T, Error> {
    #[inline]
    fn context(self, ctx: &'static ErrorKind) -> StdResult<T, Error> {
        self.map_err(|err| err.chain_ctx(ctx))
    }
}
impl<T> ResultExt<T> for StdResult<T, &'static ErrorKind> {
    #[inline]
    fn context(self, ctx: &'static ErrorKind) -> StdResult<T, Error> {
        self.map_err(|errkind| Error::from(errkind).chain_ctx(ctx))
    }
}

/// The result type used by the MIDI parser.
pub type Result<T> = StdResult<T, Error>;
pub(crate) use std::result::Result as StdResult;

/// A recoverable problem found while parsing, kept alongside the parsed file.
#[derive(Clone, Debug)]
pub struct Warning {
    /// The track being decoded when the problem was found, `None` for file-level problems.
    pub track: Option<usize>,
    /// Byte offset into the file.
    pub offset: usize,
    pub error: Error,
}
impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.track {
            Some(track) => write!(f, "track {} @{}: {}", track, self.offset, self.error),
            None => write!(f, "@{}: {}", self.offset, self.error),
        }
    }
}

/// Collects recoverable problems while parsing.
///
/// Every reported problem is logged.
/// With the `strict` feature, reporting fails instead, turning the problem into a hard error.
#[derive(Debug, Default)]
pub(crate) struct Diagnostics {
    pub track: Option<usize>,
    warnings: Vec<Warning>,
}
impl Diagnostics {
    pub fn report(&mut self, offset: usize, err: impl Into<Error>) -> Result<()> {
        let error = err.into();
        if cfg!(feature = "strict") {
            return Err(error);
        }
        match self.track {
            Some(track) => tracing::warn!(track, offset, "{}", error),
            None => tracing::warn!(offset, "{}", error),
        }
        self.warnings.push(Warning {
            track: self.track,
            offset,
            error,
        });
        Ok(())
    }

    /// Record a problem that is expected in compliant files too, so it never escalates.
    pub fn tolerate(&mut self, offset: usize, err: impl Into<Error>) {
        let error = err.into();
        tracing::warn!(track = ?self.track, offset, "{}", error);
        self.warnings.push(Warning {
            track: self.track,
            offset,
            error,
        });
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }
}

/// Fatal problems while loading a MIDI file from disk.
#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("midi file does not exist: {0}")]
    NotFound(PathBuf),
    #[error("error reading midi file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("midi file too small: {len} bytes, at least {min} expected")]
    TooSmall { len: usize, min: usize },
    #[error(transparent)]
    Parse(#[from] Error),
}

/// Failures reported by a sequencer backend when scheduling or sending.
///
/// These are never fatal for playback: they are logged and the next command is sent.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("unknown sequencer client {0:?}")]
    UnknownClient(ClientId),
    #[error("sequencer is no longer running")]
    Disconnected,
    #[error("device error: {0}")]
    Device(String),
}
