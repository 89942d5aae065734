use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::panic::Location;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphicsError>;

/// Failure kinds reported by the graphics and imaging layers.
///
/// Every status has a stable numeric code; the CLI prints it in its
/// diagnostic line, so the values must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    OutOfMemory,
    InvalidArg,
    FileNotFound,
    PathNotFound,
    AccessDenied,
    Io,
    InvalidMarkup,
    InvalidSize,
    WrongFactory,
    NoHardwareDevice,
    NoInterface,
    UnsupportedPixelFormat,
    WrongState,
    NotInitialized,
    FrameMissing,
    CodecFailure,
}

impl Status {
    pub fn code(self) -> u32 {
        match self {
            Status::OutOfMemory => 0x8007_000E,
            Status::InvalidArg => 0x8007_0057,
            Status::FileNotFound => 0x8007_0002,
            Status::PathNotFound => 0x8007_0003,
            Status::AccessDenied => 0x8007_0005,
            Status::Io => 0x8003_0005,
            Status::InvalidMarkup => 0x8899_0001,
            Status::InvalidSize => 0x8899_0002,
            Status::WrongFactory => 0x8899_0003,
            Status::NoHardwareDevice => 0x8899_0004,
            Status::NoInterface => 0x8000_4002,
            Status::UnsupportedPixelFormat => 0x8898_2F80,
            Status::WrongState => 0x8898_2F04,
            Status::NotInitialized => 0x8898_2F0C,
            Status::FrameMissing => 0x8898_2F90,
            Status::CodecFailure => 0x8898_2F61,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Status::OutOfMemory => "out of memory",
            Status::InvalidArg => "invalid argument",
            Status::FileNotFound => "file not found",
            Status::PathNotFound => "path not found",
            Status::AccessDenied => "access denied",
            Status::Io => "i/o failure",
            Status::InvalidMarkup => "invalid svg markup",
            Status::InvalidSize => "document has no usable size",
            Status::WrongFactory => "object belongs to another device context",
            Status::NoHardwareDevice => "no hardware device available",
            Status::NoInterface => "capability not supported",
            Status::UnsupportedPixelFormat => "unsupported pixel format",
            Status::WrongState => "operation invalid in current state",
            Status::NotInitialized => "object not initialized",
            Status::FrameMissing => "no frame committed",
            Status::CodecFailure => "codec failure",
        }
    }

    /// Classify an I/O failure by its kind.
    pub fn from_io(err: &io::Error) -> Status {
        match err.kind() {
            io::ErrorKind::NotFound => Status::FileNotFound,
            io::ErrorKind::PermissionDenied => Status::AccessDenied,
            io::ErrorKind::OutOfMemory => Status::OutOfMemory,
            io::ErrorKind::InvalidInput => Status::InvalidArg,
            _ => Status::Io,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// A failed graphics, imaging or filesystem operation.
///
/// `site` is the source location that detected the failure, not the place
/// where the error was eventually reported.
#[derive(Debug, Error)]
#[error("{}:{}: bad status 0x{:08x} ({})", .site.file(), .site.line(), .status.code(), .status)]
pub struct GraphicsError {
    status: Status,
    site: &'static Location<'static>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl GraphicsError {
    #[track_caller]
    pub fn new(status: Status) -> Self {
        GraphicsError {
            status,
            site: Location::caller(),
            source: None,
        }
    }

    #[track_caller]
    pub fn with_source<E>(status: Status, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        GraphicsError {
            status,
            site: Location::caller(),
            source: Some(Box::new(source)),
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn code(&self) -> u32 {
        self.status.code()
    }

    pub fn site(&self) -> &'static Location<'static> {
        self.site
    }
}

impl From<io::Error> for GraphicsError {
    #[track_caller]
    fn from(err: io::Error) -> Self {
        GraphicsError::with_source(Status::from_io(&err), err)
    }
}

/// Turns results from the collaborating crates into [`GraphicsError`]s,
/// recording the caller as the failure site.
pub(crate) trait Check<T> {
    fn check(self, status: Status) -> Result<T>;
}

impl<T, E> Check<T> for std::result::Result<T, E>
where
    E: StdError + Send + Sync + 'static,
{
    #[track_caller]
    fn check(self, status: Status) -> Result<T> {
        match self {
            Ok(value) => Ok(value),
            Err(err) => Err(GraphicsError::with_source(status, err)),
        }
    }
}

impl<T> Check<T> for Option<T> {
    #[track_caller]
    fn check(self, status: Status) -> Result<T> {
        match self {
            Some(value) => Ok(value),
            None => Err(GraphicsError::new(status)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_points_at_the_check() {
        let line = line!() + 1;
        let err = None::<()>.check(Status::InvalidArg).unwrap_err();
        assert_eq!(err.site().file(), file!());
        assert_eq!(err.site().line(), line);
        assert_eq!(err.status(), Status::InvalidArg);
    }

    #[test]
    fn diagnostic_line_format() {
        let err = GraphicsError::new(Status::OutOfMemory);
        let text = err.to_string();
        assert!(text.starts_with(file!()), "{}", text);
        assert!(text.contains(": bad status 0x8007000e (out of memory)"), "{}", text);
    }

    #[test]
    fn io_errors_keep_their_source() {
        let io = io::Error::new(io::ErrorKind::NotFound, "gone");
        let err = GraphicsError::from(io);
        assert_eq!(err.status(), Status::FileNotFound);
        assert_eq!(err.source().map(|s| s.to_string()).as_deref(), Some("gone"));
    }

    #[test]
    fn codes_are_distinct() {
        let all = [
            Status::OutOfMemory,
            Status::InvalidArg,
            Status::FileNotFound,
            Status::PathNotFound,
            Status::AccessDenied,
            Status::Io,
            Status::InvalidMarkup,
            Status::InvalidSize,
            Status::WrongFactory,
            Status::NoHardwareDevice,
            Status::NoInterface,
            Status::UnsupportedPixelFormat,
            Status::WrongState,
            Status::NotInitialized,
            Status::FrameMissing,
            Status::CodecFailure,
        ];
        let mut codes: Vec<u32> = all.iter().map(|s| s.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
    }
}
