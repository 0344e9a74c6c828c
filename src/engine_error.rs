/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use std::fmt::Display;
use std::io::ErrorKind;
use std::num::TryFromIntError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
/// Well-defined errors for bad things that are expected to happen while compressing
/// or decompressing a datastream. None of these are resumable; the codec has to be
/// aborted before it can be used for another datastream.
pub enum ExitCode {
    /// Assertion failure, which probably indicates a bug in the library or a panic
    /// in a caller supplied collaborator.
    AssertionFailure = 1,

    /// The datastream ended before the end of image marker and the source reported
    /// that no more data will ever arrive.
    ShortRead = 3,

    /// A marker segment was malformed (bad length, bad table selector, bad component id).
    BadMarker = 5,

    /// The frame header describes an impossible geometry (zero dimensions, sampling factors
    /// out of range, too many blocks in an MCU).
    InconsistentGeometry = 6,

    /// A scan script or scan header contained a parameter combination that is not valid.
    BadScanScript = 7,

    /// The datastream uses a feature that is recognized but not supported, such as
    /// arithmetic coding or lossless mode.
    UnsupportedJpeg = 42,

    /// A table referenced by a scan was never defined.
    MissingTable = 46,

    /// An error was returned by an IO operation, for example if a Write
    /// passed in returned an error.
    OsError = 33,

    /// A virtual array was accessed outside of its declared bounds or before it was realized.
    BadVirtualAccess = 50,

    /// The spill file used to back a virtual array failed.
    BackingStoreFailure = 51,

    /// error occured while casting an integer to a smaller type, most likely
    /// means that the JPEG contains invalid data
    IntegerCastOverflow = 1000,

    /// Caller passed in invalid parameters
    SyntaxError = 1006,

    /// An operation was called in the wrong state, for example writing rows before
    /// start_compress.
    BadState = 1009,

    /// A warning was encountered and the codec was configured to treat warnings as errors.
    WarningAsError = 1010,

    /// ran out of memory trying to allocate a buffer, or the configured memory limit
    /// was exceeded
    OutOfMemory = 2000,
}

/// Broad classification of an [`ExitCode`], used by callers that only care
/// whether the datastream or the environment was at fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The datastream itself is malformed or unsupported.
    Format,
    /// Memory or spill storage ran out or failed.
    Resource,
    /// The caller used the API incorrectly.
    Usage,
    /// A bug or a panic.
    Internal,
}

impl Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl ExitCode {
    /// Converts the error code into an integer for use as an error code when
    /// returning from a C API.
    pub fn as_integer_error_code(self) -> i32 {
        self as i32
    }

    /// Returns the class of the error.
    pub fn class(self) -> ErrorClass {
        match self {
            ExitCode::ShortRead
            | ExitCode::BadMarker
            | ExitCode::InconsistentGeometry
            | ExitCode::BadScanScript
            | ExitCode::UnsupportedJpeg
            | ExitCode::MissingTable
            | ExitCode::IntegerCastOverflow
            | ExitCode::WarningAsError => ErrorClass::Format,
            ExitCode::OsError | ExitCode::BackingStoreFailure | ExitCode::OutOfMemory => {
                ErrorClass::Resource
            }
            ExitCode::SyntaxError | ExitCode::BadState | ExitCode::BadVirtualAccess => {
                ErrorClass::Usage
            }
            ExitCode::AssertionFailure => ErrorClass::Internal,
        }
    }
}

/// Recoverable conditions. They are counted per kind and reported through the
/// error manager, decoding carries on unless warnings are treated as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum WarningKind {
    /// Bytes that are not part of any marker were skipped.
    ExtraneousData,
    /// A restart marker was missing or out of sequence and the decoder had to resynchronize.
    MustResync,
    /// Entropy coded data ran into a marker, the remaining coefficients read as zero.
    HitMarker,
    /// The datastream ended before its last scan was complete.
    PrematureEnd,
    /// A progressive scan does not follow the refinement history of its coefficients.
    BogusProgression,
    /// A sequential scan carried progressive parameters that were ignored.
    NotSequential,
    /// A Huffman code that is not in the table, the symbol was read as zero.
    HuffBadCode,
    /// A JFIF header declared a major version this decoder doesn't know.
    JfifMajorVersion,
    /// A quantization table contains a zero entry.
    ZeroQuantEntry,
}

impl WarningKind {
    /// Stable name used in metrics and logs
    pub fn name(self) -> &'static str {
        match self {
            WarningKind::ExtraneousData => "ExtraneousData",
            WarningKind::MustResync => "MustResync",
            WarningKind::HitMarker => "HitMarker",
            WarningKind::PrematureEnd => "PrematureEnd",
            WarningKind::BogusProgression => "BogusProgression",
            WarningKind::NotSequential => "NotSequential",
            WarningKind::HuffBadCode => "HuffBadCode",
            WarningKind::JfifMajorVersion => "JfifMajorVersion",
            WarningKind::ZeroQuantEntry => "ZeroQuantEntry",
        }
    }
}

impl Display for WarningKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Since errors are rare and stop everything, we want them to be as lightweight as possible.
#[derive(Debug, Clone)]
struct EngineErrorInternal {
    exit_code: ExitCode,
    message: String,
}

/// Standard error returned by the engine
#[derive(Debug, Clone)]
pub struct EngineError {
    i: Box<EngineErrorInternal>,
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;

impl Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{0}: {1}", self.i.exit_code, self.i.message)
    }
}

impl EngineError {
    /// Creates a new EngineError with the specified exit code and message.
    pub fn new(exit_code: ExitCode, message: impl AsRef<str>) -> EngineError {
        EngineError {
            i: Box::new(EngineErrorInternal {
                exit_code,
                message: message.as_ref().to_owned(),
            }),
        }
    }

    /// Returns the numeric exit code of the error to clasify the error
    pub fn exit_code(&self) -> ExitCode {
        self.i.exit_code
    }

    /// Returns the message of the error, which is a human-readable description of the error.
    pub fn message(&self) -> &str {
        &self.i.message
    }

    /// Adds context to the error by appending the current location in the code. This
    /// allows for building a callstack of where the error occurred.
    #[cold]
    #[inline(never)]
    #[track_caller]
    pub fn add_context(&mut self) {
        self.i
            .message
            .push_str(&format!("\n at {}", std::panic::Location::caller()));
    }
}

#[cold]
#[track_caller]
pub fn err_exit_code<T>(error_code: ExitCode, message: impl AsRef<str>) -> Result<T> {
    let mut e = EngineError::new(error_code, message.as_ref());
    e.add_context();
    return Err(e);
}

pub trait AddContext<T> {
    #[track_caller]
    fn context(self) -> Result<T>;
}

impl<T, E: Into<EngineError>> AddContext<T> for core::result::Result<T, E> {
    #[track_caller]
    fn context(self) -> Result<T> {
        match self {
            Ok(x) => Ok(x),
            Err(e) => {
                let mut e = e.into();
                e.add_context();
                Err(e)
            }
        }
    }
}

impl std::error::Error for EngineError {}

fn get_io_error_exit_code(e: &std::io::Error) -> ExitCode {
    if e.kind() == ErrorKind::UnexpectedEof {
        ExitCode::ShortRead
    } else {
        ExitCode::OsError
    }
}

impl From<TryFromIntError> for EngineError {
    #[track_caller]
    fn from(e: TryFromIntError) -> Self {
        let mut e = EngineError::new(ExitCode::IntegerCastOverflow, e.to_string());
        e.add_context();
        e
    }
}

/// translates std::io::Error into EngineError
impl From<std::io::Error> for EngineError {
    #[track_caller]
    fn from(e: std::io::Error) -> Self {
        match e.downcast::<EngineError>() {
            Ok(le) => {
                return le;
            }
            Err(e) => {
                let mut e = EngineError::new(get_io_error_exit_code(&e), e.to_string());
                e.add_context();
                e
            }
        }
    }
}

/// translates EngineError into std::io::Error, which involves putting into a Box and using Other
impl From<EngineError> for std::io::Error {
    fn from(e: EngineError) -> Self {
        return std::io::Error::new(std::io::ErrorKind::Other, e);
    }
}

#[test]
fn test_error_translation() {
    // test wrapping inside an io error
    fn my_std_error() -> core::result::Result<(), std::io::Error> {
        Err(EngineError::new(ExitCode::SyntaxError, "test error").into())
    }

    let e: EngineError = my_std_error().unwrap_err().into();
    assert_eq!(e.exit_code(), ExitCode::SyntaxError);
    assert_eq!(e.message(), "test error");

    // an IO error should be translated into an OsError
    let e: EngineError = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found").into();
    assert_eq!(e.exit_code(), ExitCode::OsError);
    assert_eq!(e.exit_code().class(), ErrorClass::Resource);
}

#[test]
fn test_context_appends_location() {
    fn fails() -> Result<()> {
        let r: core::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(ErrorKind::UnexpectedEof, "eof"));
        r.context()
    }

    let e = fails().unwrap_err();
    assert_eq!(e.exit_code(), ExitCode::ShortRead);
    assert!(e.message().contains("engine_error.rs"));
}
