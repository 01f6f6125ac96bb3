//! Tape device errors.

use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::io;

/// Tape device error.
#[derive(Debug)]
pub enum TapeError {
    /// Backing store can't be opened or its content violates the tape format.
    BadTape(String),
    /// Read attempted past the last cell.
    EndOfTape,
    /// Operation is not supported in the current device mode.
    InvalidOperation(String),
    /// Memory buffer index is out of bounds.
    OutOfRange { index: usize, capacity: usize },
    /// Malformed or unrecognized device configuration.
    Config(String),
    /// Backing store I/O failure.
    IO(io::Error),
}

impl Error for TapeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            TapeError::IO(err) => Some(err),
            _ => None,
        }
    }
}

impl Display for TapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            TapeError::BadTape(msg) => write!(f, "bad tape: {}", msg),
            TapeError::EndOfTape => write!(f, "end of tape reached"),
            TapeError::InvalidOperation(msg) => write!(f, "invalid operation: {}", msg),
            TapeError::OutOfRange { index, capacity } => {
                write!(f, "buffer index {} is out of range (capacity: {})", index, capacity)
            }
            TapeError::Config(msg) => write!(f, "configuration error: {}", msg),
            TapeError::IO(err) => write!(f, "tape I/O operation failed: {}", err),
        }
    }
}

impl From<io::Error> for TapeError {
    fn from(err: io::Error) -> Self {
        TapeError::IO(err)
    }
}

#[cfg(test)]
mod test {
    use std::error::Error;
    use std::io;

    use super::TapeError;

    #[test]
    fn test_error_display() {
        let err = TapeError::OutOfRange { index: 7, capacity: 5 };
        assert_eq!(err.to_string(), "buffer index 7 is out of range (capacity: 5)");
        assert_eq!(TapeError::EndOfTape.to_string(), "end of tape reached");
    }

    #[test]
    fn test_io_error_source() {
        let err: TapeError = io::Error::new(io::ErrorKind::Other, "disk gone").into();
        assert!(err.source().is_some());
        assert!(TapeError::BadTape("x".into()).source().is_none());
    }
}
