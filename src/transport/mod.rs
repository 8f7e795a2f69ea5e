//! Transports move a batch of series to the backend.
//!
//! The reporter asks its `Transport` for a fresh `Request` at the top of
//! every cycle, feeds counter and gauge series into it one at a time and
//! finally calls `send`. A request belongs to exactly one cycle and is
//! consumed by `send`.

use std::error;
use std::fmt;
use std::io;

use crate::series::Series;

mod console;
mod http;
mod udp;

pub use self::console::ConsoleTransport;
pub use self::http::{HttpConfig, HttpTransport};
pub use self::udp::{UdpConfig, UdpTransport};

/// A wire protocol to the backend.
pub trait Transport: Send + Sync {
    /// Open a request for one cycle.
    fn prepare(&self) -> Result<Box<dyn Request>, Error>;

    /// Release whatever the transport holds. Requests prepared after this
    /// call may fail.
    fn close(&self) -> Result<(), Error>;
}

/// One batch being assembled.
pub trait Request {
    /// Append a counter series.
    fn add_counter(&mut self, counter: Series) -> Result<(), Error>;

    /// Append a gauge series.
    fn add_gauge(&mut self, gauge: Series) -> Result<(), Error>;

    /// Deliver everything appended so far.
    fn send(self: Box<Self>) -> Result<(), Error>;
}

/// Transport failures.
#[derive(Debug)]
pub enum Error {
    /// socket or stream failure
    Io(io::Error),
    /// HTTP client failure
    Http(reqwest::Error),
    /// the backend answered with a non-success status
    Status(u16),
    /// the batch could not be serialized
    Encode(serde_json::Error),
    /// the transport was closed
    Closed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Io(ref e) => write!(f, "io error: {}", e),
            Error::Http(ref e) => write!(f, "http error: {}", e),
            Error::Status(code) => write!(f, "backend answered with status {}", code),
            Error::Encode(ref e) => write!(f, "could not encode batch: {}", e),
            Error::Closed => write!(f, "transport is closed"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Io(ref e) => Some(e),
            Error::Http(ref e) => Some(e),
            Error::Encode(ref e) => Some(e),
            Error::Status(_) | Error::Closed => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::Io(e)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Error {
        Error::Http(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Error {
        Error::Encode(e)
    }
}
