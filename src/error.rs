use thiserror::Error;

use crate::msh::MshError;
use crate::zaa::ZaaError;

#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
}

#[derive(Error, Debug)]
pub enum ErrorKind {
    #[error("Invalid msh data: {err}")]
    Msh {
        #[from]
        err: MshError,
    },
    #[error("Invalid zaa data: {err}")]
    Zaa {
        #[from]
        err: ZaaError,
    },
    #[cfg(feature = "json")]
    #[error("Error serializing or deserializing json: {err}")]
    SerdeJson {
        #[from]
        err: serde_json::Error,
    },
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.kind.fmt(f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.kind.source()
    }
}

impl std::convert::From<MshError> for Error {
    fn from(x: MshError) -> Error {
        Error { kind: x.into() }
    }
}

impl std::convert::From<ZaaError> for Error {
    fn from(x: ZaaError) -> Error {
        Error { kind: x.into() }
    }
}

impl std::convert::From<std::io::Error> for Error {
    fn from(x: std::io::Error) -> Error {
        Error { kind: x.into() }
    }
}

#[cfg(feature = "json")]
impl std::convert::From<serde_json::Error> for Error {
    fn from(x: serde_json::Error) -> Error {
        Error { kind: x.into() }
    }
}

pub type IResult<T> = Result<T, Error>;

pub fn failure_from_kind(kind: ErrorKind) -> Error {
    Error { kind }
}
