use std::fmt::{Display, Formatter};

use config::ConfigError;

pub type Result<T> = std::result::Result<T, Error>;

/// Io is surfaced to callers that may retry or abort a transaction;
/// Internal is a programming or state error.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    Internal(String),
    Io(String),
}

impl Error {
    pub fn internal<E: ToString>(msg: E) -> Error {
        Error::Internal(msg.to_string())
    }

    pub fn io<E: ToString>(msg: E) -> Error {
        Error::Io(msg.to_string())
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Internal(s) | Error::Io(s) => {
                write!(f, "{}", s)
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::io(err)
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Error::internal(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::internal(err)
    }
}
