//! Errors raised while linking. Every error is fatal to the run; conditions a
//! plugin can recover from locally never surface as an `Error`.

use std::io;

use thiserror::Error;

use crate::model::class_file::constant_pool;
use crate::parser;

pub type Result<T> = ::std::result::Result<T, Error>;

/// The broad category of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// An unparseable class file, descriptor or configuration file.
    MalformedInput,
    /// Input that parses but breaks a rule of the image, such as a duplicate
    /// path or an exported package that does not exist.
    InvariantViolation,
    /// A bad plugin option, detected before any artifact is processed.
    ConfigurationError,
    /// A value that does not fit the class file encoding.
    EncodingLimitExceeded,
    Io,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed class file {path}: {cause}")]
    MalformedClass { path: String, cause: parser::Error },
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error("duplicate artifact path {0}")]
    DuplicatePath(String),
    #[error("Packages that are exported or open in {module} are not present: [{}]", .packages.join(", "))]
    MissingPackages { module: String, packages: Vec<String> },
    #[error("invalid names in module {module}: {}", .names.join(", "))]
    InvalidNames { module: String, names: Vec<String> },
    #[error("{0}")]
    Invariant(String),
    #[error("{plugin}: {message}")]
    Configuration { plugin: String, message: String },
    #[error("{what} {value} exceeds the limit of {limit}")]
    EncodingLimitExceeded { what: &'static str, value: i64, limit: i64 },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("{plugin}: {source}")]
    Plugin { plugin: String, source: Box<Error> },
    #[error("{path}: {source}")]
    Artifact { path: String, source: Box<Error> },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match *self {
            Error::MalformedClass { .. } | Error::MalformedInput(_) => ErrorKind::MalformedInput,
            Error::DuplicatePath(_)
            | Error::MissingPackages { .. }
            | Error::InvalidNames { .. }
            | Error::Invariant(_) => ErrorKind::InvariantViolation,
            Error::Configuration { .. } => ErrorKind::ConfigurationError,
            Error::EncodingLimitExceeded { .. } => ErrorKind::EncodingLimitExceeded,
            Error::Io(_) => ErrorKind::Io,
            Error::Plugin { ref source, .. } | Error::Artifact { ref source, .. } => source.kind(),
        }
    }

    pub fn config<P: Into<String>, M: Into<String>>(plugin: P, message: M) -> Self {
        Error::Configuration { plugin: plugin.into(), message: message.into() }
    }

    /// Attaches the path of the artifact being processed.
    pub fn at(self, path: &str) -> Self {
        match self {
            e @ Error::Artifact { .. } => e,
            e => Error::Artifact { path: path.to_owned(), source: Box::new(e) },
        }
    }

    /// Attaches the name of the plugin that failed.
    pub fn in_plugin(self, plugin: &str) -> Self {
        match self {
            e @ Error::Plugin { .. } | e @ Error::Configuration { .. } => e,
            e => Error::Plugin { plugin: plugin.to_owned(), source: Box::new(e) },
        }
    }
}

impl From<constant_pool::Error> for Error {
    fn from(e: constant_pool::Error) -> Self {
        match e {
            constant_pool::Error::Full => Error::EncodingLimitExceeded {
                what: "constant pool size",
                value: constant_pool::MAX_INDEX as i64 + 1,
                limit: constant_pool::MAX_INDEX as i64,
            },
            e => Error::MalformedInput(e.to_string()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_context_keeps_kind() {
        let e = Error::DuplicatePath("/m/a".to_owned()).at("/m/a").in_plugin("exclude-resources");
        assert_eq!(e.kind(), ErrorKind::InvariantViolation);
        assert_eq!(e.to_string(), "exclude-resources: /m/a: duplicate artifact path /m/a");
    }

    #[test]
    fn test_missing_packages_message() {
        let e = Error::MissingPackages { module: "m".to_owned(), packages: vec!["a".to_owned(), "b".to_owned()] };
        assert_eq!(e.to_string(), "Packages that are exported or open in m are not present: [a, b]");
    }

    #[test]
    fn test_pool_full_is_limit() {
        let e: Error = constant_pool::Error::Full.into();
        assert_eq!(e.kind(), ErrorKind::EncodingLimitExceeded);
    }
}
