//! Decoders for class files and module descriptors, built on `nom`.
//!
//! The individual parsers are `nom` functions over byte slices that fail
//! with this module's `Error`. Any failure that is not a structural decision
//! (a short read, a failed primitive) is turned into a non-backtracking
//! failure naming the section being read, so callers get a precise message
//! rather than a bare `ErrorKind`.

use nom::error::{ErrorKind, ParseError};
use thiserror::Error;

use crate::model::class_file::constant_pool;

pub type Input<'a> = &'a [u8];
pub type ParseResult<'a, O> = nom::IResult<Input<'a>, O, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("bad magic number")]
    Magic,
    #[error("truncated {section}")]
    Truncated { section: &'static str },
    #[error("malformed {name} attribute")]
    Attribute { name: String },
    #[error("attribute {name} declares {declared} bytes but {actual} were read")]
    AttributeLength { name: String, declared: usize, actual: usize },
    #[error("unknown constant pool tag {tag} at #{index}")]
    UnknownConstantPoolTag { tag: u8, index: usize },
    #[error("constant pool count {constant_pool_count} splits a long or double entry")]
    ConstantPool { constant_pool_count: usize },
    #[error(transparent)]
    ConstantPoolEntry(#[from] constant_pool::Error),
    #[error("illegal modified UTF-8 byte {byte:#04x}")]
    IllegalModifiedUtf8 { byte: u8 },
    #[error("unknown opcode {opcode:#04x} at pc {pc}")]
    UnknownOpcode { opcode: u8, pc: usize },
    #[error("offset {offset} is not the start of an instruction")]
    InvalidOffset { offset: i64 },
    #[error("invalid switch at pc {pc}")]
    InvalidSwitch { pc: usize },
    #[error("reserved stack map frame tag {tag}")]
    ReservedStackMapFrameTag { tag: u8 },
    #[error("unknown verification type tag {tag}")]
    UnknownVerificationTypeInfoTag { tag: u8 },
    #[error("{count} trailing bytes after class file")]
    TrailingBytes { count: usize },
    #[error("{0}")]
    ModuleInfo(String),
    #[error("parse error: {0:?}")]
    Nom(ErrorKind),
}

impl<'a> ParseError<Input<'a>> for Error {
    fn from_error_kind(_input: Input<'a>, kind: ErrorKind) -> Self {
        Error::Nom(kind)
    }

    fn append(_input: Input<'a>, _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

impl From<Error> for nom::Err<Error> {
    fn from(e: Error) -> Self {
        nom::Err::Failure(e)
    }
}

impl From<constant_pool::Error> for nom::Err<Error> {
    fn from(e: constant_pool::Error) -> Self {
        nom::Err::Failure(Error::ConstantPoolEntry(e))
    }
}

/// Fails the current parser without backtracking.
macro_rules! p_fail {
    ($e: expr) => {
        return Err(nom::Err::Failure($e))
    };
}

pub mod class_file;
pub mod code;
pub mod module_info;

pub use self::class_file::{parse_class_file, parse_class_header, ClassHeader};

/// Runs `f`, turning low-level failures into `Error::Truncated { section }`.
/// Failures carrying a specific error are passed through, but never
/// backtrack.
pub fn section<'a, O, F>(section: &'static str, mut f: F) -> impl FnMut(Input<'a>) -> ParseResult<'a, O>
where
    F: FnMut(Input<'a>) -> ParseResult<'a, O>,
{
    move |input| f(input).map_err(|e| cut(e, || Error::Truncated { section }))
}

pub(crate) fn cut<F: FnOnce() -> Error>(e: nom::Err<Error>, generic: F) -> nom::Err<Error> {
    match e {
        nom::Err::Incomplete(_) => nom::Err::Failure(generic()),
        nom::Err::Error(Error::Nom(_)) | nom::Err::Failure(Error::Nom(_)) => {
            nom::Err::Failure(generic())
        }
        nom::Err::Error(e) | nom::Err::Failure(e) => nom::Err::Failure(e),
    }
}

/// Unwraps the outcome of a complete-input parser.
pub(crate) fn finish<'a, O>(result: ParseResult<'a, O>, section: &'static str) -> Result<(Input<'a>, O), Error> {
    match result {
        Ok(r) => Ok(r),
        Err(nom::Err::Incomplete(_)) => Err(Error::Truncated { section }),
        Err(nom::Err::Error(Error::Nom(_))) | Err(nom::Err::Failure(Error::Nom(_))) => {
            Err(Error::Truncated { section })
        }
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(e),
    }
}
