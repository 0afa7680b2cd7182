//! Encoders that turn the class file model back into bytes.

use std::io;

use byteorder::WriteBytesExt;

pub mod class_file;
pub mod code;
pub mod module_info;

pub use self::class_file::{encode, encode_verified};

/// Whether derived tables are regenerated from the instruction stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecomputeMode {
    /// Keep `max_stack`, `max_locals` and the stack map frame types exactly as
    /// decoded. Use when instructions were not touched.
    Verbatim,
    /// Recompute `max_stack` and `max_locals`, and re-derive frame offsets,
    /// widening a frame to its extended form when its offset delta no longer
    /// fits. Required after instructions were inserted or removed.
    Recompute,
}

/// Structures whose encoding needs no context beyond themselves.
pub trait Serialize {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()>;
}
