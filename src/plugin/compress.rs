//! Compresses classes and resources.
//!
//! A compressed artifact is a fixed little-endian header followed by the
//! compressed bytes:
//!
//! ```text
//! magic                     u32   0xCAFEFAFA
//! compressed_size           u64
//! uncompressed_size         u64
//! decompressor_name_offset  u32   into the image string table
//! content_offset            u32
//! is_terminal               u8
//! ```

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use log::{debug, trace, warn};

use super::{Category, LinkContext, Plugin, Previsitor, Transformer};
use crate::config::PluginConfig;
use crate::error::{Error, Result};
use crate::pool::filter::ResourceFilter;
use crate::pool::{ArtifactKind, Pool};

pub const NAME: &str = "compress";

pub const HEADER_MAGIC: u32 = 0xCAFE_FAFA;
pub const HEADER_SIZE: usize = 29;
pub const ZIP_DECOMPRESSOR: &str = "zip";

/// Deflate cannot expand its input by more than this factor.
const MAX_INFLATE_RATIO: u64 = 1032;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    None,
    StringSharing,
    Zip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressedHeader {
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub decompressor_name_offset: u32,
    pub content_offset: u32,
    pub is_terminal: bool,
}

impl CompressedHeader {
    pub fn write<W: WriteBytesExt>(&self, out: &mut W) -> ::std::io::Result<()> {
        out.write_u32::<LittleEndian>(HEADER_MAGIC)?;
        out.write_u64::<LittleEndian>(self.compressed_size)?;
        out.write_u64::<LittleEndian>(self.uncompressed_size)?;
        out.write_u32::<LittleEndian>(self.decompressor_name_offset)?;
        out.write_u32::<LittleEndian>(self.content_offset)?;
        out.write_u8(self.is_terminal as u8)
    }

    /// Reads a header, or returns `None` if `bytes` does not start with one.
    pub fn read(bytes: &[u8]) -> Option<CompressedHeader> {
        if bytes.len() < HEADER_SIZE {
            return None;
        }
        let mut input = Cursor::new(bytes);
        if input.read_u32::<LittleEndian>().ok()? != HEADER_MAGIC {
            return None;
        }
        Some(CompressedHeader {
            compressed_size: input.read_u64::<LittleEndian>().ok()?,
            uncompressed_size: input.read_u64::<LittleEndian>().ok()?,
            decompressor_name_offset: input.read_u32::<LittleEndian>().ok()?,
            content_offset: input.read_u32::<LittleEndian>().ok()?,
            is_terminal: input.read_u8().ok()? != 0,
        })
    }
}

#[derive(Debug)]
pub struct CompressPlugin {
    level: Level,
    filter: Option<ResourceFilter>,
}

impl CompressPlugin {
    pub fn configure(config: &PluginConfig) -> Result<Self> {
        let level = match config.main() {
            Some("0") => Level::None,
            Some("1") => Level::StringSharing,
            Some("2") => Level::Zip,
            Some(other) => return Err(Error::config(NAME, format!("invalid compression level {:?}", other))),
            None => return Err(Error::config(NAME, "a compression level is required")),
        };
        let filter = match config.get("filter") {
            Some(patterns) => Some(ResourceFilter::include(NAME, patterns)?),
            None => None,
        };
        Ok(CompressPlugin { level, filter })
    }

    fn accepts(&self, path: &str) -> bool {
        self.filter.as_ref().map(|f| f.test(path)).unwrap_or(true)
    }
}

impl Plugin for CompressPlugin {
    fn name(&self) -> &'static str {
        NAME
    }

    fn category(&self) -> Category {
        Category::Compressor
    }
}

impl Previsitor for CompressPlugin {
    fn previsit(&self, _input: &Pool, context: &mut LinkContext) -> Result<()> {
        if self.level == Level::Zip {
            context.strings.add(ZIP_DECOMPRESSOR);
        }
        Ok(())
    }
}

impl Transformer for CompressPlugin {
    fn transform(&self, input: &Pool, context: &LinkContext) -> Result<Pool> {
        match self.level {
            Level::None => return Ok(input.clone()),
            Level::StringSharing => {
                warn!("compression level 1 is not available, resources are left uncompressed");
                return Ok(input.clone());
            }
            Level::Zip => {}
        }
        let name_offset = context
            .strings
            .offset(ZIP_DECOMPRESSOR)
            .ok_or_else(|| Error::Invariant(format!("{} was not registered before compression", ZIP_DECOMPRESSOR)))?;

        let mut saved = 0;
        let mut out = input.builder();
        input.transform_and_copy(
            |artifact| {
                if artifact.kind() != ArtifactKind::ClassOrResource
                    || !self.accepts(artifact.path())
                    || CompressedHeader::read(artifact.content()).is_some()
                {
                    return Ok(Some(artifact.clone()));
                }
                let compressed = zip(artifact.content(), name_offset).map_err(|e| Error::from(e).at(artifact.path()))?;
                if compressed.len() >= artifact.content().len() {
                    trace!("{} does not shrink", artifact.path());
                    return Ok(Some(artifact.clone()));
                }
                saved += artifact.content().len() - compressed.len();
                Ok(Some(artifact.with_content(compressed)))
            },
            &mut out,
        )?;
        debug!("compression saved {} bytes", saved);
        Ok(out.build())
    }
}

/// Deflates `content` and prefixes the header.
pub fn zip(content: &[u8], decompressor_name_offset: u32) -> ::std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(content)?;
    let deflated = encoder.finish()?;
    let header = CompressedHeader {
        compressed_size: deflated.len() as u64,
        uncompressed_size: content.len() as u64,
        decompressor_name_offset,
        content_offset: 0,
        is_terminal: true,
    };
    let mut out = Vec::with_capacity(HEADER_SIZE + deflated.len());
    header.write(&mut out)?;
    out.extend_from_slice(&deflated);
    Ok(out)
}

/// Reverses `zip`. Content without a header is returned as is.
pub fn unzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let header = match CompressedHeader::read(bytes) {
        Some(header) => header,
        None => return Ok(bytes.to_vec()),
    };
    let body = &bytes[HEADER_SIZE..];
    if body.len() as u64 != header.compressed_size {
        return Err(Error::MalformedInput(format!(
            "compressed resource declares {} bytes but has {}",
            header.compressed_size,
            body.len()
        )));
    }
    if header.uncompressed_size > header.compressed_size.saturating_mul(MAX_INFLATE_RATIO) {
        return Err(Error::MalformedInput(format!(
            "compressed resource of {} bytes cannot inflate to {} bytes",
            header.compressed_size, header.uncompressed_size
        )));
    }
    let mut out = Vec::with_capacity(header.uncompressed_size as usize);
    ZlibDecoder::new(body).take(header.uncompressed_size + 1).read_to_end(&mut out)?;
    if out.len() as u64 != header.uncompressed_size {
        return Err(Error::MalformedInput(format!(
            "compressed resource declares {} uncompressed bytes but has {}",
            header.uncompressed_size,
            out.len()
        )));
    }
    Ok(out)
}
