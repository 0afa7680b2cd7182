//! Information gathered by the previsit pass and read by the transforms.

use std::collections::HashMap;

use log::debug;

use crate::error::{Error, Result};
use crate::model::class_file::{class_access_flags, package_of};
use crate::parser::parse_class_header;
use crate::pool::Pool;

#[derive(Debug, Default)]
pub struct LinkContext {
    pub class_index: ClassIndex,
    pub strings: StringTable,
}

impl LinkContext {
    pub fn new() -> Self {
        LinkContext::default()
    }
}

/// Where a class is defined, and how it may be accessed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassEntry {
    pub module: String,
    pub path: String,
    pub access_flags: class_access_flags::t,
}

impl ClassEntry {
    pub fn is_public(&self) -> bool {
        self.access_flags & class_access_flags::ACC_PUBLIC != 0
    }

    pub fn is_private(&self) -> bool {
        self.access_flags & class_access_flags::ACC_PRIVATE != 0
    }
}

/// Maps internal class names to their defining artifacts. A name may be
/// defined by several modules.
#[derive(Debug, Default)]
pub struct ClassIndex {
    classes: HashMap<String, Vec<ClassEntry>>,
}

impl ClassIndex {
    /// Indexes every class of the pool. A class whose header cannot be decoded
    /// fails the whole index.
    pub fn build(pool: &Pool) -> Result<Self> {
        let mut index = ClassIndex::default();
        for artifact in pool.entries().filter(|a| a.is_class() && !a.is_module_info()) {
            let header = parse_class_header(artifact.content())
                .map_err(|cause| Error::MalformedClass { path: artifact.path().to_owned(), cause })?;
            index.insert(
                header.name,
                ClassEntry {
                    module: artifact.module().to_owned(),
                    path: artifact.path().to_owned(),
                    access_flags: header.access_flags,
                },
            );
        }
        debug!("indexed {} classes", index.len());
        Ok(index)
    }

    pub fn insert(&mut self, name: String, entry: ClassEntry) {
        self.classes.entry(name).or_insert_with(Vec::new).push(entry);
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Looks up a class, preferring the definition in `module`.
    pub fn find(&self, name: &str, module: &str) -> Option<&ClassEntry> {
        let entries = self.classes.get(name)?;
        entries.iter().find(|e| e.module == module).or_else(|| entries.first())
    }
}

/// Whether code in `caller` (an internal class name) may refer to `target`
/// by a class constant. Only public targets and targets in the caller's own
/// package qualify; protected and package-private classes in other packages
/// are treated as inaccessible.
pub fn is_accessible(caller: &str, target_name: &str, target: &ClassEntry) -> bool {
    if target.is_private() {
        return false;
    }
    target.is_public() || package_of(caller) == package_of(target_name)
}

/// A blob of NUL terminated strings shared by the image, addressed by byte
/// offset.
#[derive(Debug, Default, Clone)]
pub struct StringTable {
    bytes: Vec<u8>,
    offsets: HashMap<String, u32>,
}

impl StringTable {
    /// Returns the offset of `s`, adding it if needed.
    pub fn add(&mut self, s: &str) -> u32 {
        if let Some(&offset) = self.offsets.get(s) {
            return offset;
        }
        let offset = self.bytes.len() as u32;
        self.bytes.extend_from_slice(s.as_bytes());
        self.bytes.push(0);
        self.offsets.insert(s.to_owned(), offset);
        offset
    }

    pub fn offset(&self, s: &str) -> Option<u32> {
        self.offsets.get(s).cloned()
    }

    pub fn get(&self, offset: u32) -> Option<&str> {
        let start = offset as usize;
        let rest = self.bytes.get(start..)?;
        let end = rest.iter().position(|&b| b == 0)?;
        ::std::str::from_utf8(&rest[..end]).ok()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::class_file::builder::ClassBuilder;
    use crate::model::class_file::class_access_flags::{ACC_PRIVATE, ACC_PUBLIC};
    use crate::pool::{Artifact, PoolBuilder};

    fn entry(module: &str, access_flags: u16) -> ClassEntry {
        ClassEntry { module: module.to_owned(), path: String::new(), access_flags }
    }

    #[test]
    fn test_index_prefers_own_module() {
        let mut index = ClassIndex::default();
        index.insert("p/A".to_owned(), entry("one", ACC_PUBLIC));
        index.insert("p/A".to_owned(), entry("two", ACC_PUBLIC));
        assert_eq!(index.find("p/A", "two").unwrap().module, "two");
        assert_eq!(index.find("p/A", "three").unwrap().module, "one");
        assert!(index.find("p/B", "one").is_none());
    }

    #[test]
    fn test_build_from_pool() {
        let mut builder = PoolBuilder::new();
        let bytes = ClassBuilder::new("p/A", ACC_PUBLIC).to_bytes().unwrap();
        builder.add(Artifact::class_or_resource("/m/p/A.class", bytes).unwrap()).unwrap();
        builder.add(Artifact::class_or_resource("/m/p/readme.txt", b"hi".to_vec()).unwrap()).unwrap();
        let index = ClassIndex::build(&builder.build()).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.find("p/A", "m").unwrap().path, "/m/p/A.class");

        let mut broken = PoolBuilder::new();
        broken.add(Artifact::class_or_resource("/m/p/B.class", vec![0xca, 0xfe]).unwrap()).unwrap();
        assert!(ClassIndex::build(&broken.build()).is_err());
    }

    #[test]
    fn test_access() {
        assert!(is_accessible("q/Caller", "p/A", &entry("m", ACC_PUBLIC)));
        assert!(is_accessible("p/Caller", "p/A", &entry("m", 0)));
        assert!(!is_accessible("q/Caller", "p/A", &entry("m", 0)));
        assert!(!is_accessible("p/Caller", "p/A", &entry("m", ACC_PRIVATE)));
    }

    #[test]
    fn test_string_table() {
        let mut strings = StringTable::default();
        assert_eq!(strings.add("zip"), 0);
        assert_eq!(strings.add("other"), 4);
        assert_eq!(strings.add("zip"), 0);
        assert_eq!(strings.get(4), Some("other"));
        assert_eq!(strings.as_bytes(), b"zip\0other\0");
    }
}
