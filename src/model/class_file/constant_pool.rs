//! The constant pool table (JVMS §4.4) and the operations the linker needs on
//! it: typed lookups and deduplicating insertion.

use std::collections::HashMap;

use thiserror::Error;

use super::u1;
use super::u2;
use super::u4;
use crate::util::modified_utf8;
use crate::util::OneIndexedVec;

#[allow(non_camel_case_types)]
pub type constant_pool_index = u2;

/// The largest index a `constant_pool_count` of `u2` can address.
pub const MAX_INDEX: usize = 0xfffe;

pub mod tags {
    use super::u1;
    pub const UTF_8: u1 = 1;
    pub const INTEGER: u1 = 3;
    pub const FLOAT: u1 = 4;
    pub const LONG: u1 = 5;
    pub const DOUBLE: u1 = 6;
    pub const CLASS: u1 = 7;
    pub const STRING: u1 = 8;
    pub const FIELD_REF: u1 = 9;
    pub const METHOD_REF: u1 = 10;
    pub const INTERFACE_METHOD_REF: u1 = 11;
    pub const NAME_AND_TYPE: u1 = 12;
    pub const METHOD_HANDLE: u1 = 15;
    pub const METHOD_TYPE: u1 = 16;
    pub const DYNAMIC: u1 = 17;
    pub const INVOKE_DYNAMIC: u1 = 18;
    pub const MODULE: u1 = 19;
    pub const PACKAGE: u1 = 20;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Class,
    FieldRef,
    MethodRef,
    InterfaceMethodRef,
    String,
    Integer,
    Float,
    Long,
    Double,
    NameAndType,
    Utf8,
    MethodHandle,
    MethodType,
    Dynamic,
    InvokeDynamic,
    Module,
    Package,
    /// The slot following a `Long` or `Double` entry.
    Unusable,
    Unknown(u1),
}

impl From<u1> for Tag {
    fn from(tag: u1) -> Self {
        match tag {
            tags::CLASS => Tag::Class,
            tags::FIELD_REF => Tag::FieldRef,
            tags::METHOD_REF => Tag::MethodRef,
            tags::INTERFACE_METHOD_REF => Tag::InterfaceMethodRef,
            tags::STRING => Tag::String,
            tags::INTEGER => Tag::Integer,
            tags::FLOAT => Tag::Float,
            tags::LONG => Tag::Long,
            tags::DOUBLE => Tag::Double,
            tags::NAME_AND_TYPE => Tag::NameAndType,
            tags::UTF_8 => Tag::Utf8,
            tags::METHOD_HANDLE => Tag::MethodHandle,
            tags::METHOD_TYPE => Tag::MethodType,
            tags::DYNAMIC => Tag::Dynamic,
            tags::INVOKE_DYNAMIC => Tag::InvokeDynamic,
            tags::MODULE => Tag::Module,
            tags::PACKAGE => Tag::Package,
            _ => Tag::Unknown(tag),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConstantPoolInfo {
    Class { name_index: constant_pool_index },
    FieldRef { class_index: constant_pool_index, name_and_type_index: constant_pool_index },
    MethodRef { class_index: constant_pool_index, name_and_type_index: constant_pool_index },
    InterfaceMethodRef {
        class_index: constant_pool_index,
        name_and_type_index: constant_pool_index,
    },
    String { string_index: constant_pool_index },
    Integer { bytes: u4 },
    Float { bytes: u4 },
    Long { high_bytes: u4, low_bytes: u4 },
    Double { high_bytes: u4, low_bytes: u4 },
    NameAndType {
        name_index: constant_pool_index,
        descriptor_index: constant_pool_index,
    },
    /// Raw modified UTF-8 bytes, kept undecoded so that re-encoding is exact.
    Utf8 { bytes: Vec<u1> },
    MethodHandle { reference_kind: u1, reference_index: constant_pool_index },
    MethodType { descriptor_index: constant_pool_index },
    Dynamic {
        bootstrap_method_attr_index: u2,
        name_and_type_index: constant_pool_index,
    },
    InvokeDynamic {
        /// A valid index into the `bootstrap_methods` array of the bootstrap
        /// method table.
        bootstrap_method_attr_index: u2,
        /// A valid index into the `constant_pool` table. The entry at that
        /// index must be a `ConstantPoolInfo::NameAndType` structure.
        name_and_type_index: constant_pool_index,
    },
    Module { name_index: constant_pool_index },
    Package { name_index: constant_pool_index },
    Unusable,
}

impl ConstantPoolInfo {
    pub fn tag(&self) -> Tag {
        match *self {
            ConstantPoolInfo::Class { .. } => Tag::Class,
            ConstantPoolInfo::FieldRef { .. } => Tag::FieldRef,
            ConstantPoolInfo::MethodRef { .. } => Tag::MethodRef,
            ConstantPoolInfo::InterfaceMethodRef { .. } => Tag::InterfaceMethodRef,
            ConstantPoolInfo::String { .. } => Tag::String,
            ConstantPoolInfo::Integer { .. } => Tag::Integer,
            ConstantPoolInfo::Float { .. } => Tag::Float,
            ConstantPoolInfo::Long { .. } => Tag::Long,
            ConstantPoolInfo::Double { .. } => Tag::Double,
            ConstantPoolInfo::NameAndType { .. } => Tag::NameAndType,
            ConstantPoolInfo::Utf8 { .. } => Tag::Utf8,
            ConstantPoolInfo::MethodHandle { .. } => Tag::MethodHandle,
            ConstantPoolInfo::MethodType { .. } => Tag::MethodType,
            ConstantPoolInfo::Dynamic { .. } => Tag::Dynamic,
            ConstantPoolInfo::InvokeDynamic { .. } => Tag::InvokeDynamic,
            ConstantPoolInfo::Module { .. } => Tag::Module,
            ConstantPoolInfo::Package { .. } => Tag::Package,
            ConstantPoolInfo::Unusable => Tag::Unusable,
        }
    }

    /// Long and double constants take up two slots in the table.
    pub fn is_wide(&self) -> bool {
        match *self {
            ConstantPoolInfo::Long { .. } | ConstantPoolInfo::Double { .. } => true,
            _ => false,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("constant pool index {index} is out of bounds")]
    IndexOutOfBounds { index: usize },
    #[error("constant pool entry #{index} is {actual:?}, expected {expected:?}")]
    UnexpectedType { index: usize, expected: Tag, actual: Tag },
    #[error("constant pool entry #{index}: {cause}")]
    ModifiedUtf8 { index: usize, cause: modified_utf8::Error },
    #[error("constant pool is full ({} entries)", MAX_INDEX)]
    Full,
}

/// A symbolic reference to a field or method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRef {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

/// The constant pool of a class file, indexed from 1.
///
/// Entries are never moved or removed, so indices handed out to instructions
/// and attributes stay valid across edits. Adding an entry that is equal to an
/// existing one returns the existing index.
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    entries: OneIndexedVec<ConstantPoolInfo>,
    lookup: HashMap<ConstantPoolInfo, constant_pool_index>,
}

impl ConstantPool {
    pub fn new() -> Self {
        ConstantPool::default()
    }

    /// Builds a pool from already laid out entries, including `Unusable`
    /// slots after wide constants.
    pub fn from_entries(entries: Vec<ConstantPoolInfo>) -> Self {
        let entries = OneIndexedVec::from(entries);
        let mut lookup = HashMap::new();
        for (index, info) in entries.indexed() {
            if *info != ConstantPoolInfo::Unusable {
                lookup.entry(info.clone()).or_insert(index as constant_pool_index);
            }
        }
        ConstantPool { entries, lookup }
    }

    /// The number of slots, not counting the unused slot 0.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The `constant_pool_count` value written to the class file.
    pub fn count(&self) -> u2 {
        (self.entries.len() + 1) as u2
    }

    pub fn get(&self, index: constant_pool_index) -> Option<&ConstantPoolInfo> {
        self.entries.get(index as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = (constant_pool_index, &ConstantPoolInfo)> {
        self.entries.indexed().map(|(i, info)| (i as constant_pool_index, info))
    }

    fn entry(&self, index: constant_pool_index, expected: Tag) -> Result<&ConstantPoolInfo, Error> {
        match self.get(index) {
            None => Err(Error::IndexOutOfBounds { index: index as usize }),
            Some(info) if info.tag() == expected => Ok(info),
            Some(info) => Err(Error::UnexpectedType {
                index: index as usize,
                expected,
                actual: info.tag(),
            }),
        }
    }

    /// Checks that `index` refers to an entry with the given tag.
    pub fn check(&self, index: constant_pool_index, expected: Tag) -> Result<(), Error> {
        self.entry(index, expected).map(|_| ())
    }

    pub fn utf8_bytes(&self, index: constant_pool_index) -> Result<&[u8], Error> {
        match *self.entry(index, Tag::Utf8)? {
            ConstantPoolInfo::Utf8 { ref bytes } => Ok(bytes),
            _ => unreachable!(),
        }
    }

    pub fn utf8(&self, index: constant_pool_index) -> Result<String, Error> {
        modified_utf8::to_string(self.utf8_bytes(index)?)
            .map_err(|cause| Error::ModifiedUtf8 { index: index as usize, cause })
    }

    /// Returns the internal name of the `CONSTANT_Class` entry at `index`.
    pub fn class_name(&self, index: constant_pool_index) -> Result<String, Error> {
        match *self.entry(index, Tag::Class)? {
            ConstantPoolInfo::Class { name_index } => self.utf8(name_index),
            _ => unreachable!(),
        }
    }

    pub fn module_name(&self, index: constant_pool_index) -> Result<String, Error> {
        match *self.entry(index, Tag::Module)? {
            ConstantPoolInfo::Module { name_index } => self.utf8(name_index),
            _ => unreachable!(),
        }
    }

    pub fn package_name(&self, index: constant_pool_index) -> Result<String, Error> {
        match *self.entry(index, Tag::Package)? {
            ConstantPoolInfo::Package { name_index } => self.utf8(name_index),
            _ => unreachable!(),
        }
    }

    /// Returns the value of the `CONSTANT_String` entry at `index`.
    pub fn string(&self, index: constant_pool_index) -> Result<String, Error> {
        match *self.entry(index, Tag::String)? {
            ConstantPoolInfo::String { string_index } => self.utf8(string_index),
            _ => unreachable!(),
        }
    }

    pub fn name_and_type(&self, index: constant_pool_index) -> Result<(String, String), Error> {
        match *self.entry(index, Tag::NameAndType)? {
            ConstantPoolInfo::NameAndType { name_index, descriptor_index } => {
                Ok((self.utf8(name_index)?, self.utf8(descriptor_index)?))
            }
            _ => unreachable!(),
        }
    }

    /// Resolves a field, method or interface method reference.
    pub fn member_ref(&self, index: constant_pool_index) -> Result<MemberRef, Error> {
        let (class_index, name_and_type_index) = match self.get(index) {
            Some(&ConstantPoolInfo::FieldRef { class_index, name_and_type_index })
            | Some(&ConstantPoolInfo::MethodRef { class_index, name_and_type_index })
            | Some(&ConstantPoolInfo::InterfaceMethodRef { class_index, name_and_type_index }) => {
                (class_index, name_and_type_index)
            }
            Some(info) => {
                return Err(Error::UnexpectedType {
                    index: index as usize,
                    expected: Tag::MethodRef,
                    actual: info.tag(),
                })
            }
            None => return Err(Error::IndexOutOfBounds { index: index as usize }),
        };
        let (name, descriptor) = self.name_and_type(name_and_type_index)?;
        Ok(MemberRef { owner: self.class_name(class_index)?, name, descriptor })
    }

    /// Returns the index of an entry equal to `info`, adding it if necessary.
    pub fn add(&mut self, info: ConstantPoolInfo) -> Result<constant_pool_index, Error> {
        if let Some(&index) = self.lookup.get(&info) {
            return Ok(index);
        }
        let slots = if info.is_wide() { 2 } else { 1 };
        if self.entries.len() + slots > MAX_INDEX {
            return Err(Error::Full);
        }
        let wide = info.is_wide();
        let index = self.entries.push(info.clone()) as constant_pool_index;
        if wide {
            self.entries.push(ConstantPoolInfo::Unusable);
        }
        self.lookup.insert(info, index);
        Ok(index)
    }

    pub fn add_utf8(&mut self, value: &str) -> Result<constant_pool_index, Error> {
        self.add(ConstantPoolInfo::Utf8 { bytes: modified_utf8::from_str(value) })
    }

    pub fn add_class(&mut self, name: &str) -> Result<constant_pool_index, Error> {
        let name_index = self.add_utf8(name)?;
        self.add(ConstantPoolInfo::Class { name_index })
    }

    pub fn add_string(&mut self, value: &str) -> Result<constant_pool_index, Error> {
        let string_index = self.add_utf8(value)?;
        self.add(ConstantPoolInfo::String { string_index })
    }

    pub fn add_integer(&mut self, value: i32) -> Result<constant_pool_index, Error> {
        self.add(ConstantPoolInfo::Integer { bytes: value as u32 })
    }

    pub fn add_module(&mut self, name: &str) -> Result<constant_pool_index, Error> {
        let name_index = self.add_utf8(name)?;
        self.add(ConstantPoolInfo::Module { name_index })
    }

    pub fn add_package(&mut self, name: &str) -> Result<constant_pool_index, Error> {
        let name_index = self.add_utf8(name)?;
        self.add(ConstantPoolInfo::Package { name_index })
    }

    pub fn add_name_and_type(
        &mut self,
        name: &str,
        descriptor: &str,
    ) -> Result<constant_pool_index, Error> {
        let name_index = self.add_utf8(name)?;
        let descriptor_index = self.add_utf8(descriptor)?;
        self.add(ConstantPoolInfo::NameAndType { name_index, descriptor_index })
    }

    pub fn add_field_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<constant_pool_index, Error> {
        let class_index = self.add_class(owner)?;
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        self.add(ConstantPoolInfo::FieldRef { class_index, name_and_type_index })
    }

    pub fn add_method_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<constant_pool_index, Error> {
        let class_index = self.add_class(owner)?;
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        self.add(ConstantPoolInfo::MethodRef { class_index, name_and_type_index })
    }

    pub fn add_interface_method_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<constant_pool_index, Error> {
        let class_index = self.add_class(owner)?;
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        self.add(ConstantPoolInfo::InterfaceMethodRef { class_index, name_and_type_index })
    }
}
