//! Structures for the [JVM class file
//! format](https://docs.oracle.com/javase/specs/jvms/se9/html/jvms-4.html).

pub mod access_flags;
pub mod attributes;
pub mod builder;
pub mod code;
pub mod constant_pool;
pub mod descriptor;
pub mod opcode;

pub use self::access_flags::class_access_flags;
pub use self::access_flags::field_access_flags;
pub use self::access_flags::method_access_flags;
pub use self::attributes::AttributeInfo;
pub use self::code::{Code, Insn, InsnId, InsnList, Label};
pub use self::constant_pool::ConstantPool;
pub use self::constant_pool::ConstantPoolInfo;

/// Represents an unsigned one-byte quantity.
#[allow(non_camel_case_types)]
pub type u1 = u8;

/// Represents an unsigned two-byte quantity.
#[allow(non_camel_case_types)]
pub type u2 = u16;

/// Represents an unsigned four-byte quantity.
#[allow(non_camel_case_types)]
pub type u4 = u32;

/// Represents an index into the constant pool.
#[allow(non_camel_case_types)]
pub type constant_pool_index = constant_pool::constant_pool_index;

pub const MAGIC: u4 = 0xCAFE_BABE;

/// The class file name reserved for module descriptors.
pub const MODULE_INFO: &str = "module-info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    /// Mask of flags used to denote access permissions to and properties of
    /// this field.
    pub access_flags: field_access_flags::t,
    /// A valid index into the `constant_pool` table. The `constant_pool` entry
    /// at that index must be a `ConstantPoolInfo::Utf8` structure representing
    /// a valid unqualified name denoting a field.
    pub name_index: constant_pool_index,
    /// A valid index into the `constant_pool` table. The `constant_pool` entry
    /// at that index must be a `ConstantPoolInfo::Utf8` structure representing
    /// a valid field descriptor.
    pub descriptor_index: constant_pool_index,
    /// The attributes associated with this field.
    pub attributes: Vec<AttributeInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    /// Mask of flags used to denote access permissions to and properties of
    /// this method.
    pub access_flags: method_access_flags::t,
    /// A valid index into the `constant_pool` table. The `constant_pool` entry
    /// at that index must be a `ConstantPoolInfo::Utf8` structure representing
    /// a valid unqualified name denoting a method.
    pub name_index: constant_pool_index,
    /// A valid index into the `constant_pool` table. The `constant_pool` entry
    /// at that index must be a `ConstantPoolInfo::Utf8` structure representing
    /// a valid method descriptor.
    pub descriptor_index: constant_pool_index,
    /// The attributes associated with this method.
    pub attributes: Vec<AttributeInfo>,
}

impl MethodInfo {
    pub fn code(&self) -> Option<&code::Code> {
        self.attributes.iter().find_map(|a| match *a {
            AttributeInfo::Code { ref code, .. } => Some(code),
            _ => None,
        })
    }

    pub fn code_mut(&mut self) -> Option<&mut code::Code> {
        self.attributes.iter_mut().find_map(|a| match *a {
            AttributeInfo::Code { ref mut code, .. } => Some(code),
            _ => None,
        })
    }

    pub fn is_static(&self) -> bool {
        self.access_flags & method_access_flags::ACC_STATIC != 0
    }
}

#[derive(Debug, Clone)]
pub struct ClassFile {
    /// Minor version number
    pub minor_version: u2,
    /// Major version number
    pub major_version: u2,
    /// Table of structures representing various string constants, class and
    /// interface names, field names, and other constants. The `constant_pool`
    /// table is indexed from 1 to `constant_pool_count - 1`.
    pub constant_pool: ConstantPool,
    /// Mask of flags used to denote access permissions to and properties of
    /// this class or interface.
    pub access_flags: class_access_flags::t,
    /// A valid index into the `constant_pool` table. The `constant_pool` entry
    /// at that index must be a `ConstantPoolInfo::Class` structure representing
    /// the class or interface defined by this class file.
    pub this_class: constant_pool_index,
    /// Zero (for `java/lang/Object` and module descriptors) or a
    /// `ConstantPoolInfo::Class` index denoting the direct superclass.
    pub super_class: constant_pool_index,
    /// `ConstantPoolInfo::Class` indices of the direct superinterfaces, in the
    /// order given in the source.
    pub interfaces: Vec<constant_pool_index>,
    /// Contains only those fields declared by this class or interface.
    pub fields: Vec<FieldInfo>,
    /// Contains only those methods declared by this class or interface.
    pub methods: Vec<MethodInfo>,
    /// Contains the attributes of this class.
    pub attributes: Vec<AttributeInfo>,
}

impl ClassFile {
    /// The internal (slash separated) name of this class.
    pub fn name(&self) -> Result<String, constant_pool::Error> {
        self.constant_pool.class_name(self.this_class)
    }

    pub fn is_module_info(&self) -> bool {
        self.access_flags & class_access_flags::ACC_MODULE != 0
    }

    /// Returns the first class attribute with the given name.
    pub fn find_attribute(&self, name: &str) -> Option<&AttributeInfo> {
        let cp = &self.constant_pool;
        self.attributes
            .iter()
            .find(|a| cp.utf8_bytes(a.name_index()).map(|b| b == name.as_bytes()).unwrap_or(false))
    }

    /// Removes every class attribute with the given name and returns how many
    /// were removed.
    pub fn remove_attributes(&mut self, name: &str) -> usize {
        let cp = &self.constant_pool;
        let before = self.attributes.len();
        self.attributes
            .retain(|a| cp.utf8_bytes(a.name_index()).map(|b| b != name.as_bytes()).unwrap_or(true));
        before - self.attributes.len()
    }
}

/// Returns the package of an internal class name, or `""` for the unnamed
/// package.
pub fn package_of(internal_name: &str) -> &str {
    match internal_name.rfind('/') {
        Some(i) => &internal_name[..i],
        None => "",
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_package_of() {
        assert_eq!(package_of("java/lang/Object"), "java/lang");
        assert_eq!(package_of("Main"), "");
    }
}
