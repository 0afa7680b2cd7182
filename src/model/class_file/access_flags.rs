//! Access and property flag masks (JVMS §4.1, §4.5, §4.6, §4.7.25).

#![allow(non_camel_case_types)]

pub mod class_access_flags {
    pub type t = u16;
    pub const ACC_PUBLIC: t = 0x0001;
    pub const ACC_PRIVATE: t = 0x0002;
    pub const ACC_PROTECTED: t = 0x0004;
    pub const ACC_FINAL: t = 0x0010;
    pub const ACC_SUPER: t = 0x0020;
    pub const ACC_INTERFACE: t = 0x0200;
    pub const ACC_ABSTRACT: t = 0x0400;
    pub const ACC_SYNTHETIC: t = 0x1000;
    pub const ACC_ANNOTATION: t = 0x2000;
    pub const ACC_ENUM: t = 0x4000;
    pub const ACC_MODULE: t = 0x8000;
}

pub mod field_access_flags {
    pub type t = u16;
    pub const ACC_PUBLIC: t = 0x0001;
    pub const ACC_PRIVATE: t = 0x0002;
    pub const ACC_PROTECTED: t = 0x0004;
    pub const ACC_STATIC: t = 0x0008;
    pub const ACC_FINAL: t = 0x0010;
    pub const ACC_VOLATILE: t = 0x0040;
    pub const ACC_TRANSIENT: t = 0x0080;
    pub const ACC_SYNTHETIC: t = 0x1000;
    pub const ACC_ENUM: t = 0x4000;
}

pub mod method_access_flags {
    pub type t = u16;
    pub const ACC_PUBLIC: t = 0x0001;
    pub const ACC_PRIVATE: t = 0x0002;
    pub const ACC_PROTECTED: t = 0x0004;
    pub const ACC_STATIC: t = 0x0008;
    pub const ACC_FINAL: t = 0x0010;
    pub const ACC_SYNCHRONIZED: t = 0x0020;
    pub const ACC_BRIDGE: t = 0x0040;
    pub const ACC_VARARGS: t = 0x0080;
    pub const ACC_NATIVE: t = 0x0100;
    pub const ACC_ABSTRACT: t = 0x0400;
    pub const ACC_STRICT: t = 0x0800;
    pub const ACC_SYNTHETIC: t = 0x1000;
}

/// Flags of the `Module` attribute's `module_flags` item.
pub mod module_flags {
    pub type t = u16;
    pub const ACC_OPEN: t = 0x0020;
    pub const ACC_SYNTHETIC: t = 0x1000;
    pub const ACC_MANDATED: t = 0x8000;
}

/// Flags of a `requires` entry.
pub mod requires_flags {
    pub type t = u16;
    pub const ACC_TRANSITIVE: t = 0x0020;
    pub const ACC_STATIC_PHASE: t = 0x0040;
    pub const ACC_SYNTHETIC: t = 0x1000;
    pub const ACC_MANDATED: t = 0x8000;
}

/// Flags of an `exports` or `opens` entry.
pub mod exports_flags {
    pub type t = u16;
    pub const ACC_SYNTHETIC: t = 0x1000;
    pub const ACC_MANDATED: t = 0x8000;
}
