//! Structures for the class file format and for module descriptors.

pub mod class_file;
pub mod module_descriptor;
