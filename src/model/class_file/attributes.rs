//! Attributes (JVMS §4.7) the linker reads or rewrites. Every other attribute
//! is kept as `AttributeInfo::Unknown` and written back untouched.

use super::code::{Code, Label};
use super::constant_pool_index;
use super::u1;
use super::u2;

pub use self::stack_map_frame::StackMapFrame;
pub use self::stack_map_frame::VerificationTypeInfo;

pub mod names {
    pub const CODE: &str = "Code";
    pub const STACK_MAP_TABLE: &str = "StackMapTable";
    pub const SOURCE_FILE: &str = "SourceFile";
    pub const SOURCE_DEBUG_EXTENSION: &str = "SourceDebugExtension";
    pub const LINE_NUMBER_TABLE: &str = "LineNumberTable";
    pub const LOCAL_VARIABLE_TABLE: &str = "LocalVariableTable";
    pub const LOCAL_VARIABLE_TYPE_TABLE: &str = "LocalVariableTypeTable";
    pub const MODULE: &str = "Module";
    pub const MODULE_PACKAGES: &str = "ModulePackages";
    pub const MODULE_MAIN_CLASS: &str = "ModuleMainClass";
    pub const MODULE_TARGET: &str = "ModuleTarget";
    pub const MODULE_HASHES: &str = "ModuleHashes";
    pub const MODULE_RESOLUTION: &str = "ModuleResolution";
}

/// Every variant records the index of its name in the constant pool, so that a
/// class file with duplicate `Utf8` entries still encodes back to the same
/// bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeInfo {
    Code { attribute_name_index: constant_pool_index, code: Code },
    StackMapTable { attribute_name_index: constant_pool_index, entries: Vec<StackMapFrame> },
    SourceFile { attribute_name_index: constant_pool_index, sourcefile_index: constant_pool_index },
    SourceDebugExtension { attribute_name_index: constant_pool_index, debug_extension: Vec<u1> },
    LineNumberTable { attribute_name_index: constant_pool_index, entries: Vec<LineNumberInfo> },
    LocalVariableTable {
        attribute_name_index: constant_pool_index,
        entries: Vec<LocalVariableInfo>,
    },
    /// Same layout as `LocalVariableTable`; `descriptor_index` holds the
    /// signature.
    LocalVariableTypeTable {
        attribute_name_index: constant_pool_index,
        entries: Vec<LocalVariableInfo>,
    },
    Module { attribute_name_index: constant_pool_index, module: ModuleInfo },
    ModulePackages {
        attribute_name_index: constant_pool_index,
        package_index: Vec<constant_pool_index>,
    },
    ModuleMainClass {
        attribute_name_index: constant_pool_index,
        main_class_index: constant_pool_index,
    },
    /// `target_platform_index` is zero when no platform is recorded.
    ModuleTarget {
        attribute_name_index: constant_pool_index,
        target_platform_index: constant_pool_index,
    },
    ModuleHashes {
        attribute_name_index: constant_pool_index,
        algorithm_index: constant_pool_index,
        hashes: Vec<ModuleHash>,
    },
    ModuleResolution { attribute_name_index: constant_pool_index, resolution_flags: u2 },
    Unknown { attribute_name_index: constant_pool_index, info: Vec<u1> },
}

impl AttributeInfo {
    pub fn name_index(&self) -> constant_pool_index {
        match *self {
            AttributeInfo::Code { attribute_name_index, .. }
            | AttributeInfo::StackMapTable { attribute_name_index, .. }
            | AttributeInfo::SourceFile { attribute_name_index, .. }
            | AttributeInfo::SourceDebugExtension { attribute_name_index, .. }
            | AttributeInfo::LineNumberTable { attribute_name_index, .. }
            | AttributeInfo::LocalVariableTable { attribute_name_index, .. }
            | AttributeInfo::LocalVariableTypeTable { attribute_name_index, .. }
            | AttributeInfo::Module { attribute_name_index, .. }
            | AttributeInfo::ModulePackages { attribute_name_index, .. }
            | AttributeInfo::ModuleMainClass { attribute_name_index, .. }
            | AttributeInfo::ModuleTarget { attribute_name_index, .. }
            | AttributeInfo::ModuleHashes { attribute_name_index, .. }
            | AttributeInfo::ModuleResolution { attribute_name_index, .. }
            | AttributeInfo::Unknown { attribute_name_index, .. } => attribute_name_index,
        }
    }

    /// Debugging information that can be dropped without changing behavior.
    pub fn is_debug_info(&self) -> bool {
        match *self {
            AttributeInfo::SourceFile { .. }
            | AttributeInfo::SourceDebugExtension { .. }
            | AttributeInfo::LineNumberTable { .. }
            | AttributeInfo::LocalVariableTable { .. }
            | AttributeInfo::LocalVariableTypeTable { .. } => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumberInfo {
    pub start: Label,
    pub line_number: u2,
}

/// A local variable live in `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalVariableInfo {
    pub start: Label,
    pub end: Label,
    pub name_index: constant_pool_index,
    pub descriptor_index: constant_pool_index,
    pub index: u2,
}

/// The body of the `Module` attribute (JVMS §4.7.25).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    /// A `ConstantPoolInfo::Module` index.
    pub module_name_index: constant_pool_index,
    pub module_flags: u2,
    /// Zero, or a `ConstantPoolInfo::Utf8` index.
    pub module_version_index: constant_pool_index,
    pub requires: Vec<RequiresInfo>,
    pub exports: Vec<PackageAccessInfo>,
    pub opens: Vec<PackageAccessInfo>,
    /// `ConstantPoolInfo::Class` indices.
    pub uses_index: Vec<constant_pool_index>,
    pub provides: Vec<ProvidesInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequiresInfo {
    pub requires_index: constant_pool_index,
    pub requires_flags: u2,
    pub requires_version_index: constant_pool_index,
}

/// An `exports` or `opens` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageAccessInfo {
    /// A `ConstantPoolInfo::Package` index.
    pub package_index: constant_pool_index,
    pub flags: u2,
    /// `ConstantPoolInfo::Module` indices of a qualified export; empty if
    /// unqualified.
    pub to_index: Vec<constant_pool_index>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvidesInfo {
    pub provides_index: constant_pool_index,
    pub provides_with_index: Vec<constant_pool_index>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleHash {
    /// A `ConstantPoolInfo::Module` index.
    pub module_name_index: constant_pool_index,
    pub hash: Vec<u1>,
}

pub mod stack_map_frame {
    use super::super::constant_pool_index;
    use super::super::u1;
    use super::Label;

    pub use self::verification_type_info::VerificationTypeInfo;

    /// A `StackMapFrame` applies at the instruction following its `label`.
    /// The variant is the frame type as it was read; the encoder derives the
    /// `offset_delta` from the label positions.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum StackMapFrame {
        SameFrame { label: Label },
        SameLocals1StackItemFrame { label: Label, stack_item: VerificationTypeInfo },
        SameLocals1StackItemFrameExtended { label: Label, stack_item: VerificationTypeInfo },
        ChopFrame { label: Label, num_chopped: u1 },
        SameFrameExtended { label: Label },
        AppendFrame { label: Label, locals: Vec<VerificationTypeInfo> },
        FullFrame {
            label: Label,
            locals: Vec<VerificationTypeInfo>,
            stack: Vec<VerificationTypeInfo>,
        },
    }

    impl StackMapFrame {
        pub fn label(&self) -> Label {
            match *self {
                StackMapFrame::SameFrame { label }
                | StackMapFrame::SameLocals1StackItemFrame { label, .. }
                | StackMapFrame::SameLocals1StackItemFrameExtended { label, .. }
                | StackMapFrame::ChopFrame { label, .. }
                | StackMapFrame::SameFrameExtended { label }
                | StackMapFrame::AppendFrame { label, .. }
                | StackMapFrame::FullFrame { label, .. } => label,
            }
        }

        /// The verification types of the locals and stack items the frame
        /// spells out, in encoding order.
        pub fn verification_types(&self) -> Vec<&VerificationTypeInfo> {
            match *self {
                StackMapFrame::SameLocals1StackItemFrame { ref stack_item, .. }
                | StackMapFrame::SameLocals1StackItemFrameExtended { ref stack_item, .. } => {
                    vec![stack_item]
                }
                StackMapFrame::AppendFrame { ref locals, .. } => locals.iter().collect(),
                StackMapFrame::FullFrame { ref locals, ref stack, .. } => {
                    locals.iter().chain(stack.iter()).collect()
                }
                _ => Vec::new(),
            }
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Tag {
        SameFrame(u1),
        SameLocals1StackItemFrame(u1),
        SameLocals1StackItemFrameExtended(u1),
        ChopFrame(u1),
        SameFrameExtended(u1),
        AppendFrame(u1),
        FullFrame(u1),
        Reserved(u1),
    }

    impl From<u1> for Tag {
        fn from(t: u1) -> Self {
            match t {
                0..=63 => Tag::SameFrame(t),
                64..=127 => Tag::SameLocals1StackItemFrame(t),
                247 => Tag::SameLocals1StackItemFrameExtended(t),
                248..=250 => Tag::ChopFrame(t),
                251 => Tag::SameFrameExtended(t),
                252..=254 => Tag::AppendFrame(t),
                255 => Tag::FullFrame(t),
                128..=246 => Tag::Reserved(t),
            }
        }
    }

    pub mod verification_type_info {
        use super::super::super::constant_pool_index;
        use super::super::super::u1;
        use super::Label;

        pub mod tags {
            use super::u1;
            pub const TOP: u1 = 0;
            pub const INTEGER: u1 = 1;
            pub const FLOAT: u1 = 2;
            pub const DOUBLE: u1 = 3;
            pub const LONG: u1 = 4;
            pub const NULL: u1 = 5;
            pub const UNINITIALIZED_THIS: u1 = 6;
            pub const OBJECT: u1 = 7;
            pub const UNINITIALIZED: u1 = 8;
        }

        #[derive(Debug, Clone, PartialEq, Eq)]
        pub enum VerificationTypeInfo {
            Top,
            Integer,
            Float,
            Long,
            Double,
            Null,
            UninitializedThis,
            Object { class_index: constant_pool_index },
            Uninitialized {
                /// Marks the _new_ instruction that created the object stored
                /// in the location.
                label: Label,
            },
        }

        impl VerificationTypeInfo {
            pub fn tag(&self) -> u1 {
                match *self {
                    VerificationTypeInfo::Top => tags::TOP,
                    VerificationTypeInfo::Integer => tags::INTEGER,
                    VerificationTypeInfo::Float => tags::FLOAT,
                    VerificationTypeInfo::Long => tags::LONG,
                    VerificationTypeInfo::Double => tags::DOUBLE,
                    VerificationTypeInfo::Null => tags::NULL,
                    VerificationTypeInfo::UninitializedThis => tags::UNINITIALIZED_THIS,
                    VerificationTypeInfo::Object { .. } => tags::OBJECT,
                    VerificationTypeInfo::Uninitialized { .. } => tags::UNINITIALIZED,
                }
            }
        }
    }
}
