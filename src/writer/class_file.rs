use std::io;

use byteorder::{BigEndian, WriteBytesExt};

use super::code::{self, to_u16, Assembled};
use super::{RecomputeMode, Serialize};
use crate::error::{Error, Result};
use crate::model::class_file::attributes::{AttributeInfo, LocalVariableInfo, ModuleInfo, PackageAccessInfo};
use crate::model::class_file::constant_pool::{tags, ConstantPool, ConstantPoolInfo};
use crate::model::class_file::{ClassFile, MethodInfo, MAGIC};
use crate::parser;

impl Serialize for ConstantPoolInfo {
    fn serialize<W: WriteBytesExt>(&self, w: &mut W) -> io::Result<()> {
        match *self {
            ConstantPoolInfo::Class { name_index } => {
                w.write_u8(tags::CLASS)?;
                w.write_u16::<BigEndian>(name_index)
            }
            ConstantPoolInfo::FieldRef { class_index, name_and_type_index } => {
                w.write_u8(tags::FIELD_REF)?;
                w.write_u16::<BigEndian>(class_index)?;
                w.write_u16::<BigEndian>(name_and_type_index)
            }
            ConstantPoolInfo::MethodRef { class_index, name_and_type_index } => {
                w.write_u8(tags::METHOD_REF)?;
                w.write_u16::<BigEndian>(class_index)?;
                w.write_u16::<BigEndian>(name_and_type_index)
            }
            ConstantPoolInfo::InterfaceMethodRef { class_index, name_and_type_index } => {
                w.write_u8(tags::INTERFACE_METHOD_REF)?;
                w.write_u16::<BigEndian>(class_index)?;
                w.write_u16::<BigEndian>(name_and_type_index)
            }
            ConstantPoolInfo::String { string_index } => {
                w.write_u8(tags::STRING)?;
                w.write_u16::<BigEndian>(string_index)
            }
            ConstantPoolInfo::Integer { bytes } => {
                w.write_u8(tags::INTEGER)?;
                w.write_u32::<BigEndian>(bytes)
            }
            ConstantPoolInfo::Float { bytes } => {
                w.write_u8(tags::FLOAT)?;
                w.write_u32::<BigEndian>(bytes)
            }
            ConstantPoolInfo::Long { high_bytes, low_bytes } => {
                w.write_u8(tags::LONG)?;
                w.write_u32::<BigEndian>(high_bytes)?;
                w.write_u32::<BigEndian>(low_bytes)
            }
            ConstantPoolInfo::Double { high_bytes, low_bytes } => {
                w.write_u8(tags::DOUBLE)?;
                w.write_u32::<BigEndian>(high_bytes)?;
                w.write_u32::<BigEndian>(low_bytes)
            }
            ConstantPoolInfo::NameAndType { name_index, descriptor_index } => {
                w.write_u8(tags::NAME_AND_TYPE)?;
                w.write_u16::<BigEndian>(name_index)?;
                w.write_u16::<BigEndian>(descriptor_index)
            }
            ConstantPoolInfo::Utf8 { ref bytes } => {
                if bytes.len() > 0xffff {
                    return Err(io::Error::new(io::ErrorKind::InvalidData, "UTF-8 constant longer than 65535 bytes"));
                }
                w.write_u8(tags::UTF_8)?;
                w.write_u16::<BigEndian>(bytes.len() as u16)?;
                w.write_all(bytes)
            }
            ConstantPoolInfo::MethodHandle { reference_kind, reference_index } => {
                w.write_u8(tags::METHOD_HANDLE)?;
                w.write_u8(reference_kind)?;
                w.write_u16::<BigEndian>(reference_index)
            }
            ConstantPoolInfo::MethodType { descriptor_index } => {
                w.write_u8(tags::METHOD_TYPE)?;
                w.write_u16::<BigEndian>(descriptor_index)
            }
            ConstantPoolInfo::Dynamic { bootstrap_method_attr_index, name_and_type_index } => {
                w.write_u8(tags::DYNAMIC)?;
                w.write_u16::<BigEndian>(bootstrap_method_attr_index)?;
                w.write_u16::<BigEndian>(name_and_type_index)
            }
            ConstantPoolInfo::InvokeDynamic { bootstrap_method_attr_index, name_and_type_index } => {
                w.write_u8(tags::INVOKE_DYNAMIC)?;
                w.write_u16::<BigEndian>(bootstrap_method_attr_index)?;
                w.write_u16::<BigEndian>(name_and_type_index)
            }
            ConstantPoolInfo::Module { name_index } => {
                w.write_u8(tags::MODULE)?;
                w.write_u16::<BigEndian>(name_index)
            }
            ConstantPoolInfo::Package { name_index } => {
                w.write_u8(tags::PACKAGE)?;
                w.write_u16::<BigEndian>(name_index)
            }
            // The second slot of a long or double has no encoding of its own.
            ConstantPoolInfo::Unusable => Ok(()),
        }
    }
}

impl Serialize for ConstantPool {
    fn serialize<W: WriteBytesExt>(&self, w: &mut W) -> io::Result<()> {
        w.write_u16::<BigEndian>(self.count())?;
        for (_, info) in self.iter() {
            info.serialize(w)?;
        }
        Ok(())
    }
}

fn write_u16_list<W: WriteBytesExt>(w: &mut W, values: &[u16]) -> io::Result<()> {
    w.write_u16::<BigEndian>(values.len() as u16)?;
    for &v in values {
        w.write_u16::<BigEndian>(v)?;
    }
    Ok(())
}

fn write_package_access<W: WriteBytesExt>(w: &mut W, entries: &[PackageAccessInfo]) -> io::Result<()> {
    w.write_u16::<BigEndian>(entries.len() as u16)?;
    for entry in entries {
        w.write_u16::<BigEndian>(entry.package_index)?;
        w.write_u16::<BigEndian>(entry.flags)?;
        write_u16_list(w, &entry.to_index)?;
    }
    Ok(())
}

impl Serialize for ModuleInfo {
    fn serialize<W: WriteBytesExt>(&self, w: &mut W) -> io::Result<()> {
        w.write_u16::<BigEndian>(self.module_name_index)?;
        w.write_u16::<BigEndian>(self.module_flags)?;
        w.write_u16::<BigEndian>(self.module_version_index)?;
        w.write_u16::<BigEndian>(self.requires.len() as u16)?;
        for r in &self.requires {
            w.write_u16::<BigEndian>(r.requires_index)?;
            w.write_u16::<BigEndian>(r.requires_flags)?;
            w.write_u16::<BigEndian>(r.requires_version_index)?;
        }
        write_package_access(w, &self.exports)?;
        write_package_access(w, &self.opens)?;
        write_u16_list(w, &self.uses_index)?;
        w.write_u16::<BigEndian>(self.provides.len() as u16)?;
        for p in &self.provides {
            w.write_u16::<BigEndian>(p.provides_index)?;
            write_u16_list(w, &p.provides_with_index)?;
        }
        Ok(())
    }
}

/// What an attribute encoder may need besides the attribute itself.
#[derive(Clone, Copy)]
pub struct AttributeContext<'a> {
    pub cp: &'a ConstantPool,
    pub mode: RecomputeMode,
    /// The method owning a `Code` attribute being written.
    pub method: Option<&'a MethodInfo>,
    /// Label positions, when writing the attributes of a `Code` attribute.
    pub labels: Option<&'a Assembled>,
}

impl<'a> AttributeContext<'a> {
    fn labels(&self) -> Result<&'a Assembled> {
        self.labels
            .ok_or_else(|| Error::Invariant("code-relative attribute outside of a Code attribute".to_owned()))
    }
}

fn write_local_variables(out: &mut Vec<u8>, entries: &[LocalVariableInfo], labels: &Assembled) -> Result<()> {
    out.write_u16::<BigEndian>(to_u16("local variable table length", entries.len())?)?;
    for entry in entries {
        let start = labels.pc(entry.start)?;
        let end = labels.pc(entry.end)?;
        if end < start {
            return Err(Error::Invariant(format!("local variable range {}..{} is reversed", start, end)));
        }
        out.write_u16::<BigEndian>(to_u16("local variable start", start as usize)?)?;
        out.write_u16::<BigEndian>(to_u16("local variable length", (end - start) as usize)?)?;
        out.write_u16::<BigEndian>(entry.name_index)?;
        out.write_u16::<BigEndian>(entry.descriptor_index)?;
        out.write_u16::<BigEndian>(entry.index)?;
    }
    Ok(())
}

fn write_attribute_body(out: &mut Vec<u8>, attribute: &AttributeInfo, ctx: &AttributeContext) -> Result<()> {
    match *attribute {
        AttributeInfo::Code { ref code, .. } => code::write_code(out, code, ctx)?,
        AttributeInfo::StackMapTable { ref entries, .. } => {
            code::write_stack_map_table(out, entries, ctx.labels()?, ctx.mode)?
        }
        AttributeInfo::SourceFile { sourcefile_index, .. } => out.write_u16::<BigEndian>(sourcefile_index)?,
        AttributeInfo::SourceDebugExtension { ref debug_extension, .. } => out.extend_from_slice(debug_extension),
        AttributeInfo::LineNumberTable { ref entries, .. } => {
            let labels = ctx.labels()?;
            out.write_u16::<BigEndian>(to_u16("line number table length", entries.len())?)?;
            for entry in entries {
                out.write_u16::<BigEndian>(to_u16("line number start", labels.pc(entry.start)? as usize)?)?;
                out.write_u16::<BigEndian>(entry.line_number)?;
            }
        }
        AttributeInfo::LocalVariableTable { ref entries, .. }
        | AttributeInfo::LocalVariableTypeTable { ref entries, .. } => {
            write_local_variables(out, entries, ctx.labels()?)?
        }
        AttributeInfo::Module { ref module, .. } => module.serialize(out)?,
        AttributeInfo::ModulePackages { ref package_index, .. } => {
            to_u16("module packages", package_index.len())?;
            write_u16_list(out, package_index)?
        }
        AttributeInfo::ModuleMainClass { main_class_index, .. } => out.write_u16::<BigEndian>(main_class_index)?,
        AttributeInfo::ModuleTarget { target_platform_index, .. } => {
            out.write_u16::<BigEndian>(target_platform_index)?
        }
        AttributeInfo::ModuleHashes { algorithm_index, ref hashes, .. } => {
            out.write_u16::<BigEndian>(algorithm_index)?;
            out.write_u16::<BigEndian>(to_u16("module hashes", hashes.len())?)?;
            for h in hashes {
                out.write_u16::<BigEndian>(h.module_name_index)?;
                out.write_u16::<BigEndian>(to_u16("module hash length", h.hash.len())?)?;
                out.extend_from_slice(&h.hash);
            }
        }
        AttributeInfo::ModuleResolution { resolution_flags, .. } => out.write_u16::<BigEndian>(resolution_flags)?,
        AttributeInfo::Unknown { ref info, .. } => out.extend_from_slice(info),
    }
    Ok(())
}

/// Writes an attribute count followed by each attribute as name index,
/// length and body.
pub fn write_attributes(out: &mut Vec<u8>, attributes: &[AttributeInfo], ctx: &AttributeContext) -> Result<()> {
    out.write_u16::<BigEndian>(to_u16("attribute count", attributes.len())?)?;
    for attribute in attributes {
        let mut body = Vec::new();
        write_attribute_body(&mut body, attribute, ctx)?;
        if body.len() > u32::max_value() as usize {
            return Err(Error::EncodingLimitExceeded {
                what: "attribute length",
                value: body.len() as i64,
                limit: i64::from(u32::max_value()),
            });
        }
        out.write_u16::<BigEndian>(attribute.name_index())?;
        out.write_u32::<BigEndian>(body.len() as u32)?;
        out.extend_from_slice(&body);
    }
    Ok(())
}

/// Encodes a class file. With `RecomputeMode::Verbatim`, decoding a class
/// and encoding it again yields the original bytes.
pub fn encode(class: &ClassFile, mode: RecomputeMode) -> Result<Vec<u8>> {
    let cp = &class.constant_pool;
    let mut out = Vec::new();
    out.write_u32::<BigEndian>(MAGIC)?;
    out.write_u16::<BigEndian>(class.minor_version)?;
    out.write_u16::<BigEndian>(class.major_version)?;
    cp.serialize(&mut out)?;
    out.write_u16::<BigEndian>(class.access_flags)?;
    out.write_u16::<BigEndian>(class.this_class)?;
    out.write_u16::<BigEndian>(class.super_class)?;
    write_u16_list(&mut out, &class.interfaces)?;

    let ctx = AttributeContext { cp, mode, method: None, labels: None };
    out.write_u16::<BigEndian>(to_u16("field count", class.fields.len())?)?;
    for field in &class.fields {
        out.write_u16::<BigEndian>(field.access_flags)?;
        out.write_u16::<BigEndian>(field.name_index)?;
        out.write_u16::<BigEndian>(field.descriptor_index)?;
        write_attributes(&mut out, &field.attributes, &ctx)?;
    }
    out.write_u16::<BigEndian>(to_u16("method count", class.methods.len())?)?;
    for method in &class.methods {
        out.write_u16::<BigEndian>(method.access_flags)?;
        out.write_u16::<BigEndian>(method.name_index)?;
        out.write_u16::<BigEndian>(method.descriptor_index)?;
        let ctx = AttributeContext { method: Some(method), ..ctx };
        write_attributes(&mut out, &method.attributes, &ctx)?;
    }
    write_attributes(&mut out, &class.attributes, &ctx)?;
    Ok(out)
}

/// Encodes a class file and decodes the result again, so that a rewrite
/// that produced a structurally broken class fails here rather than at
/// class load time.
pub fn encode_verified(class: &ClassFile, mode: RecomputeMode) -> Result<Vec<u8>> {
    let bytes = encode(class, mode)?;
    if let Err(e) = parser::parse_class_file(&bytes) {
        let name = class.name().unwrap_or_else(|_| "<unnamed>".to_owned());
        return Err(Error::MalformedInput(format!("re-encoded class {} does not decode: {}", name, e)));
    }
    Ok(bytes)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::class_file::builder::ClassBuilder;
    use crate::model::class_file::class_access_flags::ACC_PUBLIC;
    use crate::model::class_file::method_access_flags::ACC_STATIC;

    #[test]
    fn test_encode_decode_encode_is_stable() {
        let mut builder = ClassBuilder::new("p/Hello", ACC_PUBLIC);
        builder
            .method(ACC_PUBLIC | ACC_STATIC, "answer", "()I", |code| {
                code.push_int(42)?;
                code.ireturn();
                Ok(())
            })
            .unwrap();
        let class = builder.build();
        let bytes = encode(&class, RecomputeMode::Recompute).unwrap();
        let decoded = parser::parse_class_file(&bytes).unwrap();
        assert_eq!(decoded.name().unwrap(), "p/Hello");
        assert_eq!(encode(&decoded, RecomputeMode::Verbatim).unwrap(), bytes);
        let code = decoded.methods[0].code().unwrap();
        assert_eq!((code.max_stack, code.max_locals), (1, 0));
    }

    #[test]
    fn test_code_attributes_need_labels() {
        let mut cp = ConstantPool::new();
        let name = cp.add_utf8("LineNumberTable").unwrap();
        let attribute = AttributeInfo::LineNumberTable { attribute_name_index: name, entries: Vec::new() };
        let ctx = AttributeContext { cp: &cp, mode: RecomputeMode::Verbatim, method: None, labels: None };
        let mut out = Vec::new();
        let err = write_attributes(&mut out, &[attribute], &ctx).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvariantViolation);
    }
}
