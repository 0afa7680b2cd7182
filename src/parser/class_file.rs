use nom::bytes::complete::take;
use nom::combinator::map;
use nom::multi::length_count;
use nom::number::complete::{be_u16, be_u32, be_u8};
use nom::sequence::{pair, tuple};

use super::{code, cut, finish, section, Error, Input, ParseResult};
use crate::model::class_file::attributes::{
    names, AttributeInfo, ModuleHash, ModuleInfo, PackageAccessInfo, ProvidesInfo, RequiresInfo,
};
use crate::model::class_file::constant_pool::{ConstantPool, ConstantPoolInfo, Tag};
use crate::model::class_file::{constant_pool_index, ClassFile, FieldInfo, MethodInfo, MAGIC};
use crate::util::modified_utf8;

fn magic(input: Input) -> ParseResult<()> {
    let (input, magic) = be_u32(input)?;
    if magic != MAGIC {
        p_fail!(Error::Magic);
    }
    Ok((input, ()))
}

/// Parses for a constant pool index and verifies that the entry in the
/// constant pool matches the specified tag.
pub fn cp_index_tag<'a>(input: Input<'a>, cp: &ConstantPool, tag: Tag) -> ParseResult<'a, constant_pool_index> {
    let (input, i) = be_u16(input)?;
    cp.check(i, tag)?;
    Ok((input, i))
}

/// Parses for a constant pool index that might be zero and verifies that a
/// non-zero index refers to an entry with the specified tag.
pub fn maybe_cp_index_tag<'a>(
    input: Input<'a>,
    cp: &ConstantPool,
    tag: Tag,
) -> ParseResult<'a, constant_pool_index> {
    let (input, i) = be_u16(input)?;
    if i != 0 {
        cp.check(i, tag)?;
    }
    Ok((input, i))
}

fn ref_pair<'a>(input: Input<'a>) -> ParseResult<'a, (u16, u16)> {
    pair(be_u16, be_u16)(input)
}

fn cp_info(input: Input, index: usize) -> ParseResult<ConstantPoolInfo> {
    let (input, tag) = be_u8(input)?;
    match Tag::from(tag) {
        Tag::Class => map(be_u16, |name_index| ConstantPoolInfo::Class { name_index })(input),
        Tag::FieldRef => map(ref_pair, |(class_index, name_and_type_index)| {
            ConstantPoolInfo::FieldRef { class_index, name_and_type_index }
        })(input),
        Tag::MethodRef => map(ref_pair, |(class_index, name_and_type_index)| {
            ConstantPoolInfo::MethodRef { class_index, name_and_type_index }
        })(input),
        Tag::InterfaceMethodRef => map(ref_pair, |(class_index, name_and_type_index)| {
            ConstantPoolInfo::InterfaceMethodRef { class_index, name_and_type_index }
        })(input),
        Tag::String => map(be_u16, |string_index| ConstantPoolInfo::String { string_index })(input),
        Tag::Integer => map(be_u32, |bytes| ConstantPoolInfo::Integer { bytes })(input),
        Tag::Float => map(be_u32, |bytes| ConstantPoolInfo::Float { bytes })(input),
        Tag::Long => map(pair(be_u32, be_u32), |(high_bytes, low_bytes)| {
            ConstantPoolInfo::Long { high_bytes, low_bytes }
        })(input),
        Tag::Double => map(pair(be_u32, be_u32), |(high_bytes, low_bytes)| {
            ConstantPoolInfo::Double { high_bytes, low_bytes }
        })(input),
        Tag::NameAndType => map(ref_pair, |(name_index, descriptor_index)| {
            ConstantPoolInfo::NameAndType { name_index, descriptor_index }
        })(input),
        Tag::Utf8 => {
            let (input, bytes) = length_count(be_u16, be_u8)(input)?;
            if let Some(&byte) = bytes.iter().find(|&&b| modified_utf8::is_illegal(b)) {
                p_fail!(Error::IllegalModifiedUtf8 { byte });
            }
            Ok((input, ConstantPoolInfo::Utf8 { bytes }))
        }
        Tag::MethodHandle => map(pair(be_u8, be_u16), |(reference_kind, reference_index)| {
            ConstantPoolInfo::MethodHandle { reference_kind, reference_index }
        })(input),
        Tag::MethodType => {
            map(be_u16, |descriptor_index| ConstantPoolInfo::MethodType { descriptor_index })(input)
        }
        Tag::Dynamic => map(ref_pair, |(bootstrap_method_attr_index, name_and_type_index)| {
            ConstantPoolInfo::Dynamic { bootstrap_method_attr_index, name_and_type_index }
        })(input),
        Tag::InvokeDynamic => map(ref_pair, |(bootstrap_method_attr_index, name_and_type_index)| {
            ConstantPoolInfo::InvokeDynamic { bootstrap_method_attr_index, name_and_type_index }
        })(input),
        Tag::Module => map(be_u16, |name_index| ConstantPoolInfo::Module { name_index })(input),
        Tag::Package => map(be_u16, |name_index| ConstantPoolInfo::Package { name_index })(input),
        Tag::Unusable | Tag::Unknown(_) => p_fail!(Error::UnknownConstantPoolTag { tag, index }),
    }
}

fn constant_pool(input: Input) -> ParseResult<ConstantPool> {
    let (mut input, constant_pool_count) = be_u16(input)?;
    let constant_pool_count = constant_pool_count as usize;
    let mut entries = Vec::with_capacity(constant_pool_count);
    let mut index = 1;
    while index < constant_pool_count {
        let (rest, info) = cp_info(input, index)?;
        input = rest;
        if info.is_wide() {
            if index + 1 >= constant_pool_count {
                p_fail!(Error::ConstantPool { constant_pool_count });
            }
            entries.push(info);
            entries.push(ConstantPoolInfo::Unusable);
            index += 2;
        } else {
            entries.push(info);
            index += 1;
        }
    }
    let cp = ConstantPool::from_entries(entries);
    check_references(&cp)?;
    Ok((input, cp))
}

/// Verifies that every index stored inside the constant pool refers to an
/// entry of the expected kind.
fn check_references(cp: &ConstantPool) -> Result<(), Error> {
    for (_, info) in cp.iter() {
        match *info {
            ConstantPoolInfo::Class { name_index }
            | ConstantPoolInfo::Module { name_index }
            | ConstantPoolInfo::Package { name_index } => cp.check(name_index, Tag::Utf8)?,
            ConstantPoolInfo::String { string_index } => cp.check(string_index, Tag::Utf8)?,
            ConstantPoolInfo::MethodType { descriptor_index } => cp.check(descriptor_index, Tag::Utf8)?,
            ConstantPoolInfo::NameAndType { name_index, descriptor_index } => {
                cp.check(name_index, Tag::Utf8)?;
                cp.check(descriptor_index, Tag::Utf8)?;
            }
            ConstantPoolInfo::FieldRef { class_index, name_and_type_index }
            | ConstantPoolInfo::MethodRef { class_index, name_and_type_index }
            | ConstantPoolInfo::InterfaceMethodRef { class_index, name_and_type_index } => {
                cp.check(class_index, Tag::Class)?;
                cp.check(name_and_type_index, Tag::NameAndType)?;
            }
            ConstantPoolInfo::Dynamic { name_and_type_index, .. }
            | ConstantPoolInfo::InvokeDynamic { name_and_type_index, .. } => {
                cp.check(name_and_type_index, Tag::NameAndType)?
            }
            ConstantPoolInfo::MethodHandle { reference_index, .. } => {
                cp.member_ref(reference_index)?;
            }
            _ => {}
        }
    }
    Ok(())
}

fn module_attribute<'a>(input: Input<'a>, cp: &ConstantPool) -> ParseResult<'a, ModuleInfo> {
    let (input, module_name_index) = cp_index_tag(input, cp, Tag::Module)?;
    let (input, module_flags) = be_u16(input)?;
    let (input, module_version_index) = maybe_cp_index_tag(input, cp, Tag::Utf8)?;
    let (input, requires) = length_count(be_u16, |i| {
        let (i, requires_index) = cp_index_tag(i, cp, Tag::Module)?;
        let (i, requires_flags) = be_u16(i)?;
        let (i, requires_version_index) = maybe_cp_index_tag(i, cp, Tag::Utf8)?;
        Ok((i, RequiresInfo { requires_index, requires_flags, requires_version_index }))
    })(input)?;
    let (input, exports) = length_count(be_u16, |i| package_access(i, cp))(input)?;
    let (input, opens) = length_count(be_u16, |i| package_access(i, cp))(input)?;
    let (input, uses_index) = length_count(be_u16, |i| cp_index_tag(i, cp, Tag::Class))(input)?;
    let (input, provides) = length_count(be_u16, |i| {
        let (i, provides_index) = cp_index_tag(i, cp, Tag::Class)?;
        let (i, provides_with_index) = length_count(be_u16, |i| cp_index_tag(i, cp, Tag::Class))(i)?;
        Ok((i, ProvidesInfo { provides_index, provides_with_index }))
    })(input)?;
    Ok((
        input,
        ModuleInfo {
            module_name_index,
            module_flags,
            module_version_index,
            requires,
            exports,
            opens,
            uses_index,
            provides,
        },
    ))
}

fn package_access<'a>(input: Input<'a>, cp: &ConstantPool) -> ParseResult<'a, PackageAccessInfo> {
    let (input, package_index) = cp_index_tag(input, cp, Tag::Package)?;
    let (input, flags) = be_u16(input)?;
    let (input, to_index) = length_count(be_u16, |i| cp_index_tag(i, cp, Tag::Module))(input)?;
    Ok((input, PackageAccessInfo { package_index, flags, to_index }))
}

fn module_hashes<'a>(input: Input<'a>, cp: &ConstantPool) -> ParseResult<'a, (u16, Vec<ModuleHash>)> {
    let (input, algorithm_index) = cp_index_tag(input, cp, Tag::Utf8)?;
    let (input, hashes) = length_count(be_u16, |i| {
        let (i, module_name_index) = cp_index_tag(i, cp, Tag::Module)?;
        let (i, hash) = length_count(be_u16, be_u8)(i)?;
        Ok((i, ModuleHash { module_name_index, hash }))
    })(input)?;
    Ok((input, (algorithm_index, hashes)))
}

fn attribute_body<'a>(
    body: Input<'a>,
    name: &[u8],
    attribute_name_index: constant_pool_index,
    cp: &ConstantPool,
) -> ParseResult<'a, AttributeInfo> {
    let name = match ::std::str::from_utf8(name) {
        Ok(name) => name,
        Err(_) => "",
    };
    match name {
        names::CODE => map(|i| code::code(i, cp), |code| AttributeInfo::Code { attribute_name_index, code })(body),
        names::STACK_MAP_TABLE => map(code::stack_map_table, |entries| AttributeInfo::StackMapTable {
            attribute_name_index,
            entries,
        })(body),
        names::LINE_NUMBER_TABLE => map(code::line_number_table, |entries| {
            AttributeInfo::LineNumberTable { attribute_name_index, entries }
        })(body),
        names::LOCAL_VARIABLE_TABLE => map(|i| code::local_variable_table(i, cp), |entries| {
            AttributeInfo::LocalVariableTable { attribute_name_index, entries }
        })(body),
        names::LOCAL_VARIABLE_TYPE_TABLE => map(|i| code::local_variable_table(i, cp), |entries| {
            AttributeInfo::LocalVariableTypeTable { attribute_name_index, entries }
        })(body),
        names::SOURCE_FILE => map(|i| cp_index_tag(i, cp, Tag::Utf8), |sourcefile_index| {
            AttributeInfo::SourceFile { attribute_name_index, sourcefile_index }
        })(body),
        names::SOURCE_DEBUG_EXTENSION => Ok((
            &body[body.len()..],
            AttributeInfo::SourceDebugExtension { attribute_name_index, debug_extension: body.to_vec() },
        )),
        names::MODULE => map(|i| module_attribute(i, cp), |module| AttributeInfo::Module {
            attribute_name_index,
            module,
        })(body),
        names::MODULE_PACKAGES => map(length_count(be_u16, |i| cp_index_tag(i, cp, Tag::Package)), |package_index| {
            AttributeInfo::ModulePackages { attribute_name_index, package_index }
        })(body),
        names::MODULE_MAIN_CLASS => map(|i| cp_index_tag(i, cp, Tag::Class), |main_class_index| {
            AttributeInfo::ModuleMainClass { attribute_name_index, main_class_index }
        })(body),
        names::MODULE_TARGET => map(|i| maybe_cp_index_tag(i, cp, Tag::Utf8), |target_platform_index| {
            AttributeInfo::ModuleTarget { attribute_name_index, target_platform_index }
        })(body),
        names::MODULE_HASHES => map(|i| module_hashes(i, cp), |(algorithm_index, hashes)| {
            AttributeInfo::ModuleHashes { attribute_name_index, algorithm_index, hashes }
        })(body),
        names::MODULE_RESOLUTION => map(be_u16, |resolution_flags| AttributeInfo::ModuleResolution {
            attribute_name_index,
            resolution_flags,
        })(body),
        _ => Ok((&body[body.len()..], AttributeInfo::Unknown { attribute_name_index, info: body.to_vec() })),
    }
}

/// Parses one attribute. The attribute body must be consumed exactly.
pub fn attribute_info<'a>(input: Input<'a>, cp: &ConstantPool) -> ParseResult<'a, AttributeInfo> {
    let (input, attribute_name_index) = cp_index_tag(input, cp, Tag::Utf8)?;
    let (input, attribute_length) = be_u32(input)?;
    let (input, body) = take(attribute_length)(input)?;
    let name = cp.utf8_bytes(attribute_name_index)?;
    let display_name = || String::from_utf8_lossy(name).into_owned();
    let (rest, attribute) = attribute_body(body, name, attribute_name_index, cp)
        .map_err(|e| cut(e, || Error::Attribute { name: display_name() }))?;
    if !rest.is_empty() {
        p_fail!(Error::AttributeLength {
            name: display_name(),
            declared: attribute_length as usize,
            actual: body.len() - rest.len(),
        });
    }
    Ok((input, attribute))
}

pub fn attributes<'a>(input: Input<'a>, cp: &ConstantPool) -> ParseResult<'a, Vec<AttributeInfo>> {
    length_count(be_u16, |i| attribute_info(i, cp))(input)
}

fn field_info<'a>(input: Input<'a>, cp: &ConstantPool) -> ParseResult<'a, FieldInfo> {
    let (input, access_flags) = be_u16(input)?;
    let (input, name_index) = cp_index_tag(input, cp, Tag::Utf8)?;
    let (input, descriptor_index) = cp_index_tag(input, cp, Tag::Utf8)?;
    let (input, attributes) = attributes(input, cp)?;
    Ok((input, FieldInfo { access_flags, name_index, descriptor_index, attributes }))
}

fn method_info<'a>(input: Input<'a>, cp: &ConstantPool) -> ParseResult<'a, MethodInfo> {
    let (input, access_flags) = be_u16(input)?;
    let (input, name_index) = cp_index_tag(input, cp, Tag::Utf8)?;
    let (input, descriptor_index) = cp_index_tag(input, cp, Tag::Utf8)?;
    let (input, attributes) = attributes(input, cp)?;
    Ok((input, MethodInfo { access_flags, name_index, descriptor_index, attributes }))
}

/// The fields of a class file up to and including `this_class`.
#[derive(Debug, Clone)]
pub struct ClassHeader {
    pub minor_version: u16,
    pub major_version: u16,
    pub access_flags: u16,
    /// Internal name of the class.
    pub name: String,
}

fn header(input: Input) -> ParseResult<(u16, u16, ConstantPool, u16, u16)> {
    let (input, _) = section("magic number", magic)(input)?;
    let (input, (minor_version, major_version)) = section("version", pair(be_u16, be_u16))(input)?;
    let (input, constant_pool) = section("constant pool", constant_pool)(input)?;
    let (input, (access_flags, this_class)) = section("class header", tuple((be_u16, be_u16)))(input)?;
    constant_pool.check(this_class, Tag::Class)?;
    Ok((input, (minor_version, major_version, constant_pool, access_flags, this_class)))
}

fn class_file(input: Input) -> ParseResult<ClassFile> {
    let (input, (minor_version, major_version, constant_pool, access_flags, this_class)) = header(input)?;
    let cp = &constant_pool;
    let (input, super_class) = section("class header", |i| maybe_cp_index_tag(i, cp, Tag::Class))(input)?;
    let (input, interfaces) =
        section("interfaces", length_count(be_u16, |i| cp_index_tag(i, cp, Tag::Class)))(input)?;
    let (input, fields) = section("fields", length_count(be_u16, |i| field_info(i, cp)))(input)?;
    let (input, methods) = section("methods", length_count(be_u16, |i| method_info(i, cp)))(input)?;
    let (input, attributes) = section("class attributes", |i| attributes(i, cp))(input)?;
    Ok((
        input,
        ClassFile {
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        },
    ))
}

/// Decodes a complete class file.
pub fn parse_class_file(input: &[u8]) -> Result<ClassFile, Error> {
    let (rest, class_file) = finish(class_file(input), "class file")?;
    if !rest.is_empty() {
        return Err(Error::TrailingBytes { count: rest.len() });
    }
    Ok(class_file)
}

/// Decodes only as much of a class file as is needed to learn its name and
/// access flags.
pub fn parse_class_header(input: &[u8]) -> Result<ClassHeader, Error> {
    let (_, (minor_version, major_version, cp, access_flags, this_class)) =
        finish(header(input), "class file")?;
    Ok(ClassHeader { minor_version, major_version, access_flags, name: cp.class_name(this_class)? })
}
