//! Reads a `ModuleDescriptor` from a decoded `module-info` class.

use std::collections::BTreeMap;

use super::Error;
use crate::model::class_file::access_flags::{exports_flags, module_flags, requires_flags};
use crate::model::class_file::attributes::{AttributeInfo, PackageAccessInfo};
use crate::model::class_file::constant_pool::ConstantPool;
use crate::model::class_file::ClassFile;
use crate::model::module_descriptor::{
    to_source_name, AccessModifier, ModuleDescriptor, ModuleHashes, ModuleModifier, PackageAccess,
    Provides, Requires, RequiresModifier,
};

fn optional_utf8(cp: &ConstantPool, index: u16) -> Result<Option<String>, Error> {
    if index == 0 {
        Ok(None)
    } else {
        Ok(Some(cp.utf8(index)?))
    }
}

fn package_access(cp: &ConstantPool, info: &PackageAccessInfo) -> Result<PackageAccess, Error> {
    let mut access = PackageAccess::new(&to_source_name(&cp.package_name(info.package_index)?));
    if info.flags & exports_flags::ACC_SYNTHETIC != 0 {
        access.modifiers.insert(AccessModifier::Synthetic);
    }
    if info.flags & exports_flags::ACC_MANDATED != 0 {
        access.modifiers.insert(AccessModifier::Mandated);
    }
    for &to in &info.to_index {
        access.targets.insert(cp.module_name(to)?);
    }
    Ok(access)
}

/// Builds the descriptor from the `Module` attribute and its companions.
/// The result is not validated.
pub fn module_descriptor(class: &ClassFile) -> Result<ModuleDescriptor, Error> {
    if !class.is_module_info() {
        return Err(Error::ModuleInfo("ACC_MODULE is not set".to_owned()));
    }
    let cp = &class.constant_pool;
    let module = class
        .attributes
        .iter()
        .find_map(|a| match *a {
            AttributeInfo::Module { ref module, .. } => Some(module),
            _ => None,
        })
        .ok_or_else(|| Error::ModuleInfo("no Module attribute".to_owned()))?;

    let mut builder = ModuleDescriptor::builder(&cp.module_name(module.module_name_index)?);
    for &(flag, modifier) in &[
        (module_flags::ACC_OPEN, ModuleModifier::Open),
        (module_flags::ACC_SYNTHETIC, ModuleModifier::Synthetic),
        (module_flags::ACC_MANDATED, ModuleModifier::Mandated),
    ] {
        if module.module_flags & flag != 0 {
            builder = builder.modifier(modifier);
        }
    }
    if let Some(version) = optional_utf8(cp, module.module_version_index)? {
        builder = builder.version(&version);
    }
    for r in &module.requires {
        let mut requires = Requires::new(&cp.module_name(r.requires_index)?);
        for &(flag, modifier) in &[
            (requires_flags::ACC_TRANSITIVE, RequiresModifier::Transitive),
            (requires_flags::ACC_STATIC_PHASE, RequiresModifier::Static),
            (requires_flags::ACC_SYNTHETIC, RequiresModifier::Synthetic),
            (requires_flags::ACC_MANDATED, RequiresModifier::Mandated),
        ] {
            if r.requires_flags & flag != 0 {
                requires = requires.with_modifier(modifier);
            }
        }
        requires.compiled_version = optional_utf8(cp, r.requires_version_index)?;
        builder = builder.requires(requires);
    }
    for e in &module.exports {
        builder = builder.exports(package_access(cp, e)?);
    }
    for o in &module.opens {
        builder = builder.opens(package_access(cp, o)?);
    }
    for &u in &module.uses_index {
        builder = builder.uses(&to_source_name(&cp.class_name(u)?));
    }

    // `build` validates; readers must be able to see invalid descriptors, so
    // the remaining fields are assigned directly.
    let mut descriptor = builder.into_unchecked();
    for p in &module.provides {
        let mut providers = Vec::with_capacity(p.provides_with_index.len());
        for &with in &p.provides_with_index {
            providers.push(to_source_name(&cp.class_name(with)?));
        }
        descriptor.provides.push(Provides { service: to_source_name(&cp.class_name(p.provides_index)?), providers });
    }

    for attribute in &class.attributes {
        match *attribute {
            AttributeInfo::ModulePackages { ref package_index, .. } => {
                for &p in package_index {
                    descriptor.packages.insert(to_source_name(&cp.package_name(p)?));
                }
            }
            AttributeInfo::ModuleMainClass { main_class_index, .. } => {
                descriptor.main_class = Some(to_source_name(&cp.class_name(main_class_index)?));
            }
            AttributeInfo::ModuleTarget { target_platform_index, .. } => {
                descriptor.target_platform = optional_utf8(cp, target_platform_index)?;
            }
            AttributeInfo::ModuleHashes { algorithm_index, ref hashes, .. } => {
                let mut map = BTreeMap::new();
                for h in hashes {
                    map.insert(cp.module_name(h.module_name_index)?, h.hash.clone());
                }
                descriptor.hashes = Some(ModuleHashes { algorithm: cp.utf8(algorithm_index)?, hashes: map });
            }
            AttributeInfo::ModuleResolution { resolution_flags, .. } => {
                descriptor.resolution = Some(resolution_flags);
            }
            _ => {}
        }
    }
    Ok(descriptor)
}

/// Returns true if the class carries a `ModulePackages` attribute.
pub fn has_module_packages(class: &ClassFile) -> bool {
    class.attributes.iter().any(|a| match *a {
        AttributeInfo::ModulePackages { .. } => true,
        _ => false,
    })
}
