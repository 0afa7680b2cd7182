//! Writes module descriptors as `module-info` classes, and the in-place edits
//! the linker makes to existing ones.

use std::collections::BTreeSet;

use crate::error::Result;
use crate::model::class_file::access_flags::{exports_flags, module_flags, requires_flags};
use crate::model::class_file::attributes::{
    names, AttributeInfo, ModuleHash, ModuleInfo, PackageAccessInfo, ProvidesInfo, RequiresInfo,
};
use crate::model::class_file::class_access_flags::ACC_MODULE;
use crate::model::class_file::constant_pool::ConstantPool;
use crate::model::class_file::{ClassFile, MODULE_INFO};
use crate::model::module_descriptor::{
    to_internal_name, to_source_name, AccessModifier, ModuleDescriptor, ModuleModifier, PackageAccess, RequiresModifier,
};

/// Class file version 53 (Java 9), the first to define modules.
pub const MODULE_INFO_MAJOR_VERSION: u16 = 53;

fn optional_utf8(cp: &mut ConstantPool, value: &Option<String>) -> Result<u16> {
    Ok(match *value {
        Some(ref v) => cp.add_utf8(v)?,
        None => 0,
    })
}

fn package_access(cp: &mut ConstantPool, access: &PackageAccess) -> Result<PackageAccessInfo> {
    let mut flags = 0;
    for modifier in &access.modifiers {
        flags |= match *modifier {
            AccessModifier::Synthetic => exports_flags::ACC_SYNTHETIC,
            AccessModifier::Mandated => exports_flags::ACC_MANDATED,
        };
    }
    let mut to_index = Vec::with_capacity(access.targets.len());
    for target in &access.targets {
        to_index.push(cp.add_module(target)?);
    }
    Ok(PackageAccessInfo { package_index: cp.add_package(&to_internal_name(&access.source))?, flags, to_index })
}

fn package_indices<'a, I>(cp: &mut ConstantPool, packages: I) -> Result<Vec<u16>>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut indices = Vec::new();
    for package in packages {
        indices.push(cp.add_package(&to_internal_name(package))?);
    }
    Ok(indices)
}

/// Writes a descriptor as a `module-info` class with the `Module` attribute
/// and, where the descriptor has them, the `ModulePackages`,
/// `ModuleMainClass`, `ModuleTarget`, `ModuleHashes` and `ModuleResolution`
/// attributes.
pub fn module_info_class(descriptor: &ModuleDescriptor) -> Result<ClassFile> {
    let mut cp = ConstantPool::new();
    let this_class = cp.add_class(MODULE_INFO)?;

    let mut flags = 0;
    for modifier in &descriptor.modifiers {
        flags |= match *modifier {
            ModuleModifier::Open => module_flags::ACC_OPEN,
            ModuleModifier::Synthetic => module_flags::ACC_SYNTHETIC,
            ModuleModifier::Mandated => module_flags::ACC_MANDATED,
        };
    }
    let module_name_index = cp.add_module(&descriptor.name)?;
    let module_version_index = optional_utf8(&mut cp, &descriptor.version)?;

    let mut requires = Vec::with_capacity(descriptor.requires.len());
    for r in &descriptor.requires {
        let mut requires_flags = 0;
        for modifier in &r.modifiers {
            requires_flags |= match *modifier {
                RequiresModifier::Transitive => requires_flags::ACC_TRANSITIVE,
                RequiresModifier::Static => requires_flags::ACC_STATIC_PHASE,
                RequiresModifier::Synthetic => requires_flags::ACC_SYNTHETIC,
                RequiresModifier::Mandated => requires_flags::ACC_MANDATED,
            };
        }
        requires.push(RequiresInfo {
            requires_index: cp.add_module(&r.name)?,
            requires_flags,
            requires_version_index: optional_utf8(&mut cp, &r.compiled_version)?,
        });
    }
    let mut exports = Vec::with_capacity(descriptor.exports.len());
    for e in &descriptor.exports {
        exports.push(package_access(&mut cp, e)?);
    }
    let mut opens = Vec::with_capacity(descriptor.opens.len());
    for o in &descriptor.opens {
        opens.push(package_access(&mut cp, o)?);
    }
    let mut uses_index = Vec::with_capacity(descriptor.uses.len());
    for u in &descriptor.uses {
        uses_index.push(cp.add_class(&to_internal_name(u))?);
    }
    let mut provides = Vec::with_capacity(descriptor.provides.len());
    for p in &descriptor.provides {
        let mut provides_with_index = Vec::with_capacity(p.providers.len());
        for provider in &p.providers {
            provides_with_index.push(cp.add_class(&to_internal_name(provider))?);
        }
        provides.push(ProvidesInfo { provides_index: cp.add_class(&to_internal_name(&p.service))?, provides_with_index });
    }

    let mut attributes = vec![AttributeInfo::Module {
        attribute_name_index: cp.add_utf8(names::MODULE)?,
        module: ModuleInfo {
            module_name_index,
            module_flags: flags,
            module_version_index,
            requires,
            exports,
            opens,
            uses_index,
            provides,
        },
    }];
    if !descriptor.packages.is_empty() {
        attributes.push(AttributeInfo::ModulePackages {
            attribute_name_index: cp.add_utf8(names::MODULE_PACKAGES)?,
            package_index: package_indices(&mut cp, &descriptor.packages)?,
        });
    }
    if let Some(ref main_class) = descriptor.main_class {
        attributes.push(AttributeInfo::ModuleMainClass {
            attribute_name_index: cp.add_utf8(names::MODULE_MAIN_CLASS)?,
            main_class_index: cp.add_class(&to_internal_name(main_class))?,
        });
    }
    if descriptor.target_platform.is_some() {
        attributes.push(AttributeInfo::ModuleTarget {
            attribute_name_index: cp.add_utf8(names::MODULE_TARGET)?,
            target_platform_index: optional_utf8(&mut cp, &descriptor.target_platform)?,
        });
    }
    if let Some(ref hashes) = descriptor.hashes {
        let attribute_name_index = cp.add_utf8(names::MODULE_HASHES)?;
        let algorithm_index = cp.add_utf8(&hashes.algorithm)?;
        let mut entries = Vec::with_capacity(hashes.hashes.len());
        for (module, hash) in &hashes.hashes {
            entries.push(ModuleHash { module_name_index: cp.add_module(module)?, hash: hash.clone() });
        }
        attributes.push(AttributeInfo::ModuleHashes { attribute_name_index, algorithm_index, hashes: entries });
    }
    if let Some(resolution_flags) = descriptor.resolution {
        attributes.push(AttributeInfo::ModuleResolution {
            attribute_name_index: cp.add_utf8(names::MODULE_RESOLUTION)?,
            resolution_flags,
        });
    }

    Ok(ClassFile {
        minor_version: 0,
        major_version: MODULE_INFO_MAJOR_VERSION,
        constant_pool: cp,
        access_flags: ACC_MODULE,
        this_class,
        super_class: 0,
        interfaces: Vec::new(),
        fields: Vec::new(),
        methods: Vec::new(),
        attributes,
    })
}

/// Makes the `ModulePackages` attribute list exactly `packages` (source
/// form), replacing an attribute with other contents. Returns true if the
/// class changed.
pub fn add_packages(class: &mut ClassFile, packages: &BTreeSet<String>) -> Result<bool> {
    let current = match class.find_attribute(names::MODULE_PACKAGES) {
        Some(&AttributeInfo::ModulePackages { ref package_index, .. }) => {
            let mut current = BTreeSet::new();
            for &p in package_index {
                current.insert(to_source_name(&class.constant_pool.package_name(p)?));
            }
            Some(current)
        }
        _ => None,
    };
    match current {
        Some(ref current) if current == packages => return Ok(false),
        None if packages.is_empty() => return Ok(false),
        _ => {}
    }
    class.remove_attributes(names::MODULE_PACKAGES);
    let cp = &mut class.constant_pool;
    let attribute_name_index = cp.add_utf8(names::MODULE_PACKAGES)?;
    let package_index = package_indices(cp, packages)?;
    class.attributes.push(AttributeInfo::ModulePackages { attribute_name_index, package_index });
    Ok(true)
}

/// Removes the `ModuleTarget` attribute. Returns true if there was one.
pub fn drop_target_platform(class: &mut ClassFile) -> bool {
    class.remove_attributes(names::MODULE_TARGET) > 0
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parser::module_info::{has_module_packages, module_descriptor};
    use crate::parser::parse_class_file;
    use crate::writer::{encode, RecomputeMode};

    fn sample() -> ModuleDescriptor {
        ModuleDescriptor::builder("m.one")
            .version("1.0")
            .requires(crate::model::module_descriptor::Requires::new("java.base"))
            .exports(PackageAccess::new("p.api"))
            .opens(PackageAccess::new("p.impl").to(vec!["m.two"]))
            .uses("p.api.Service")
            .provides("p.api.Service", &["p.impl.ServiceImpl"])
            .main_class("p.api.Main")
            .into_unchecked()
    }

    #[test]
    fn test_written_descriptor_reads_back() {
        let descriptor = sample();
        let bytes = encode(&module_info_class(&descriptor).unwrap(), RecomputeMode::Verbatim).unwrap();
        let class = parse_class_file(&bytes).unwrap();
        assert!(class.is_module_info());
        assert!(!has_module_packages(&class));
        assert_eq!(module_descriptor(&class).unwrap(), descriptor);
    }

    #[test]
    fn test_add_packages_once() {
        let mut class = module_info_class(&sample()).unwrap();
        let packages: BTreeSet<String> = vec!["p.api".to_owned(), "p.impl".to_owned()].into_iter().collect();
        assert!(add_packages(&mut class, &packages).unwrap());
        assert!(!add_packages(&mut class, &packages).unwrap());
        let read = module_descriptor(&class).unwrap();
        assert_eq!(read.packages, packages);
    }

    #[test]
    fn test_add_packages_replaces_stale_attribute() {
        let stale = ModuleDescriptor { packages: vec!["p.gone".to_owned()].into_iter().collect(), ..sample() };
        let mut class = module_info_class(&stale).unwrap();
        assert!(has_module_packages(&class));

        let packages: BTreeSet<String> = vec!["p.api".to_owned(), "p.impl".to_owned()].into_iter().collect();
        assert!(add_packages(&mut class, &packages).unwrap());
        let count = class
            .attributes
            .iter()
            .filter(|a| match **a {
                AttributeInfo::ModulePackages { .. } => true,
                _ => false,
            })
            .count();
        assert_eq!(count, 1);
        assert_eq!(module_descriptor(&class).unwrap().packages, packages);
    }

    #[test]
    fn test_add_packages_fills_empty_attribute() {
        let mut class = module_info_class(&sample()).unwrap();
        let attribute_name_index = class.constant_pool.add_utf8(names::MODULE_PACKAGES).unwrap();
        class.attributes.push(AttributeInfo::ModulePackages { attribute_name_index, package_index: Vec::new() });

        let packages: BTreeSet<String> = vec!["p.api".to_owned()].into_iter().collect();
        assert!(add_packages(&mut class, &packages).unwrap());
        assert_eq!(module_descriptor(&class).unwrap().packages, packages);
    }

    #[test]
    fn test_drop_target_platform() {
        let mut descriptor = sample();
        descriptor.target_platform = Some("linux-amd64".to_owned());
        let mut class = module_info_class(&descriptor).unwrap();
        assert!(drop_target_platform(&mut class));
        assert!(!drop_target_platform(&mut class));
        assert_eq!(module_descriptor(&class).unwrap().target_platform, None);
    }
}
