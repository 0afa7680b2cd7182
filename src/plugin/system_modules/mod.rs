//! Validates every module descriptor in the pool and generates the classes
//! that let the runtime boot without reading `module-info.class` files.

mod dedup;
mod generator;

use std::collections::HashMap;

use log::{debug, trace};

use self::generator::{system_modules_class, system_modules_map_class, ALL_SYSTEM_MODULES, SYSTEM_MODULES_MAP};
pub use self::generator::SystemModule;
use super::{Category, LinkContext, Plugin, Transformer};
use crate::config::PluginConfig;
use crate::error::{Error, Result};
use crate::model::module_descriptor::JAVA_BASE;
use crate::parser::module_info::module_descriptor;
use crate::parser::parse_class_file;
use crate::pool::{Artifact, ModuleView, Pool};
use crate::writer::module_info::{add_packages, drop_target_platform};
use crate::writer::{encode, RecomputeMode};

pub const NAME: &str = "system-modules";

/// The pool path of a generated class.
pub fn generated_path(class: &str) -> String {
    format!("/{}/{}.class", JAVA_BASE, class)
}

#[derive(Debug)]
pub struct SystemModulesPlugin {
    dedup: bool,
}

impl SystemModulesPlugin {
    pub fn configure(config: &PluginConfig) -> Result<Self> {
        if let Some(value) = config.main() {
            return Err(Error::config(NAME, format!("unexpected value {:?}", value)));
        }
        Ok(SystemModulesPlugin { dedup: config.get_bool("dedup", true)? })
    }
}

impl Plugin for SystemModulesPlugin {
    fn name(&self) -> &'static str {
        NAME
    }

    fn category(&self) -> Category {
        Category::ModuleInfo
    }
}

/// `java.base` followed by the other modules in pool order.
fn module_order(pool: &Pool) -> Result<Vec<ModuleView>> {
    let base = pool
        .module(JAVA_BASE)
        .ok_or_else(|| Error::Invariant(format!("{} module not found", JAVA_BASE)))?;
    let mut views = vec![base];
    views.extend(pool.modules().filter(|m| m.name() != JAVA_BASE));
    Ok(views)
}

/// A module after validation, with its possibly rewritten `module-info`.
struct Checked {
    module: SystemModule,
    module_info: Artifact,
}

fn check_module(view: &ModuleView, drop_target: bool) -> Result<Checked> {
    let artifact = view
        .module_info()
        .ok_or_else(|| Error::Invariant(format!("module-info.class not found for {} module", view.name())))?;
    let malformed = |cause| Error::MalformedClass { path: artifact.path().to_owned(), cause };
    let mut class = parse_class_file(artifact.content()).map_err(malformed)?;
    let mut descriptor = module_descriptor(&class).map_err(malformed)?;
    descriptor.validate_names()?;

    // The packages found in the pool win over any stale ModulePackages.
    let packages = view.packages();
    descriptor.validate_package_names(&packages)?;
    descriptor.validate_packages(&packages)?;

    let mut changed = add_packages(&mut class, &packages)?;
    if drop_target && drop_target_platform(&mut class) {
        trace!("{}: dropped ModuleTarget", view.name());
        changed = true;
    }
    let module_info = if changed {
        artifact.with_content(encode(&class, RecomputeMode::Verbatim)?)
    } else {
        artifact.clone()
    };

    descriptor.packages = packages.clone();
    if drop_target {
        descriptor.target_platform = None;
    }
    Ok(Checked { module: SystemModule { descriptor, packages }, module_info })
}

/// Checks every module, returning them `java.base` first along with their
/// rewritten `module-info` artifacts keyed by path.
pub fn check_modules(pool: &Pool) -> Result<(Vec<SystemModule>, HashMap<String, Artifact>)> {
    let views = module_order(pool)?;
    let base = check_module(&views[0], false)?;
    let drop_target = base.module.descriptor.target_platform.is_some();

    let mut checked = vec![base];
    for view in &views[1..] {
        checked.push(check_module(view, drop_target)?);
    }

    let mut modules = Vec::with_capacity(checked.len());
    let mut module_infos = HashMap::new();
    for checked in checked {
        module_infos.insert(checked.module_info.path().to_owned(), checked.module_info);
        modules.push(checked.module);
    }
    Ok((modules, module_infos))
}

impl Transformer for SystemModulesPlugin {
    fn transform(&self, input: &Pool, _context: &LinkContext) -> Result<Pool> {
        let (modules, mut module_infos) = check_modules(input)?;
        debug!("generating descriptors for {} module(s)", modules.len());

        let all_path = generated_path(ALL_SYSTEM_MODULES);
        let map_path = generated_path(SYSTEM_MODULES_MAP);
        let mut out = input.builder();
        input.transform_and_copy(
            |artifact| {
                let path = artifact.path();
                if path == all_path || path == map_path {
                    return Ok(None);
                }
                Ok(Some(module_infos.remove(path).unwrap_or_else(|| artifact.clone())))
            },
            &mut out,
        )?;
        out.add(Artifact::class_or_resource(&all_path, system_modules_class(&modules, self.dedup)?)?)?;
        out.add(Artifact::class_or_resource(&map_path, system_modules_map_class(&modules)?)?)?;
        Ok(out.build())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::ErrorKind;
    use crate::model::class_file::builder::ClassBuilder;
    use crate::model::class_file::class_access_flags::{ACC_PUBLIC, ACC_SUPER};
    use crate::model::module_descriptor::{ModuleDescriptor, PackageAccess, Requires};
    use crate::parser::module_info::has_module_packages;
    use crate::pool::PoolBuilder;
    use crate::writer::module_info::module_info_class;

    fn module_info(descriptor: &ModuleDescriptor) -> Vec<u8> {
        encode(&module_info_class(descriptor).unwrap(), RecomputeMode::Verbatim).unwrap()
    }

    fn class(name: &str) -> Vec<u8> {
        ClassBuilder::new(name, ACC_PUBLIC | ACC_SUPER).to_bytes().unwrap()
    }

    fn pool(descriptors: &[ModuleDescriptor], classes: &[&str]) -> Pool {
        let mut builder = PoolBuilder::new();
        for d in descriptors {
            let path = format!("/{}/module-info.class", d.name);
            builder.add(Artifact::class_or_resource(&path, module_info(d)).unwrap()).unwrap();
        }
        for path in classes {
            let internal = path.splitn(3, '/').nth(2).unwrap().trim_end_matches(".class");
            builder.add(Artifact::class_or_resource(path, class(internal)).unwrap()).unwrap();
        }
        builder.build()
    }

    fn base() -> ModuleDescriptor {
        ModuleDescriptor::builder(JAVA_BASE).exports(PackageAccess::new("java.lang")).into_unchecked()
    }

    fn plugin() -> SystemModulesPlugin {
        SystemModulesPlugin::configure(&PluginConfig::new(NAME)).unwrap()
    }

    #[test]
    fn test_generates_classes_and_packages() {
        let app = ModuleDescriptor::builder("app").requires(Requires::new(JAVA_BASE)).into_unchecked();
        let input = pool(&[app, base()], &["/java.base/java/lang/Object.class", "/app/app/Main.class"]);
        let out = plugin().transform(&input, &LinkContext::new()).unwrap();

        assert!(out.contains(&generated_path(ALL_SYSTEM_MODULES)));
        assert!(out.contains(&generated_path(SYSTEM_MODULES_MAP)));
        assert_eq!(out.len(), input.len() + 2);
        let info = parse_class_file(out.get("/app/module-info.class").unwrap().content()).unwrap();
        assert!(has_module_packages(&info));
        let packages = module_descriptor(&info).unwrap().packages;
        assert!(packages.contains("app"));
    }

    #[test]
    fn test_java_base_first() {
        let app = ModuleDescriptor::builder("app").into_unchecked();
        let input = pool(&[app, base()], &["/java.base/java/lang/Object.class"]);
        let (modules, _) = check_modules(&input).unwrap();
        let names: Vec<&str> = modules.iter().map(SystemModule::name).collect();
        assert_eq!(names, vec![JAVA_BASE, "app"]);
    }

    #[test]
    fn test_missing_exported_package() {
        let app = ModuleDescriptor::builder("app")
            .exports(PackageAccess::new("app.api"))
            .exports(PackageAccess::new("app.spi"))
            .into_unchecked();
        let input = pool(&[base(), app], &["/java.base/java/lang/Object.class"]);
        let err = plugin().transform(&input, &LinkContext::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
        assert_eq!(
            err.to_string(),
            "Packages that are exported or open in app are not present: [app.api, app.spi]"
        );
    }

    #[test]
    fn test_missing_java_base() {
        let app = ModuleDescriptor::builder("app").into_unchecked();
        let err = check_modules(&pool(&[app], &[])).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    }

    #[test]
    fn test_target_platform_dropped_from_other_modules() {
        let base = ModuleDescriptor::builder(JAVA_BASE)
            .exports(PackageAccess::new("java.lang"))
            .target_platform("linux-amd64")
            .into_unchecked();
        let app = ModuleDescriptor::builder("app").target_platform("linux-amd64").into_unchecked();
        let input = pool(&[base, app], &["/java.base/java/lang/Object.class"]);
        let (modules, infos) = check_modules(&input).unwrap();
        assert_eq!(modules[0].descriptor.target_platform.as_deref(), Some("linux-amd64"));
        assert_eq!(modules[1].descriptor.target_platform, None);
        let info = parse_class_file(infos["/app/module-info.class"].content()).unwrap();
        assert_eq!(module_descriptor(&info).unwrap().target_platform, None);
    }

    #[test]
    fn test_invalid_class_package_rejected() {
        let app = ModuleDescriptor::builder("app").into_unchecked();
        let input = pool(&[base(), app], &["/java.base/java/lang/Object.class", "/app/1app/Main.class"]);
        let err = check_modules(&input).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
        assert!(err.to_string().contains("1app"), "{}", err);
    }

    #[test]
    fn test_stale_module_packages_replaced() {
        let app = ModuleDescriptor::builder("app").packages(vec!["app.gone"]).into_unchecked();
        let input = pool(&[base(), app], &["/java.base/java/lang/Object.class", "/app/app/Main.class"]);
        let (modules, infos) = check_modules(&input).unwrap();

        let expected: Vec<&str> = vec!["app"];
        assert_eq!(modules[1].packages.iter().map(String::as_str).collect::<Vec<_>>(), expected);
        assert_eq!(modules[1].descriptor.packages, modules[1].packages);
        let info = parse_class_file(infos["/app/module-info.class"].content()).unwrap();
        assert_eq!(module_descriptor(&info).unwrap().packages, modules[1].packages);
    }

    #[test]
    fn test_rejects_main_value() {
        let err = SystemModulesPlugin::configure(&PluginConfig::new(NAME).with_main("x")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigurationError);
    }
}
