use rust_jlink::config::PluginConfig;
use rust_jlink::model::class_file::builder::ClassBuilder;
use rust_jlink::model::class_file::class_access_flags::{ACC_PUBLIC, ACC_SUPER};
use rust_jlink::model::class_file::{ClassFile, Insn};
use rust_jlink::model::module_descriptor::{ModuleDescriptor, PackageAccess, Requires};
use rust_jlink::parser::module_info::{has_module_packages, module_descriptor};
use rust_jlink::parser::parse_class_file;
use rust_jlink::writer::module_info::module_info_class;
use rust_jlink::writer::{encode, RecomputeMode};
use rust_jlink::{Artifact, ErrorKind, Pipeline, Pool, PoolBuilder};

const MAP: &str = "/java.base/jdk/internal/module/SystemModulesMap.class";
const ALL: &str = "/java.base/jdk/internal/module/SystemModules$all.class";

fn add_module(builder: &mut PoolBuilder, descriptor: ModuleDescriptor, classes: &[&str]) {
    let info = encode(&module_info_class(&descriptor).unwrap(), RecomputeMode::Verbatim).unwrap();
    let path = format!("/{}/module-info.class", descriptor.name);
    builder.add(Artifact::class_or_resource(&path, info).unwrap()).unwrap();
    for class in classes {
        let bytes = ClassBuilder::new(class, ACC_PUBLIC | ACC_SUPER).to_bytes().unwrap();
        let path = format!("/{}/{}.class", descriptor.name, class);
        builder.add(Artifact::class_or_resource(&path, bytes).unwrap()).unwrap();
    }
}

fn input() -> Pool {
    let mut builder = PoolBuilder::new();
    let base = ModuleDescriptor::builder("java.base")
        .exports(PackageAccess::new("java.lang"))
        .exports(PackageAccess::new("jdk.internal.misc").to(vec!["tool", "app"]))
        .opens(PackageAccess::new("jdk.internal.misc").to(vec!["tool", "app"]))
        .into_unchecked();
    add_module(&mut builder, base, &["java/lang/Object", "jdk/internal/misc/Unsafe"]);
    for &name in &["tool", "app"] {
        let module = ModuleDescriptor::builder(name)
            .requires(Requires::new("java.base"))
            .main_class(&format!("{}.Main", name))
            .into_unchecked();
        add_module(&mut builder, module, &[&format!("{}/Main", name)]);
    }
    builder.build()
}

fn run(config: PluginConfig) -> Pool {
    Pipeline::from_config(&[config]).unwrap().run(input()).unwrap().0
}

fn class(pool: &Pool, path: &str) -> ClassFile {
    parse_class_file(pool.get(path).unwrap().content()).unwrap()
}

fn strings(class: &ClassFile, method: &str) -> Vec<String> {
    let cp = &class.constant_pool;
    let m = class.methods.iter().find(|m| cp.utf8(m.name_index).unwrap() == method).unwrap();
    m.code()
        .unwrap()
        .instructions
        .iter()
        .filter_map(|(_, insn)| match *insn {
            Insn::Ldc { index, .. } => cp.string(index).ok(),
            _ => None,
        })
        .collect()
}

#[test]
fn test_every_module_gets_packages() {
    let pool = run(PluginConfig::new("system-modules"));
    for module in &["java.base", "tool", "app"] {
        let info = class(&pool, &format!("/{}/module-info.class", module));
        assert!(has_module_packages(&info), "{} has no ModulePackages", module);
    }
    let base = module_descriptor(&class(&pool, "/java.base/module-info.class")).unwrap();
    let packages: Vec<&str> = base.packages.iter().map(String::as_str).collect();
    assert_eq!(packages, vec!["java.lang", "jdk.internal.misc"]);
}

#[test]
fn test_module_names_follow_module_order() {
    let pool = run(PluginConfig::new("system-modules"));
    assert_eq!(strings(&class(&pool, ALL), "moduleNames"), vec!["java.base", "tool", "app"]);
    assert_eq!(strings(&class(&pool, MAP), "moduleNames"), vec!["app", "tool"]);
}

#[test]
fn test_dedup_does_not_change_descriptors() {
    let shared = run(PluginConfig::new("system-modules"));
    let unshared = run(PluginConfig::new("system-modules").with("dedup", "false"));
    let mut a = strings(&class(&shared, ALL), "moduleDescriptors");
    let mut b = strings(&class(&unshared, ALL), "moduleDescriptors");
    // the unshared class loads shared set elements once per use
    a.sort();
    a.dedup();
    b.sort();
    b.dedup();
    assert_eq!(a, b);
    assert!(shared.get(ALL).unwrap().content().len() < unshared.get(ALL).unwrap().content().len());
}

#[test]
fn test_rerun_replaces_generated_classes() {
    let once = run(PluginConfig::new("system-modules"));
    let twice = Pipeline::from_config(&[PluginConfig::new("system-modules")]).unwrap().run(once.clone()).unwrap().0;
    assert_eq!(twice.len(), once.len());
    let paths: Vec<&str> = twice.entries().map(Artifact::path).collect();
    assert_eq!(&paths[paths.len() - 2..], &[ALL, MAP]);
}

#[test]
fn test_bad_dedup_option() {
    let err = Pipeline::from_config(&[PluginConfig::new("system-modules").with("dedup", "maybe")]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfigurationError);
}
