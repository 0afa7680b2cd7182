use std::fs;

use rust_jlink::config::PluginConfig;
use rust_jlink::model::class_file::builder::ClassBuilder;
use rust_jlink::model::class_file::class_access_flags::{ACC_PUBLIC, ACC_SUPER};
use rust_jlink::model::class_file::method_access_flags::ACC_STATIC;
use rust_jlink::model::class_file::Insn;
use rust_jlink::model::module_descriptor::{ModuleDescriptor, PackageAccess, Requires};
use rust_jlink::parser::parse_class_file;
use rust_jlink::plugin::compress::{unzip, CompressedHeader};
use rust_jlink::writer::module_info::module_info_class;
use rust_jlink::writer::{encode, RecomputeMode};
use rust_jlink::{Artifact, ArtifactKind, ErrorKind, Pipeline, Pool, PoolBuilder};

const DATA: &str = "the same line over and over\n";

fn module_info(descriptor: &ModuleDescriptor) -> Vec<u8> {
    encode(&module_info_class(descriptor).unwrap(), RecomputeMode::Verbatim).unwrap()
}

fn class(name: &str) -> Vec<u8> {
    ClassBuilder::new(name, ACC_PUBLIC | ACC_SUPER).to_bytes().unwrap()
}

fn main_class() -> Vec<u8> {
    let mut builder = ClassBuilder::new("app/Main", ACC_PUBLIC | ACC_SUPER);
    builder
        .method(ACC_PUBLIC | ACC_STATIC, "target", "()Ljava/lang/Class;", |code| {
            code.ldc_string("app.Target")?;
            code.invokestatic("java/lang/Class", "forName", "(Ljava/lang/String;)Ljava/lang/Class;")?;
            code.areturn();
            Ok(())
        })
        .unwrap();
    builder.to_bytes().unwrap()
}

fn input() -> Pool {
    let base = ModuleDescriptor::builder("java.base").exports(PackageAccess::new("java.lang")).into_unchecked();
    let app = ModuleDescriptor::builder("app")
        .requires(Requires::new("java.base"))
        .main_class("app.Main")
        .into_unchecked();

    let mut builder = PoolBuilder::new();
    let mut add = |path: &str, kind: ArtifactKind, content: Vec<u8>| {
        builder.add(Artifact::new(path, kind, content).unwrap()).unwrap();
    };
    add("/java.base/module-info.class", ArtifactKind::ClassOrResource, module_info(&base));
    add("/java.base/java/lang/Object.class", ArtifactKind::ClassOrResource, class("java/lang/Object"));
    add("/java.base/lib/server/libjvm.so", ArtifactKind::NativeLib, vec![1]);
    add("/java.base/lib/client/libjvm.so", ArtifactKind::NativeLib, vec![2]);
    add("/java.base/lib/jvm.cfg", ArtifactKind::NativeLib, b"# vm options\n-server KNOWN\n-client KNOWN\n".to_vec());
    add("/app/module-info.class", ArtifactKind::ClassOrResource, module_info(&app));
    add("/app/app/Main.class", ArtifactKind::ClassOrResource, main_class());
    add("/app/app/Target.class", ArtifactKind::ClassOrResource, class("app/Target"));
    add("/app/app/data.txt", ArtifactKind::ClassOrResource, DATA.repeat(64).into_bytes());
    builder.build()
}

fn configs() -> Vec<PluginConfig> {
    vec![
        PluginConfig::new("vm").with_main("server"),
        PluginConfig::new("class-for-name"),
        PluginConfig::new("strip-debug"),
        PluginConfig::new("release-info").with_main("add").with("JAVA_VERSION", "\"11\""),
        PluginConfig::new("system-modules"),
        PluginConfig::new("order-resources").with_main("**/module-info.class"),
        PluginConfig::new("compress").with_main("2").with("filter", "*.txt"),
        PluginConfig::new("verify-image"),
    ]
}

#[test]
fn test_full_link() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("image");
    let image = Pipeline::from_config(&configs()).unwrap().link(input(), &root).unwrap();
    // order-resources moved app's module-info to the front
    let modules: Vec<&str> = image.modules().iter().map(String::as_str).collect();
    assert_eq!(modules, vec!["app", "java.base"]);

    let generated = root.join("modules/java.base/jdk/internal/module/SystemModules$all.class");
    let class = parse_class_file(&fs::read(generated).unwrap()).unwrap();
    assert_eq!(class.name().unwrap(), "jdk/internal/module/SystemModules$all");
    assert!(root.join("modules/java.base/jdk/internal/module/SystemModulesMap.class").is_file());

    let main = parse_class_file(&fs::read(root.join("modules/app/app/Main.class")).unwrap()).unwrap();
    let insns: Vec<&Insn> = main.methods[0].code().unwrap().instructions.iter().map(|(_, i)| i).collect();
    match *insns[0] {
        Insn::Ldc { index, .. } => assert_eq!(main.constant_pool.class_name(index).unwrap(), "app/Target"),
        ref other => panic!("Class.forName was not folded: {:?}", other),
    }

    let cfg = fs::read_to_string(root.join("lib/jvm.cfg")).unwrap();
    assert_eq!(cfg, "# vm options\n-server KNOWN\n-client ALIASED_TO -server\n");
    assert!(root.join("lib/server/libjvm.so").is_file());
    assert!(!root.join("lib/client").exists());

    let data = fs::read(root.join("modules/app/app/data.txt")).unwrap();
    let header = CompressedHeader::read(&data).unwrap();
    assert_eq!(header.uncompressed_size, (DATA.len() * 64) as u64);
    assert_eq!(unzip(&data).unwrap(), DATA.repeat(64).into_bytes());
    assert_eq!(fs::read(root.join("lib/strings")).unwrap(), b"zip\0");

    let release = fs::read_to_string(image.release_file()).unwrap();
    assert_eq!(release, "JAVA_VERSION=\"11\"\n");
}

#[test]
fn test_module_infos_sorted_first() {
    let configs = vec![
        PluginConfig::new("system-modules"),
        PluginConfig::new("order-resources").with_main("**/module-info.class"),
    ];
    let (pool, _) = Pipeline::from_config(&configs).unwrap().run(input()).unwrap();
    let paths: Vec<&str> = pool.entries().map(Artifact::path).take(2).collect();
    assert_eq!(paths, vec!["/app/module-info.class", "/java.base/module-info.class"]);
}

#[test]
fn test_failed_link_leaves_no_image() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("image");
    let configs = vec![PluginConfig::new("vm").with_main("minimal")];
    let err = Pipeline::from_config(&configs).unwrap().link(input(), &root).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    assert!(!root.exists());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_failed_verification_leaves_no_image() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("image");
    let configs = vec![
        PluginConfig::new("exclude-resources").with_main("**/module-info.class"),
        PluginConfig::new("verify-image"),
    ];
    let err = Pipeline::from_config(&configs).unwrap().link(input(), &root).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    assert!(err.to_string().starts_with("verify-image: "), "{}", err);
    assert!(!root.exists());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}
