//! Generates the classes that hand the runtime its module descriptors
//! without parsing `module-info.class` files at startup.

use std::collections::{BTreeSet, HashSet};

use super::dedup::{DedupSetBuilder, SetKey, BUILDER_VAR, MD_VAR};
use crate::error::Result;
use crate::model::class_file::builder::{ClassBuilder, CodeBuilder};
use crate::model::class_file::class_access_flags::{ACC_FINAL, ACC_SUPER};
use crate::model::class_file::method_access_flags::{ACC_PUBLIC, ACC_STATIC};
use crate::model::class_file::opcode::array_type::T_BYTE;
use crate::model::module_descriptor::{
    ModuleDescriptor, ModuleHashes, ModuleModifier, PackageAccess, Provides, Requires,
};

pub const ALL_SYSTEM_MODULES: &str = "jdk/internal/module/SystemModules$all";
pub const SYSTEM_MODULES_MAP: &str = "jdk/internal/module/SystemModulesMap";
const SYSTEM_MODULES: &str = "jdk/internal/module/SystemModules";

const MODULE_BUILDER: &str = "jdk/internal/module/Builder";
const MODULE_DESCRIPTOR: &str = "java/lang/module/ModuleDescriptor";
const REQUIRES: &str = "java/lang/module/ModuleDescriptor$Requires";
const EXPORTS: &str = "java/lang/module/ModuleDescriptor$Exports";
const OPENS: &str = "java/lang/module/ModuleDescriptor$Opens";
const PROVIDES: &str = "java/lang/module/ModuleDescriptor$Provides";
const MODULE_TARGET: &str = "jdk/internal/module/ModuleTarget";
const MODULE_HASHES: &str = "jdk/internal/module/ModuleHashes";
const MODULE_HASHES_BUILDER: &str = "jdk/internal/module/ModuleHashes$Builder";
const MODULE_RESOLUTION: &str = "jdk/internal/module/ModuleResolution";
const JAVA_LANG_STRING: &str = "java/lang/String";
const JAVA_UTIL_LIST: &str = "java/util/List";

const BUILDER_RETURN_SET: &str = "(Ljava/util/Set;)Ljdk/internal/module/Builder;";
const BUILDER_RETURN_STRING: &str = "(Ljava/lang/String;)Ljdk/internal/module/Builder;";
const BUILDER_RETURN_BOOLEAN: &str = "(Z)Ljdk/internal/module/Builder;";

/// `ModuleResolution` flag of a module that warns it is incubating.
pub const WARN_INCUBATING: u16 = 0x0004;

/// A validated module and the packages found for it in the pool.
#[derive(Debug, Clone)]
pub struct SystemModule {
    pub descriptor: ModuleDescriptor,
    pub packages: BTreeSet<String>,
}

impl SystemModule {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

fn sorted<T: Ord + Clone>(items: &[T]) -> Vec<T> {
    let mut items = items.to_vec();
    items.sort();
    items
}

/// Pushes `values` as a new `String[]`.
fn string_array<'a, I>(code: &mut CodeBuilder, values: I) -> Result<()>
where
    I: ExactSizeIterator<Item = &'a str>,
{
    code.push_int(values.len() as i32)?;
    code.anewarray(JAVA_LANG_STRING)?;
    for (i, value) in values.enumerate() {
        code.dup();
        code.push_int(i as i32)?;
        code.ldc_string(value)?;
        code.aastore();
    }
    Ok(())
}

/// Emits the code that rebuilds one descriptor with
/// `jdk.internal.module.Builder` and stores it at `index` of the array in
/// `MD_VAR`.
struct DescriptorBuilder<'a, 'c, 'b> {
    code: &'a mut CodeBuilder<'c>,
    dedup: &'b mut DedupSetBuilder,
    module: &'b SystemModule,
    index: usize,
}

impl<'a, 'c, 'b> DescriptorBuilder<'a, 'c, 'b> {
    fn build(mut self) -> Result<()> {
        let module = self.module;
        let md = &module.descriptor;
        self.new_builder()?;
        self.requires(&md.requires)?;
        self.package_access("exports", EXPORTS, &md.exports)?;
        self.package_access("opens", OPENS, &md.opens)?;
        self.uses(&md.uses)?;
        self.provides(&md.provides)?;
        self.packages()?;
        if let Some(ref version) = md.version {
            self.builder_call("version", version)?;
        }
        if let Some(ref main_class) = md.main_class {
            self.builder_call("mainClass", main_class)?;
        }
        self.put_descriptor()
    }

    fn new_builder(&mut self) -> Result<()> {
        let md = &self.module.descriptor;
        let code = &mut *self.code;
        code.new_(MODULE_BUILDER)?;
        code.dup();
        code.ldc_string(&md.name)?;
        code.invokespecial(MODULE_BUILDER, "<init>", "(Ljava/lang/String;)V")?;
        code.astore(BUILDER_VAR);
        for &(modifier, method) in &[
            (ModuleModifier::Open, "open"),
            (ModuleModifier::Synthetic, "synthetic"),
            (ModuleModifier::Mandated, "mandated"),
        ] {
            if md.modifiers.contains(&modifier) {
                code.aload(BUILDER_VAR);
                code.push_int(1)?;
                code.invokevirtual(MODULE_BUILDER, method, BUILDER_RETURN_BOOLEAN)?;
                code.pop();
            }
        }
        Ok(())
    }

    /// Calls a `Builder` method taking one string.
    fn builder_call(&mut self, method: &str, value: &str) -> Result<()> {
        let code = &mut *self.code;
        code.aload(BUILDER_VAR);
        code.ldc_string(value)?;
        code.invokevirtual(MODULE_BUILDER, method, BUILDER_RETURN_STRING)?;
        code.pop();
        Ok(())
    }

    /// Starts `builder.<method>(new <element>[len] { ... })`.
    fn begin_array(&mut self, element: &str, len: usize) -> Result<()> {
        self.code.aload(BUILDER_VAR);
        self.code.push_int(len as i32)?;
        self.code.anewarray(element)?;
        Ok(())
    }

    fn end_array(&mut self, method: &str, element: &str) -> Result<()> {
        let descriptor = format!("([L{};)L{};", element, MODULE_BUILDER);
        self.code.invokevirtual(MODULE_BUILDER, method, &descriptor)?;
        self.code.pop();
        Ok(())
    }

    fn array_slot(&mut self, i: usize) -> Result<()> {
        self.code.dup();
        self.code.push_int(i as i32)?;
        Ok(())
    }

    fn requires(&mut self, requires: &[Requires]) -> Result<()> {
        self.begin_array(REQUIRES, requires.len())?;
        for (i, r) in sorted(requires).iter().enumerate() {
            self.array_slot(i)?;
            let var = self.dedup.index_of(self.code, &SetKey::Requires(r.modifiers.clone()))?;
            self.code.aload(var);
            self.code.ldc_string(&r.name)?;
            let descriptor = match r.compiled_version {
                Some(ref version) => {
                    self.code.ldc_string(version)?;
                    "(Ljava/util/Set;Ljava/lang/String;Ljava/lang/String;)Ljava/lang/module/ModuleDescriptor$Requires;"
                }
                None => "(Ljava/util/Set;Ljava/lang/String;)Ljava/lang/module/ModuleDescriptor$Requires;",
            };
            self.code.invokestatic(MODULE_BUILDER, "newRequires", descriptor)?;
            self.code.aastore();
        }
        self.end_array("requires", REQUIRES)
    }

    /// `exports` and `opens`, which differ only in names.
    fn package_access(&mut self, method: &str, element: &str, clauses: &[PackageAccess]) -> Result<()> {
        let factory = if method == "exports" { "newExports" } else { "newOpens" };
        self.begin_array(element, clauses.len())?;
        for (i, clause) in sorted(clauses).iter().enumerate() {
            self.array_slot(i)?;
            let modifiers = if method == "exports" {
                SetKey::Exports(clause.modifiers.clone())
            } else {
                SetKey::Opens(clause.modifiers.clone())
            };
            let modifiers_var = self.dedup.index_of(self.code, &modifiers)?;
            if clause.is_qualified() {
                let targets_var = self.dedup.index_of(self.code, &SetKey::Strings(clause.targets.clone()))?;
                self.code.aload(modifiers_var);
                self.code.ldc_string(&clause.source)?;
                self.code.aload(targets_var);
                let descriptor = format!("(Ljava/util/Set;Ljava/lang/String;Ljava/util/Set;)L{};", element);
                self.code.invokestatic(MODULE_BUILDER, factory, &descriptor)?;
            } else {
                self.code.aload(modifiers_var);
                self.code.ldc_string(&clause.source)?;
                let descriptor = format!("(Ljava/util/Set;Ljava/lang/String;)L{};", element);
                self.code.invokestatic(MODULE_BUILDER, factory, &descriptor)?;
            }
            self.code.aastore();
        }
        self.end_array(method, element)
    }

    fn uses(&mut self, uses: &BTreeSet<String>) -> Result<()> {
        let var = self.dedup.index_of(self.code, &SetKey::Strings(uses.clone()))?;
        self.code.aload(BUILDER_VAR);
        self.code.aload(var);
        self.code.invokevirtual(MODULE_BUILDER, "uses", BUILDER_RETURN_SET)?;
        self.code.pop();
        Ok(())
    }

    fn provides(&mut self, provides: &[Provides]) -> Result<()> {
        self.begin_array(PROVIDES, provides.len())?;
        for (i, p) in sorted(provides).iter().enumerate() {
            self.array_slot(i)?;
            self.code.ldc_string(&p.service)?;
            string_array(self.code, p.providers.iter().map(String::as_str))?;
            self.code.invokestatic_interface(JAVA_UTIL_LIST, "of", "([Ljava/lang/Object;)Ljava/util/List;")?;
            self.code.invokestatic(
                MODULE_BUILDER,
                "newProvides",
                "(Ljava/lang/String;Ljava/util/List;)Ljava/lang/module/ModuleDescriptor$Provides;",
            )?;
            self.code.aastore();
        }
        self.end_array("provides", PROVIDES)
    }

    fn packages(&mut self) -> Result<()> {
        let var = self.dedup.new_string_set(self.code, &self.module.packages)?;
        self.code.aload(BUILDER_VAR);
        self.code.aload(var);
        self.code.invokevirtual(MODULE_BUILDER, "packages", BUILDER_RETURN_SET)?;
        self.code.pop();
        Ok(())
    }

    fn put_descriptor(&mut self) -> Result<()> {
        let code = &mut *self.code;
        code.aload(MD_VAR);
        code.push_int(self.index as i32)?;
        code.aload(BUILDER_VAR);
        code.ldc_int(self.module.descriptor.hash_code())?;
        code.invokevirtual(MODULE_BUILDER, "build", "(I)Ljava/lang/module/ModuleDescriptor;")?;
        code.aastore();
        Ok(())
    }
}

/// Emits `new <element>[n]` into `var`, runs `fill` for each module, and
/// returns the array.
fn module_array<F>(code: &mut CodeBuilder, element: &str, modules: &[SystemModule], var: u16, mut fill: F) -> Result<()>
where
    F: FnMut(&mut CodeBuilder, usize, &SystemModule) -> Result<()>,
{
    code.push_int(modules.len() as i32)?;
    code.anewarray(element)?;
    code.astore(var);
    for (index, module) in modules.iter().enumerate() {
        fill(code, index, module)?;
    }
    code.aload(var);
    code.areturn();
    Ok(())
}

fn has_split_packages(modules: &[SystemModule]) -> bool {
    let mut seen = HashSet::new();
    !modules.iter().flat_map(|m| m.packages.iter()).all(|p| seen.insert(p))
}

fn has_incubator_modules(modules: &[SystemModule]) -> bool {
    modules.iter().any(|m| m.descriptor.resolution.map(|r| r & WARN_INCUBATING != 0).unwrap_or(false))
}

fn module_hashes(code: &mut CodeBuilder, index: usize, hashes: &ModuleHashes) -> Result<()> {
    code.new_(MODULE_HASHES_BUILDER)?;
    code.dup();
    code.ldc_string(&hashes.algorithm)?;
    code.push_int((4 * hashes.hashes.len() / 3 + 1) as i32)?;
    code.invokespecial(MODULE_HASHES_BUILDER, "<init>", "(Ljava/lang/String;I)V")?;
    code.astore(BUILDER_VAR);
    for (name, hash) in &hashes.hashes {
        code.aload(BUILDER_VAR);
        code.ldc_string(name)?;
        code.push_int(hash.len() as i32)?;
        code.newarray(T_BYTE);
        for (i, &b) in hash.iter().enumerate() {
            code.dup();
            code.push_int(i as i32)?;
            code.push_int(i32::from(b as i8))?;
            code.bastore();
        }
        code.invokevirtual(
            MODULE_HASHES_BUILDER,
            "hashForModule",
            "(Ljava/lang/String;[B)Ljdk/internal/module/ModuleHashes$Builder;",
        )?;
        code.pop();
    }
    code.aload(MD_VAR);
    code.push_int(index as i32)?;
    code.aload(BUILDER_VAR);
    code.invokevirtual(MODULE_HASHES_BUILDER, "build", "()Ljdk/internal/module/ModuleHashes;")?;
    code.aastore();
    Ok(())
}

fn boolean_method(class: &mut ClassBuilder, name: &str, value: bool) -> Result<()> {
    class.method(ACC_PUBLIC, name, "()Z", |code| {
        code.push_int(value as i32)?;
        code.ireturn();
        Ok(())
    })?;
    Ok(())
}

/// Generates `SystemModules$all` for `modules`, which must start with
/// `java.base`. With `dedup` false no set is shared between descriptors.
pub fn system_modules_class(modules: &[SystemModule], dedup: bool) -> Result<Vec<u8>> {
    let mut sets = DedupSetBuilder::new(dedup);
    for m in modules {
        sets.add_descriptor(&m.descriptor);
    }

    let mut class = ClassBuilder::new(ALL_SYSTEM_MODULES, ACC_FINAL | ACC_SUPER);
    class.implements(SYSTEM_MODULES)?;
    class.default_constructor(ACC_PUBLIC)?;
    boolean_method(&mut class, "hasSplitPackages", has_split_packages(modules))?;
    boolean_method(&mut class, "hasIncubatorModules", has_incubator_modules(modules))?;

    class.method(ACC_PUBLIC, "moduleDescriptors", "()[Ljava/lang/module/ModuleDescriptor;", |code| {
        module_array(code, MODULE_DESCRIPTOR, modules, MD_VAR, |code, index, module| {
            DescriptorBuilder { code, dedup: &mut sets, module, index }.build()
        })
    })?;

    // Only java.base records a platform once it has one; see the plugin.
    let target_count = match modules.first() {
        Some(base) if base.descriptor.target_platform.is_some() => 1,
        _ => modules.len(),
    };
    class.method(ACC_PUBLIC, "moduleTargets", "()[Ljdk/internal/module/ModuleTarget;", |code| {
        module_array(code, MODULE_TARGET, modules, MD_VAR, |code, index, module| {
            match module.descriptor.target_platform {
                Some(ref platform) if index < target_count => {
                    code.aload(MD_VAR);
                    code.push_int(index as i32)?;
                    code.new_(MODULE_TARGET)?;
                    code.dup();
                    code.ldc_string(platform)?;
                    code.invokespecial(MODULE_TARGET, "<init>", "(Ljava/lang/String;)V")?;
                    code.aastore();
                }
                _ => {}
            }
            Ok(())
        })
    })?;

    class.method(ACC_PUBLIC, "moduleHashes", "()[Ljdk/internal/module/ModuleHashes;", |code| {
        module_array(code, MODULE_HASHES, modules, MD_VAR, |code, index, module| {
            match module.descriptor.hashes {
                Some(ref hashes) => module_hashes(code, index, hashes),
                None => Ok(()),
            }
        })
    })?;

    class.method(ACC_PUBLIC, "moduleResolutions", "()[Ljdk/internal/module/ModuleResolution;", |code| {
        module_array(code, MODULE_RESOLUTION, modules, 0, |code, index, module| {
            if let Some(flags) = module.descriptor.resolution {
                code.aload(0);
                code.push_int(index as i32)?;
                code.new_(MODULE_RESOLUTION)?;
                code.dup();
                code.push_int(i32::from(flags))?;
                code.invokespecial(MODULE_RESOLUTION, "<init>", "(I)V")?;
                code.aastore();
            }
            Ok(())
        })
    })?;

    class.method(ACC_PUBLIC, "moduleNames", "()[Ljava/lang/String;", |code| {
        string_array(code, modules.iter().map(SystemModule::name))?;
        code.areturn();
        Ok(())
    })?;

    class.to_bytes()
}

/// Generates `SystemModulesMap`, naming `SystemModules$all` for every entry
/// point: the runtime's own modules and each module with a main class.
pub fn system_modules_map_class(modules: &[SystemModule]) -> Result<Vec<u8>> {
    let mut class = ClassBuilder::new(SYSTEM_MODULES_MAP, ACC_FINAL | ACC_SUPER);
    class.default_constructor(0)?;
    for &name in &["allSystemModules", "defaultSystemModules"] {
        class.method(ACC_STATIC, name, "()Ljdk/internal/module/SystemModules;", |code| {
            code.new_(ALL_SYSTEM_MODULES)?;
            code.dup();
            code.invokespecial(ALL_SYSTEM_MODULES, "<init>", "()V")?;
            code.areturn();
            Ok(())
        })?;
    }

    let mut launchers: Vec<&str> =
        modules.iter().filter(|m| m.descriptor.main_class.is_some()).map(SystemModule::name).collect();
    launchers.sort();
    let class_names = vec![ALL_SYSTEM_MODULES; launchers.len()];
    class.method(ACC_STATIC, "moduleNames", "()[Ljava/lang/String;", |code| {
        string_array(code, launchers.iter().cloned())?;
        code.areturn();
        Ok(())
    })?;
    class.method(ACC_STATIC, "classNames", "()[Ljava/lang/String;", |code| {
        string_array(code, class_names.iter().cloned())?;
        code.areturn();
        Ok(())
    })?;

    class.to_bytes()
}
