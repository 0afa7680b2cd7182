//! The logical content of a module descriptor (`module-info.class`).
//!
//! Names are held in their source form: module, package and class names are
//! dot separated. The class file representation uses slashes for packages and
//! classes; conversion happens when reading and writing attributes.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::Error;

/// The module every other module depends on, which must be linked first.
pub const JAVA_BASE: &str = "java.base";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModuleModifier {
    Open,
    Synthetic,
    Mandated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RequiresModifier {
    Transitive,
    Static,
    Synthetic,
    Mandated,
}

/// Modifiers of an `exports` or `opens` clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AccessModifier {
    Synthetic,
    Mandated,
}

impl ModuleModifier {
    pub fn java_name(self) -> &'static str {
        match self {
            ModuleModifier::Open => "OPEN",
            ModuleModifier::Synthetic => "SYNTHETIC",
            ModuleModifier::Mandated => "MANDATED",
        }
    }
}

impl RequiresModifier {
    /// The constant name of the corresponding `ModuleDescriptor` enum.
    pub fn java_name(self) -> &'static str {
        match self {
            RequiresModifier::Transitive => "TRANSITIVE",
            RequiresModifier::Static => "STATIC",
            RequiresModifier::Synthetic => "SYNTHETIC",
            RequiresModifier::Mandated => "MANDATED",
        }
    }
}

impl AccessModifier {
    pub fn java_name(self) -> &'static str {
        match self {
            AccessModifier::Synthetic => "SYNTHETIC",
            AccessModifier::Mandated => "MANDATED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Requires {
    pub name: String,
    pub modifiers: BTreeSet<RequiresModifier>,
    pub compiled_version: Option<String>,
}

impl Requires {
    pub fn new(name: &str) -> Self {
        Requires { name: name.to_owned(), modifiers: BTreeSet::new(), compiled_version: None }
    }

    pub fn with_modifier(mut self, modifier: RequiresModifier) -> Self {
        self.modifiers.insert(modifier);
        self
    }
}

/// An `exports` or `opens` clause. `targets` is empty for an unqualified
/// clause.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackageAccess {
    pub source: String,
    pub modifiers: BTreeSet<AccessModifier>,
    pub targets: BTreeSet<String>,
}

pub type Exports = PackageAccess;
pub type Opens = PackageAccess;

impl PackageAccess {
    pub fn new(source: &str) -> Self {
        PackageAccess { source: source.to_owned(), modifiers: BTreeSet::new(), targets: BTreeSet::new() }
    }

    pub fn to<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.targets.extend(targets.into_iter().map(Into::into));
        self
    }

    pub fn is_qualified(&self) -> bool {
        !self.targets.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Provides {
    pub service: String,
    /// Provider classes in declaration order.
    pub providers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleHashes {
    pub algorithm: String,
    pub hashes: BTreeMap<String, Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleDescriptor {
    pub name: String,
    pub modifiers: BTreeSet<ModuleModifier>,
    pub version: Option<String>,
    pub requires: Vec<Requires>,
    pub exports: Vec<Exports>,
    pub opens: Vec<Opens>,
    pub uses: BTreeSet<String>,
    pub provides: Vec<Provides>,
    pub packages: BTreeSet<String>,
    pub main_class: Option<String>,
    pub target_platform: Option<String>,
    pub hashes: Option<ModuleHashes>,
    pub resolution: Option<u16>,
}

impl ModuleDescriptor {
    pub fn builder(name: &str) -> ModuleDescriptorBuilder {
        ModuleDescriptorBuilder {
            descriptor: ModuleDescriptor {
                name: name.to_owned(),
                modifiers: BTreeSet::new(),
                version: None,
                requires: Vec::new(),
                exports: Vec::new(),
                opens: Vec::new(),
                uses: BTreeSet::new(),
                provides: Vec::new(),
                packages: BTreeSet::new(),
                main_class: None,
                target_platform: None,
                hashes: None,
                resolution: None,
            },
        }
    }

    pub fn is_open(&self) -> bool {
        self.modifiers.contains(&ModuleModifier::Open)
    }

    /// Checks the syntax of every name in the descriptor and reports all
    /// offending names at once.
    pub fn validate_names(&self) -> Result<(), Error> {
        let mut invalid = Vec::new();
        let mut check = |kind: &str, name: &str| {
            if !is_qualified_name(name) {
                invalid.push(format!("{} {:?}", kind, name));
            }
        };
        check("module name", &self.name);
        for r in &self.requires {
            check("requires", &r.name);
        }
        for e in self.exports.iter().chain(&self.opens) {
            check("package", &e.source);
            for t in &e.targets {
                check("target module", t);
            }
        }
        for p in &self.packages {
            check("package", p);
        }
        for s in &self.uses {
            check("service type", s);
        }
        for p in &self.provides {
            check("service type", &p.service);
            for c in &p.providers {
                check("provider", c);
            }
        }
        if let Some(ref c) = self.main_class {
            check("main class", c);
        }
        if invalid.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidNames { module: self.name.clone(), names: invalid })
        }
    }

    /// Checks package names that come from outside the descriptor, such as
    /// the directories of the module's classes.
    pub fn validate_package_names(&self, packages: &BTreeSet<String>) -> Result<(), Error> {
        let invalid: Vec<String> =
            packages.iter().filter(|p| !is_qualified_name(p)).map(|p| format!("package {:?}", p)).collect();
        if invalid.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidNames { module: self.name.clone(), names: invalid })
        }
    }

    /// Checks that every exported or opened package is in `packages`.
    /// Reports all missing packages, sorted.
    pub fn validate_packages(&self, packages: &BTreeSet<String>) -> Result<(), Error> {
        let missing: BTreeSet<&String> = self
            .exports
            .iter()
            .chain(&self.opens)
            .map(|e| &e.source)
            .filter(|p| !packages.contains(*p))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::MissingPackages {
                module: self.name.clone(),
                packages: missing.into_iter().cloned().collect(),
            })
        }
    }

    /// The value `java.lang.module.ModuleDescriptor::hashCode` returns for
    /// this descriptor at run time. The target platform, hashes and
    /// resolution flags are not part of it.
    pub fn hash_code(&self) -> i32 {
        let mut hc = java_hash(&self.name);
        let parts = [
            modifiers_hash(self.modifiers.iter().map(|m| m.java_name())),
            set_hash(self.requires.iter().map(Requires::hash_code)),
            set_hash(self.packages.iter().map(|p| java_hash(p))),
            set_hash(self.exports.iter().map(PackageAccess::hash_code)),
            set_hash(self.opens.iter().map(PackageAccess::hash_code)),
            set_hash(self.uses.iter().map(|u| java_hash(u))),
            set_hash(self.provides.iter().map(Provides::hash_code)),
            optional_hash(&self.version),
            // raw version string, always absent for parsed versions
            0,
            optional_hash(&self.main_class),
        ];
        for part in &parts {
            hc = hc.wrapping_mul(43).wrapping_add(*part);
        }
        if hc == 0 {
            -1
        } else {
            hc
        }
    }
}

/// `java.lang.String::hashCode` over the UTF-16 form of `s`.
pub fn java_hash(s: &str) -> i32 {
    s.encode_utf16().fold(0i32, |h, c| h.wrapping_mul(31).wrapping_add(i32::from(c)))
}

fn optional_hash(value: &Option<String>) -> i32 {
    value.as_ref().map_or(0, |v| java_hash(v))
}

/// Hash of a `java.util.Set`: the sum of its element hashes.
fn set_hash<I: Iterator<Item = i32>>(hashes: I) -> i32 {
    hashes.fold(0i32, i32::wrapping_add)
}

/// Modifier enums hash by constant name so that the value is stable across
/// runs.
fn modifiers_hash<I: Iterator<Item = &'static str>>(names: I) -> i32 {
    set_hash(names.map(java_hash))
}

impl Requires {
    fn hash_code(&self) -> i32 {
        let hash = java_hash(&self.name)
            .wrapping_mul(43)
            .wrapping_add(modifiers_hash(self.modifiers.iter().map(|m| m.java_name())));
        match self.compiled_version {
            Some(ref v) => hash.wrapping_mul(43).wrapping_add(java_hash(v)),
            None => hash,
        }
    }
}

impl PackageAccess {
    fn hash_code(&self) -> i32 {
        modifiers_hash(self.modifiers.iter().map(|m| m.java_name()))
            .wrapping_mul(43)
            .wrapping_add(java_hash(&self.source))
            .wrapping_mul(43)
            .wrapping_add(set_hash(self.targets.iter().map(|t| java_hash(t))))
    }
}

impl Provides {
    fn hash_code(&self) -> i32 {
        let providers = self.providers.iter().fold(1i32, |h, p| h.wrapping_mul(31).wrapping_add(java_hash(p)));
        java_hash(&self.service).wrapping_mul(43).wrapping_add(providers)
    }
}

impl fmt::Display for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "module {} {:?}", self.name, self.modifiers)?;
        if let Some(ref v) = self.version {
            write!(f, " @{}", v)?;
        }
        write!(f, " {{")?;
        for r in &self.requires {
            write!(f, " requires {:?} {}", r.modifiers, r.name)?;
            if let Some(ref v) = r.compiled_version {
                write!(f, "@{}", v)?;
            }
            write!(f, ";")?;
        }
        for (kind, list) in &[("exports", &self.exports), ("opens", &self.opens)] {
            for e in list.iter() {
                write!(f, " {} {:?} {}", kind, e.modifiers, e.source)?;
                if e.is_qualified() {
                    write!(f, " to {:?}", e.targets)?;
                }
                write!(f, ";")?;
            }
        }
        for s in &self.uses {
            write!(f, " uses {};", s)?;
        }
        for p in &self.provides {
            write!(f, " provides {} with {:?};", p.service, p.providers)?;
        }
        write!(f, " packages {:?};", self.packages)?;
        if let Some(ref c) = self.main_class {
            write!(f, " main {};", c)?;
        }
        write!(f, " }}")
    }
}

/// Assembles a descriptor and validates it on `build`.
#[derive(Debug, Clone)]
pub struct ModuleDescriptorBuilder {
    descriptor: ModuleDescriptor,
}

impl ModuleDescriptorBuilder {
    pub fn modifier(mut self, modifier: ModuleModifier) -> Self {
        self.descriptor.modifiers.insert(modifier);
        self
    }

    pub fn version(mut self, version: &str) -> Self {
        self.descriptor.version = Some(version.to_owned());
        self
    }

    pub fn requires(mut self, requires: Requires) -> Self {
        self.descriptor.requires.push(requires);
        self
    }

    pub fn exports(mut self, exports: Exports) -> Self {
        self.descriptor.exports.push(exports);
        self
    }

    pub fn opens(mut self, opens: Opens) -> Self {
        self.descriptor.opens.push(opens);
        self
    }

    pub fn uses(mut self, service: &str) -> Self {
        self.descriptor.uses.insert(service.to_owned());
        self
    }

    pub fn provides(mut self, service: &str, providers: &[&str]) -> Self {
        self.descriptor.provides.push(Provides {
            service: service.to_owned(),
            providers: providers.iter().map(|&p| p.to_owned()).collect(),
        });
        self
    }

    pub fn packages<I, S>(mut self, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.descriptor.packages.extend(packages.into_iter().map(Into::into));
        self
    }

    pub fn main_class(mut self, class: &str) -> Self {
        self.descriptor.main_class = Some(class.to_owned());
        self
    }

    pub fn target_platform(mut self, platform: &str) -> Self {
        self.descriptor.target_platform = Some(platform.to_owned());
        self
    }

    /// Returns the descriptor without validating it.
    pub fn into_unchecked(self) -> ModuleDescriptor {
        self.descriptor
    }

    /// Validates names and package presence.
    pub fn build(self) -> Result<ModuleDescriptor, Error> {
        let d = self.descriptor;
        d.validate_names()?;
        d.validate_packages(&d.packages)?;
        if d.name == JAVA_BASE && !d.requires.is_empty() {
            return Err(Error::Invariant(format!("{} must not require other modules", JAVA_BASE)));
        }
        Ok(d)
    }
}

const KEYWORDS: &[&str] = &[
    "abstract", "assert", "boolean", "break", "byte", "case", "catch", "char", "class", "const",
    "continue", "default", "do", "double", "else", "enum", "extends", "final", "finally", "float",
    "for", "goto", "if", "implements", "import", "instanceof", "int", "interface", "long", "native",
    "new", "package", "private", "protected", "public", "return", "short", "static", "strictfp",
    "super", "switch", "synchronized", "this", "throw", "throws", "transient", "try", "void",
    "volatile", "while", "true", "false", "null", "_",
];

/// A Java identifier that is not a reserved word.
pub fn is_java_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$') && !KEYWORDS.contains(&s)
}

/// A dot separated sequence of Java identifiers: a module, package or
/// class name.
pub fn is_qualified_name(s: &str) -> bool {
    !s.is_empty() && s.split('.').all(is_java_identifier)
}

/// Converts an internal name (`java/lang/Object`) to its source form.
pub fn to_source_name(internal: &str) -> String {
    internal.replace('/', ".")
}

pub fn to_internal_name(source: &str) -> String {
    source.replace('.', "/")
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_names() {
        assert!(is_qualified_name("java.base"));
        assert!(is_qualified_name("com.example.$Impl_2"));
        assert!(!is_qualified_name("com..example"));
        assert!(!is_qualified_name("com.class.example"));
        assert!(!is_qualified_name("9lives"));
        assert!(!is_qualified_name(""));
    }

    #[test]
    fn test_exported_package_must_be_declared() {
        let err = ModuleDescriptor::builder("m")
            .requires(Requires::new("java.base"))
            .exports(Exports::new("p.q"))
            .exports(Exports::new("p.a"))
            .opens(Opens::new("p.r"))
            .packages(vec!["p.r"])
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
        match err {
            Error::MissingPackages { module, packages } => {
                assert_eq!(module, "m");
                assert_eq!(packages, vec!["p.a".to_owned(), "p.q".to_owned()]);
            }
            e => panic!("unexpected error {}", e),
        }
    }

    #[test]
    fn test_invalid_names_are_all_reported() {
        let err = ModuleDescriptor::builder("bad-name")
            .requires(Requires::new("also bad"))
            .build()
            .unwrap_err();
        match err {
            Error::InvalidNames { names, .. } => assert_eq!(names.len(), 2),
            e => panic!("unexpected error {}", e),
        }
    }

    #[test]
    fn test_java_base_has_no_requires() {
        assert!(ModuleDescriptor::builder(JAVA_BASE).requires(Requires::new("m")).build().is_err());
        assert!(ModuleDescriptor::builder(JAVA_BASE).packages(vec!["java.lang"]).build().is_ok());
    }

    #[test]
    fn test_hash_code_of_bare_module() {
        assert_eq!(java_hash("java.base"), -888956131);
        let base = ModuleDescriptor::builder(JAVA_BASE).into_unchecked();
        assert_eq!(base.hash_code(), -538843563);
    }

    #[test]
    fn test_hash_code_matches_runtime() {
        let mut transitive = Requires::new("m.two")
            .with_modifier(RequiresModifier::Transitive)
            .with_modifier(RequiresModifier::Static);
        transitive.compiled_version = Some("11".to_owned());
        let mut opens = PackageAccess::new("p.impl").to(vec!["m.two", "m.three"]);
        opens.modifiers.insert(AccessModifier::Synthetic);
        let descriptor = ModuleDescriptor::builder("m.one")
            .modifier(ModuleModifier::Synthetic)
            .version("1.0")
            .requires(Requires::new("java.base").with_modifier(RequiresModifier::Mandated))
            .requires(transitive)
            .exports(PackageAccess::new("p.api"))
            .opens(opens)
            .uses("p.api.Service")
            .provides("p.api.Service", &["p.impl.A", "p.impl.B"])
            .packages(vec!["p.api", "p.impl"])
            .main_class("p.api.Main")
            .into_unchecked();
        assert_eq!(descriptor.hash_code(), 2005134236);

        // clause order does not matter, as for the runtime's sets
        let mut reordered = descriptor.clone();
        reordered.requires.reverse();
        assert_eq!(reordered.hash_code(), descriptor.hash_code());

        // neither does the target platform
        reordered.target_platform = Some("linux-amd64".to_owned());
        assert_eq!(reordered.hash_code(), descriptor.hash_code());
    }
}
