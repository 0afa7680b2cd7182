//! The ordered, path-indexed collection of artifacts handed from one link
//! stage to the next.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;
use std::slice;

use crate::error::{Error, Result};
use crate::model::class_file::MODULE_INFO;
use crate::model::module_descriptor::is_java_identifier;

pub mod filter;
pub mod glob;

pub const MODULE_INFO_CLASS: &str = "module-info.class";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    ClassOrResource,
    NativeLib,
    NativeCmd,
    Config,
    Other,
}

/// One file of a module. The content is shared between pools and never
/// mutated; a rewrite produces a new artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    module: String,
    path: String,
    kind: ArtifactKind,
    content: Rc<[u8]>,
    link_target: Option<String>,
}

impl Artifact {
    /// Creates an artifact for `path`, which must have the form
    /// `/<module>/<relative path>`. Empty, `.` and `..` components are
    /// rejected so that the artifact stays inside its module when written.
    pub fn new<C: Into<Rc<[u8]>>>(path: &str, kind: ArtifactKind, content: C) -> Result<Self> {
        let components: Vec<&str> = match path.strip_prefix('/') {
            Some(rest) => rest.split('/').collect(),
            None => Vec::new(),
        };
        if components.len() < 2 || !components.iter().all(|c| is_plain_component(c)) {
            return Err(Error::MalformedInput(format!("artifact path {} is not /<module>/<path>", path)));
        }
        let module = components[0].to_owned();
        Ok(Artifact { module, path: path.to_owned(), kind, content: content.into(), link_target: None })
    }

    pub fn class_or_resource<C: Into<Rc<[u8]>>>(path: &str, content: C) -> Result<Self> {
        Artifact::new(path, ArtifactKind::ClassOrResource, content)
    }

    /// Marks the artifact as a link to a file elsewhere in the image.
    pub fn linked_to(mut self, target: &str) -> Self {
        self.link_target = Some(target.to_owned());
        self
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn link_target(&self) -> Option<&str> {
        self.link_target.as_ref().map(String::as_str)
    }

    /// The path inside the module, without the leading `/<module>/`.
    pub fn relative_path(&self) -> &str {
        &self.path[self.module.len() + 2..]
    }

    /// The last path component.
    pub fn file_name(&self) -> &str {
        match self.path.rfind('/') {
            Some(i) => &self.path[i + 1..],
            None => &self.path,
        }
    }

    pub fn is_class(&self) -> bool {
        self.kind == ArtifactKind::ClassOrResource && self.path.ends_with(".class")
    }

    pub fn is_module_info(&self) -> bool {
        self.kind == ArtifactKind::ClassOrResource && self.relative_path() == MODULE_INFO_CLASS
    }

    /// A copy of this artifact with different content.
    pub fn with_content<C: Into<Rc<[u8]>>>(&self, content: C) -> Artifact {
        Artifact { content: content.into(), ..self.clone() }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Pool {
    entries: Vec<Artifact>,
    index: HashMap<String, usize>,
    modules: Vec<String>,
    release: BTreeMap<String, String>,
}

impl Pool {
    pub fn entries(&self) -> slice::Iter<Artifact> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&Artifact> {
        self.index.get(path).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    /// Module names in order of first appearance.
    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(String::as_str)
    }

    pub fn module(&self, name: &str) -> Option<ModuleView> {
        self.modules.iter().find(|m| *m == name).map(|name| ModuleView { pool: self, name })
    }

    pub fn modules(&self) -> impl Iterator<Item = ModuleView> {
        self.modules.iter().map(move |name| ModuleView { pool: self, name })
    }

    pub fn release_properties(&self) -> &BTreeMap<String, String> {
        &self.release
    }

    /// An empty builder for the next pool, carrying over the release
    /// properties.
    pub fn builder(&self) -> PoolBuilder {
        PoolBuilder { pool: Pool { release: self.release.clone(), ..Pool::default() } }
    }

    /// Calls `f` on every artifact in order and adds whatever it returns to
    /// `out`.
    pub fn transform_and_copy<F>(&self, mut f: F, out: &mut PoolBuilder) -> Result<()>
    where
        F: FnMut(&Artifact) -> Result<Option<Artifact>>,
    {
        for artifact in &self.entries {
            if let Some(result) = f(artifact)? {
                out.add(result)?;
            }
        }
        Ok(())
    }
}

/// Collects the artifacts of a new pool. `build` consumes the builder, so
/// nothing can be added to a pool once it exists.
#[derive(Debug, Default)]
pub struct PoolBuilder {
    pool: Pool,
}

impl PoolBuilder {
    pub fn new() -> Self {
        PoolBuilder::default()
    }

    pub fn add(&mut self, artifact: Artifact) -> Result<()> {
        let pool = &mut self.pool;
        if pool.index.contains_key(artifact.path()) {
            return Err(Error::DuplicatePath(artifact.path().to_owned()));
        }
        if !pool.modules.iter().any(|m| m == artifact.module()) {
            pool.modules.push(artifact.module().to_owned());
        }
        pool.index.insert(artifact.path().to_owned(), pool.entries.len());
        pool.entries.push(artifact);
        Ok(())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.pool.contains(path)
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    pub fn release_properties_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.pool.release
    }

    pub fn build(self) -> Pool {
        self.pool
    }
}

/// The artifacts of one module.
#[derive(Debug, Clone, Copy)]
pub struct ModuleView<'a> {
    pool: &'a Pool,
    name: &'a str,
}

impl<'a> ModuleView<'a> {
    pub fn name(&self) -> &'a str {
        self.name
    }

    pub fn entries(&self) -> impl Iterator<Item = &'a Artifact> {
        let name = self.name;
        self.pool.entries.iter().filter(move |a| a.module() == name)
    }

    /// Looks up an artifact by its path relative to the module.
    pub fn find_entry(&self, relative_path: &str) -> Option<&'a Artifact> {
        self.pool.get(&format!("/{}/{}", self.name, relative_path))
    }

    pub fn module_info(&self) -> Option<&'a Artifact> {
        self.find_entry(MODULE_INFO_CLASS)
    }

    /// The packages of the module in source form: the directory of every
    /// class other than `module-info`, and of every resource whose directory
    /// is a valid package name outside `META-INF`.
    pub fn packages(&self) -> BTreeSet<String> {
        let mut packages = BTreeSet::new();
        for artifact in self.entries().filter(|a| a.kind() == ArtifactKind::ClassOrResource) {
            let relative = artifact.relative_path();
            let dir = match relative.rfind('/') {
                Some(i) => &relative[..i],
                None => continue,
            };
            let is_package = if artifact.is_class() {
                artifact.file_name() != format!("{}.class", MODULE_INFO)
            } else {
                !dir.starts_with("META-INF") && dir.split('/').all(is_java_identifier)
            };
            if is_package {
                packages.insert(dir.replace('/', "."));
            }
        }
        packages
    }
}

fn is_plain_component(component: &str) -> bool {
    !component.is_empty() && component != "." && component != ".." && !component.contains('\\')
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::ErrorKind;

    fn artifact(path: &str) -> Artifact {
        Artifact::class_or_resource(path, Vec::<u8>::new()).unwrap()
    }

    #[test]
    fn test_artifact_paths() {
        let a = artifact("/m/p/q/A.class");
        assert_eq!(a.module(), "m");
        assert_eq!(a.relative_path(), "p/q/A.class");
        assert_eq!(a.file_name(), "A.class");
        assert!(a.is_class());
        assert!(artifact("/m/module-info.class").is_module_info());
        for bad in &["m/A.class", "/m", "/m/", "//A.class"] {
            assert!(Artifact::class_or_resource(bad, Vec::<u8>::new()).is_err(), "{}", bad);
        }
    }

    #[test]
    fn test_paths_cannot_leave_their_module() {
        for bad in &["/m//tmp/outside.txt", "/m/../outside.txt", "/../m/A.class", "/m/p/./A.class", "/m/p\\..\\A"] {
            let err = Artifact::new(bad, ArtifactKind::Other, Vec::<u8>::new()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MalformedInput, "{}", bad);
        }
    }

    #[test]
    fn test_duplicate_path() {
        let mut builder = PoolBuilder::new();
        builder.add(artifact("/m/A.class")).unwrap();
        builder.add(artifact("/m/B.class")).unwrap();
        let err = builder.add(artifact("/m/A.class")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
        assert_eq!(builder.build().len(), 2);
    }

    #[test]
    fn test_module_order_and_lookup() {
        let mut builder = PoolBuilder::new();
        for path in &["/b/x/B.class", "/a/y/A.class", "/b/module-info.class"] {
            builder.add(artifact(path)).unwrap();
        }
        let pool = builder.build();
        assert_eq!(pool.module_names().collect::<Vec<_>>(), vec!["b", "a"]);
        let b = pool.module("b").unwrap();
        assert_eq!(b.entries().count(), 2);
        assert!(b.module_info().is_some());
        assert!(b.find_entry("x/B.class").is_some());
        assert!(pool.module("c").is_none());
    }

    #[test]
    fn test_packages() {
        let mut builder = PoolBuilder::new();
        for path in &[
            "/m/module-info.class",
            "/m/p/q/A.class",
            "/m/p/r/data.txt",
            "/m/META-INF/services/p.S",
            "/m/p/not-a-package/x.txt",
            "/m/top.txt",
        ] {
            builder.add(artifact(path)).unwrap();
        }
        let pool = builder.build();
        let packages = pool.module("m").unwrap().packages();
        assert_eq!(packages.into_iter().collect::<Vec<_>>(), vec!["p.q", "p.r"]);
    }

    #[test]
    fn test_transform_and_copy() {
        let mut builder = PoolBuilder::new();
        builder.add(artifact("/m/A.class")).unwrap();
        builder.add(artifact("/m/B.txt")).unwrap();
        builder.release_properties_mut().insert("JAVA_VERSION".to_owned(), "\"9\"".to_owned());
        let pool = builder.build();
        let mut out = pool.builder();
        pool.transform_and_copy(|a| Ok(if a.is_class() { Some(a.with_content(vec![1u8])) } else { None }), &mut out)
            .unwrap();
        let next = out.build();
        assert_eq!(next.len(), 1);
        assert_eq!(next.get("/m/A.class").unwrap().content(), &[1u8][..]);
        assert_eq!(next.release_properties().len(), 1);
    }
}
