//! Writes the final pool to disk as an exploded runtime image.
//!
//! ```text
//! <dir>/modules/<module>/<path>   classes and resources
//! <dir>/lib/...                   native libraries
//! <dir>/bin/...                   native commands
//! <dir>/conf/...                  configuration files
//! <dir>/other/<module>/...        everything else
//! <dir>/lib/strings               shared string table
//! <dir>/release                   release properties
//! ```

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::error::{Error, Result};
use crate::plugin::LinkContext;
use crate::pool::{Artifact, ArtifactKind, Pool};

pub const MODULES_DIR: &str = "modules";
pub const RELEASE_FILE: &str = "release";
pub const STRINGS_FILE: &str = "lib/strings";

/// A written image.
#[derive(Debug, Clone)]
pub struct Image {
    root: PathBuf,
    modules: Vec<String>,
}

impl Image {
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Module names in pool order.
    pub fn modules(&self) -> &[String] {
        &self.modules
    }

    pub fn module_dir(&self, module: &str) -> PathBuf {
        self.root.join(MODULES_DIR).join(module)
    }

    pub fn release_file(&self) -> PathBuf {
        self.root.join(RELEASE_FILE)
    }
}

/// Where `artifact` goes, relative to the image root. Native libraries,
/// commands and configuration files may carry their section directory in
/// their module path (`lib/jvm.cfg`); it is not repeated.
pub fn image_path(artifact: &Artifact) -> PathBuf {
    let relative = artifact.relative_path();
    let section = match artifact.kind() {
        ArtifactKind::ClassOrResource => return Path::new(MODULES_DIR).join(artifact.module()).join(relative),
        ArtifactKind::Other => return Path::new("other").join(artifact.module()).join(relative),
        ArtifactKind::NativeLib => "lib",
        ArtifactKind::NativeCmd => "bin",
        ArtifactKind::Config => "conf",
    };
    let stripped = relative.strip_prefix(section).and_then(|r| r.strip_prefix('/')).unwrap_or(relative);
    Path::new(section).join(stripped)
}

/// Renders release properties as sorted `KEY=value` lines.
pub fn release_text<'a, I>(properties: I) -> String
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    properties.into_iter().map(|(k, v)| format!("{}={}\n", k, v)).collect()
}

#[derive(Debug, Clone)]
pub struct ImageWriter {
    target: PathBuf,
}

impl ImageWriter {
    /// `target` must not exist yet.
    pub fn new<P: Into<PathBuf>>(target: P) -> Self {
        ImageWriter { target: target.into() }
    }

    fn staging_dir(&self) -> PathBuf {
        let mut name = OsString::from(".");
        name.push(self.target.file_name().unwrap_or_else(|| "image".as_ref()));
        name.push(".staging");
        self.target.with_file_name(name)
    }

    /// Writes the pool into a staging directory next to the target and
    /// renames it into place. On failure nothing is left behind.
    pub fn write(&self, pool: &Pool, context: &LinkContext) -> Result<Image> {
        self.write_checked(pool, context, |_| Ok(()))
    }

    /// Like `write`, but runs `check` against the staged image first. The
    /// image is only moved into place if the check passes.
    pub fn write_checked<F>(&self, pool: &Pool, context: &LinkContext, check: F) -> Result<Image>
    where
        F: FnOnce(&Image) -> Result<()>,
    {
        if self.target.exists() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", self.target.display()),
            )));
        }
        let staging = self.staging_dir();
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        let modules: Vec<String> = pool.module_names().map(str::to_owned).collect();
        let staged = Image { root: staging.clone(), modules: modules.clone() };
        let written = write_tree(&staging, pool, context)
            .and_then(|()| check(&staged))
            .and_then(|()| Ok(fs::rename(&staging, &self.target)?));
        if let Err(e) = written {
            with_warn!("cannot remove staging directory: {}", fs::remove_dir_all(&staging));
            return Err(e);
        }
        info!("wrote image with {} entries to {}", pool.len(), self.target.display());
        Ok(Image { root: self.target.clone(), modules })
    }
}

fn write_file(root: &Path, relative: &Path, content: &[u8]) -> Result<()> {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, content)?;
    Ok(())
}

#[cfg(unix)]
fn write_link(root: &Path, relative: &Path, target: &str) -> Result<()> {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    ::std::os::unix::fs::symlink(target, &path)?;
    Ok(())
}

fn write_tree(root: &Path, pool: &Pool, context: &LinkContext) -> Result<()> {
    fs::create_dir_all(root)?;
    let mut written: HashMap<PathBuf, &str> = HashMap::new();
    for artifact in pool.entries() {
        let relative = image_path(artifact);
        if let Some(other) = written.insert(relative.clone(), artifact.path()) {
            return Err(Error::Invariant(format!(
                "{} and {} are both written to {}",
                other,
                artifact.path(),
                relative.display()
            )));
        }
        debug!("{} -> {}", artifact.path(), relative.display());
        match artifact.link_target() {
            #[cfg(unix)]
            Some(target) => write_link(root, &relative, target)?,
            _ => write_file(root, &relative, artifact.content())?,
        }
    }
    write_file(root, Path::new(RELEASE_FILE), release_text(pool.release_properties()).as_bytes())?;
    if !context.strings.is_empty() {
        write_file(root, Path::new(STRINGS_FILE), context.strings.as_bytes())?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pool::PoolBuilder;

    fn pool() -> Pool {
        let mut builder = PoolBuilder::new();
        let entries = [
            ("/m/p/A.class", ArtifactKind::ClassOrResource),
            ("/java.base/lib/jvm.cfg", ArtifactKind::NativeLib),
            ("/java.base/bin/java", ArtifactKind::NativeCmd),
            ("/java.base/security/java.policy", ArtifactKind::Config),
            ("/m/legal/LICENSE", ArtifactKind::Other),
        ];
        for &(path, kind) in &entries {
            builder.add(Artifact::new(path, kind, path.as_bytes().to_vec()).unwrap()).unwrap();
        }
        builder.release_properties_mut().insert("JAVA_VERSION".to_owned(), "\"11\"".to_owned());
        builder.release_properties_mut().insert("IMPLEMENTOR".to_owned(), "x".to_owned());
        builder.build()
    }

    #[test]
    fn test_image_paths() {
        let pool = pool();
        let paths: Vec<PathBuf> = pool.entries().map(image_path).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("modules/m/p/A.class"),
                PathBuf::from("lib/jvm.cfg"),
                PathBuf::from("bin/java"),
                PathBuf::from("conf/security/java.policy"),
                PathBuf::from("other/m/legal/LICENSE"),
            ]
        );
    }

    #[test]
    fn test_write_image() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("image");
        let mut context = LinkContext::new();
        context.strings.add("zip");
        let image = ImageWriter::new(&target).write(&pool(), &context).unwrap();

        assert_eq!(image.root(), target.as_path());
        assert_eq!(fs::read(image.module_dir("m").join("p/A.class")).unwrap(), b"/m/p/A.class");
        assert_eq!(fs::read_to_string(image.release_file()).unwrap(), "IMPLEMENTOR=x\nJAVA_VERSION=\"11\"\n");
        assert_eq!(fs::read(target.join(STRINGS_FILE)).unwrap(), b"zip\0");
        assert!(!dir.path().join(".image.staging").exists());
    }

    #[test]
    fn test_existing_target_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let err = ImageWriter::new(dir.path()).write(&pool(), &LinkContext::new()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Io);
    }

    #[test]
    fn test_shared_destination_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("image");
        let mut builder = PoolBuilder::new();
        builder.add(Artifact::new("/a/lib/libjava.so", ArtifactKind::NativeLib, b"a".to_vec()).unwrap()).unwrap();
        builder.add(Artifact::new("/b/libjava.so", ArtifactKind::NativeLib, b"b".to_vec()).unwrap()).unwrap();
        let err = ImageWriter::new(&target).write(&builder.build(), &LinkContext::new()).unwrap_err();

        assert_eq!(err.kind(), crate::error::ErrorKind::InvariantViolation);
        assert!(err.to_string().contains("/a/lib/libjava.so and /b/libjava.so"), "{}", err);
        assert!(!target.exists());
        assert!(!dir.path().join(".image.staging").exists());
    }

    #[test]
    fn test_failed_check_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("image");
        let err = ImageWriter::new(&target)
            .write_checked(&pool(), &LinkContext::new(), |staged| {
                assert!(staged.release_file().exists());
                Err(Error::Invariant("rejected".to_owned()))
            })
            .unwrap_err();

        assert_eq!(err.to_string(), "rejected");
        assert!(!target.exists());
        assert!(!dir.path().join(".image.staging").exists());
    }
}
