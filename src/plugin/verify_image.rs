//! Checks the written image before the link is reported as done.

use log::debug;

use super::{Category, Plugin, PostProcessor};
use crate::config::PluginConfig;
use crate::error::{Error, Result};
use crate::image::Image;
use crate::pool::MODULE_INFO_CLASS;

pub const NAME: &str = "verify-image";

#[derive(Debug, Default)]
pub struct VerifyImagePlugin;

impl VerifyImagePlugin {
    pub fn configure(config: &PluginConfig) -> Result<Self> {
        match config.main() {
            Some(value) => Err(Error::config(NAME, format!("unexpected value {:?}", value))),
            None => Ok(VerifyImagePlugin),
        }
    }
}

impl Plugin for VerifyImagePlugin {
    fn name(&self) -> &'static str {
        NAME
    }

    fn category(&self) -> Category {
        Category::Verifier
    }
}

impl PostProcessor for VerifyImagePlugin {
    /// Every module needs its descriptor and the image needs a release file.
    fn process(&self, image: &Image) -> Result<()> {
        let missing: Vec<&str> = image
            .modules()
            .iter()
            .filter(|m| !image.module_dir(m).join(MODULE_INFO_CLASS).is_file())
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(Error::Invariant(format!("modules without {}: {}", MODULE_INFO_CLASS, missing.join(", "))));
        }
        if !image.release_file().is_file() {
            return Err(Error::Invariant(format!("{} is missing", image.release_file().display())));
        }
        debug!("verified {} module(s) in {}", image.modules().len(), image.root().display());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::ErrorKind;
    use crate::image::ImageWriter;
    use crate::plugin::LinkContext;
    use crate::pool::{Artifact, Pool, PoolBuilder};

    fn write(paths: &[&str]) -> (tempfile::TempDir, Image) {
        let mut builder = PoolBuilder::new();
        for path in paths {
            builder.add(Artifact::class_or_resource(path, vec![0u8]).unwrap()).unwrap();
        }
        let pool: Pool = builder.build();
        let dir = tempfile::tempdir().unwrap();
        let image = ImageWriter::new(dir.path().join("image")).write(&pool, &LinkContext::new()).unwrap();
        (dir, image)
    }

    #[test]
    fn test_complete_image() {
        let (_dir, image) = write(&["/java.base/module-info.class", "/java.base/java/lang/Object.class"]);
        VerifyImagePlugin.process(&image).unwrap();
    }

    #[test]
    fn test_missing_module_info() {
        let (_dir, image) = write(&["/java.base/module-info.class", "/app/app/Main.class"]);
        let err = VerifyImagePlugin.process(&image).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
        assert!(err.to_string().contains("app"));
    }
}
