//! Drives a configured chain of plugins over a pool.
//!
//! Every stage with a previsit pass sees the original input first, in chain
//! order. The transformers then run in chain order, each consuming the pool
//! produced by the one before it. Post-processors run last, against the
//! image written from the final pool, before it is moved into place.

use std::path::PathBuf;

use log::{info, warn};

use crate::config::PluginConfig;
use crate::error::Result;
use crate::image::{Image, ImageWriter};
use crate::plugin::{self, LinkContext, Stage};
use crate::pool::Pool;

#[derive(Debug)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    /// Keeps `stages` in the given order. A stage placed before one of an
    /// earlier category is only reported.
    pub fn new(stages: Vec<Stage>) -> Self {
        for pair in stages.windows(2) {
            if pair[1].category() < pair[0].category() {
                warn!(
                    "{} ({}) runs after {} ({})",
                    pair[1].name(),
                    pair[1].category(),
                    pair[0].name(),
                    pair[0].category()
                );
            }
        }
        Pipeline { stages }
    }

    /// Configures every plugin before anything runs.
    pub fn from_config(configs: &[PluginConfig]) -> Result<Self> {
        let stages = configs.iter().map(plugin::create).collect::<Result<Vec<_>>>()?;
        Ok(Pipeline::new(stages))
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Runs the previsit passes and then every transformation.
    pub fn run(&self, input: Pool) -> Result<(Pool, LinkContext)> {
        let mut context = LinkContext::new();
        for stage in &self.stages {
            stage.previsit(&input, &mut context).map_err(|e| e.in_plugin(stage.name()))?;
        }

        let mut pool = input;
        for stage in self.stages.iter().filter(|s| !s.is_post_processor()) {
            let before = pool.len();
            pool = stage.transform(pool, &context).map_err(|e| e.in_plugin(stage.name()))?;
            info!("{}: {} -> {} entries", stage.name(), before, pool.len());
        }
        Ok((pool, context))
    }

    /// Runs the chain and writes the result as an image at `dir`. If a
    /// post-processor fails, no image is left at `dir`.
    pub fn link<P: Into<PathBuf>>(&self, input: Pool, dir: P) -> Result<Image> {
        let (pool, context) = self.run(input)?;
        ImageWriter::new(dir).write_checked(&pool, &context, |staged| {
            for stage in self.stages.iter().filter(|s| s.is_post_processor()) {
                info!("{}: post-processing {}", stage.name(), staged.root().display());
                stage.post_process(staged).map_err(|e| e.in_plugin(stage.name()))?;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::ErrorKind;
    use crate::plugin::Category;
    use crate::pool::{Artifact, ArtifactKind, PoolBuilder};

    fn input() -> Pool {
        let mut builder = PoolBuilder::new();
        builder.add(Artifact::class_or_resource("/m/a.txt", b"a".to_vec()).unwrap()).unwrap();
        builder.add(Artifact::class_or_resource("/m/b.properties", b"b".to_vec()).unwrap()).unwrap();
        builder.add(Artifact::new("/m/bin/tool", ArtifactKind::NativeCmd, b"c".to_vec()).unwrap()).unwrap();
        builder.build()
    }

    #[test]
    fn test_stages_run_in_order() {
        let pipeline = Pipeline::from_config(&[
            PluginConfig::new("exclude-resources").with_main("*.txt"),
            PluginConfig::new("strip-native-commands"),
        ])
        .unwrap();
        assert_eq!(pipeline.stages().len(), 2);
        let (pool, context) = pipeline.run(input()).unwrap();
        let paths: Vec<&str> = pool.entries().map(Artifact::path).collect();
        assert_eq!(paths, vec!["/m/b.properties"]);
        assert!(context.strings.is_empty());
    }

    #[test]
    fn test_configuration_error_stops_before_running() {
        let err = Pipeline::from_config(&[
            PluginConfig::new("strip-debug"),
            PluginConfig::new("exclude-resources").with_main("regex:.*"),
        ])
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigurationError);
    }

    #[test]
    fn test_out_of_order_categories_are_kept() {
        let pipeline = Pipeline::from_config(&[
            PluginConfig::new("compress").with_main("2"),
            PluginConfig::new("exclude-resources").with_main("*.txt"),
        ])
        .unwrap();
        let categories: Vec<Category> = pipeline.stages().iter().map(Stage::category).collect();
        assert_eq!(categories, vec![Category::Compressor, Category::Filter]);
    }

    #[test]
    fn test_errors_name_the_plugin() {
        let pipeline = Pipeline::from_config(&[PluginConfig::new("system-modules")]).unwrap();
        let err = pipeline.run(input()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
        assert!(err.to_string().starts_with("system-modules: "));
    }

    #[test]
    fn test_failed_verification_leaves_no_image() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::from_config(&[PluginConfig::new("verify-image")]).unwrap();
        let err = pipeline.link(input(), dir.path().join("image")).unwrap_err();
        // the module has no module-info.class
        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
        assert!(err.to_string().starts_with("verify-image: "));
        assert!(!dir.path().join("image").exists());
        assert!(!dir.path().join(".image.staging").exists());
    }
}
