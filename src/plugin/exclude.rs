//! Plugins that drop artifacts from the image.

use log::trace;

use super::{Category, LinkContext, Plugin, Transformer};
use crate::config::PluginConfig;
use crate::error::{Error, Result};
use crate::pool::filter::ResourceFilter;
use crate::pool::{Artifact, ArtifactKind, Pool};

pub const EXCLUDE_RESOURCES: &str = "exclude-resources";
pub const EXCLUDE_FILES: &str = "exclude-files";
pub const STRIP_NATIVE_COMMANDS: &str = "strip-native-commands";

/// Copies the artifacts for which `keep` holds.
fn retain<F>(plugin: &str, input: &Pool, keep: F) -> Result<Pool>
where
    F: Fn(&Artifact) -> bool,
{
    let mut out = input.builder();
    input.transform_and_copy(
        |artifact| {
            if keep(artifact) {
                Ok(Some(artifact.clone()))
            } else {
                trace!("{}: excluding {}", plugin, artifact.path());
                Ok(None)
            }
        },
        &mut out,
    )?;
    Ok(out.build())
}

fn exclude_filter(config: &PluginConfig) -> Result<ResourceFilter> {
    let patterns = config
        .main()
        .ok_or_else(|| Error::config(config.plugin(), "a list of patterns is required"))?;
    ResourceFilter::exclude(config.plugin(), patterns)
}

/// Drops classes and resources matching any of the configured patterns.
#[derive(Debug)]
pub struct ExcludePlugin {
    filter: ResourceFilter,
}

impl ExcludePlugin {
    pub fn configure(config: &PluginConfig) -> Result<Self> {
        Ok(ExcludePlugin { filter: exclude_filter(config)? })
    }
}

impl Plugin for ExcludePlugin {
    fn name(&self) -> &'static str {
        EXCLUDE_RESOURCES
    }

    fn category(&self) -> Category {
        Category::Filter
    }
}

impl Transformer for ExcludePlugin {
    fn transform(&self, input: &Pool, _context: &LinkContext) -> Result<Pool> {
        retain(EXCLUDE_RESOURCES, input, |a| {
            a.kind() != ArtifactKind::ClassOrResource || self.filter.test(a.path())
        })
    }
}

/// Like `ExcludePlugin`, for native libraries, commands, configuration and
/// other files.
#[derive(Debug)]
pub struct ExcludeFilesPlugin {
    filter: ResourceFilter,
}

impl ExcludeFilesPlugin {
    pub fn configure(config: &PluginConfig) -> Result<Self> {
        Ok(ExcludeFilesPlugin { filter: exclude_filter(config)? })
    }
}

impl Plugin for ExcludeFilesPlugin {
    fn name(&self) -> &'static str {
        EXCLUDE_FILES
    }

    fn category(&self) -> Category {
        Category::Filter
    }
}

impl Transformer for ExcludeFilesPlugin {
    fn transform(&self, input: &Pool, _context: &LinkContext) -> Result<Pool> {
        retain(EXCLUDE_FILES, input, |a| {
            a.kind() == ArtifactKind::ClassOrResource || self.filter.test(a.path())
        })
    }
}

#[derive(Debug, Default)]
pub struct StripNativeCommandsPlugin;

impl StripNativeCommandsPlugin {
    pub fn configure(_config: &PluginConfig) -> Result<Self> {
        Ok(StripNativeCommandsPlugin)
    }
}

impl Plugin for StripNativeCommandsPlugin {
    fn name(&self) -> &'static str {
        STRIP_NATIVE_COMMANDS
    }

    fn category(&self) -> Category {
        Category::Filter
    }
}

impl Transformer for StripNativeCommandsPlugin {
    fn transform(&self, input: &Pool, _context: &LinkContext) -> Result<Pool> {
        retain(STRIP_NATIVE_COMMANDS, input, |a| a.kind() != ArtifactKind::NativeCmd)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::ErrorKind;
    use crate::pool::PoolBuilder;

    fn pool() -> Pool {
        let mut builder = PoolBuilder::new();
        let files = [
            ("/m/p/A.class", ArtifactKind::ClassOrResource),
            ("/m/p/notes.txt", ArtifactKind::ClassOrResource),
            ("/m/lib/libfoo.so", ArtifactKind::NativeLib),
            ("/m/bin/tool", ArtifactKind::NativeCmd),
            ("/m/conf/tool.txt", ArtifactKind::Config),
        ];
        for &(path, kind) in files.iter() {
            builder.add(Artifact::new(path, kind, Vec::<u8>::new()).unwrap()).unwrap();
        }
        builder.build()
    }

    fn paths(pool: &Pool) -> Vec<&str> {
        pool.entries().map(Artifact::path).collect()
    }

    #[test]
    fn test_exclude_resources() {
        let plugin = ExcludePlugin::configure(&PluginConfig::new(EXCLUDE_RESOURCES).with_main("*.txt")).unwrap();
        let out = plugin.transform(&pool(), &LinkContext::new()).unwrap();
        assert_eq!(paths(&out), vec!["/m/p/A.class", "/m/lib/libfoo.so", "/m/bin/tool", "/m/conf/tool.txt"]);
    }

    #[test]
    fn test_exclude_is_idempotent() {
        let plugin = ExcludePlugin::configure(&PluginConfig::new(EXCLUDE_RESOURCES).with_main("/m/p/**")).unwrap();
        let once = plugin.transform(&pool(), &LinkContext::new()).unwrap();
        let twice = plugin.transform(&once, &LinkContext::new()).unwrap();
        assert_eq!(paths(&once), paths(&twice));
    }

    #[test]
    fn test_exclude_files() {
        let plugin = ExcludeFilesPlugin::configure(&PluginConfig::new(EXCLUDE_FILES).with_main("*.txt,*.so")).unwrap();
        let out = plugin.transform(&pool(), &LinkContext::new()).unwrap();
        assert_eq!(paths(&out), vec!["/m/p/A.class", "/m/p/notes.txt", "/m/bin/tool"]);
    }

    #[test]
    fn test_strip_native_commands() {
        let out = StripNativeCommandsPlugin.transform(&pool(), &LinkContext::new()).unwrap();
        assert!(!out.contains("/m/bin/tool"));
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn test_patterns_required() {
        let err = ExcludePlugin::configure(&PluginConfig::new(EXCLUDE_RESOURCES)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigurationError);
    }
}
