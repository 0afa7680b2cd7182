//! Link plugins and the capabilities they are composed of.
//!
//! A plugin is configured once, from its `PluginConfig`, before any artifact
//! is read. What it can do afterwards is given by the traits it implements:
//! every pool stage is a `Transformer`; some also need to see the whole input
//! first and implement `Previsitor`; a `PostProcessor` runs against the
//! written image instead of the pool. `Stage` is the closed set of these
//! combinations that the pipeline drives.

use std::fmt;
use std::path::Path;

use crate::config::PluginConfig;
use crate::error::{Error, Result};
use crate::image::Image;
use crate::pool::Pool;

pub mod class_for_name;
pub mod compress;
pub mod context;
pub mod exclude;
pub mod exclude_vm;
pub mod order;
pub mod release_info;
pub mod strip_debug;
pub mod system_modules;
pub mod verify_image;

pub use self::context::LinkContext;

/// The conventional position of a plugin in the chain, earliest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Filter,
    Transformer,
    ModuleInfo,
    Sorter,
    Compressor,
    Verifier,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match *self {
            Category::Filter => "filter",
            Category::Transformer => "transformer",
            Category::ModuleInfo => "module-info transformer",
            Category::Sorter => "sorter",
            Category::Compressor => "compressor",
            Category::Verifier => "verifier",
        };
        f.write_str(name)
    }
}

pub trait Plugin {
    fn name(&self) -> &'static str;
    fn category(&self) -> Category;
}

pub trait Transformer: Plugin {
    /// Produces the next pool. `input` is never modified.
    fn transform(&self, input: &Pool, context: &LinkContext) -> Result<Pool>;
}

pub trait Previsitor {
    /// Reads the whole input before any stage runs, recording what later
    /// stages need in `context`.
    fn previsit(&self, input: &Pool, context: &mut LinkContext) -> Result<()>;
}

pub trait PostProcessor: Plugin {
    fn process(&self, image: &Image) -> Result<()>;
}

pub trait PrevisitingTransformer: Transformer + Previsitor {}

impl<T: Transformer + Previsitor> PrevisitingTransformer for T {}

pub enum Stage {
    Transform(Box<dyn Transformer>),
    PrevisitTransform(Box<dyn PrevisitingTransformer>),
    PostProcess(Box<dyn PostProcessor>),
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match *self {
            Stage::Transform(ref p) => p.name(),
            Stage::PrevisitTransform(ref p) => p.name(),
            Stage::PostProcess(ref p) => p.name(),
        }
    }

    pub fn category(&self) -> Category {
        match *self {
            Stage::Transform(ref p) => p.category(),
            Stage::PrevisitTransform(ref p) => p.category(),
            Stage::PostProcess(ref p) => p.category(),
        }
    }

    /// Runs the previsit pass, if this stage has one.
    pub fn previsit(&self, input: &Pool, context: &mut LinkContext) -> Result<()> {
        match *self {
            Stage::PrevisitTransform(ref p) => p.previsit(input, context),
            _ => Ok(()),
        }
    }

    /// Transforms the pool. Post-processing stages pass it through.
    pub fn transform(&self, input: Pool, context: &LinkContext) -> Result<Pool> {
        match *self {
            Stage::Transform(ref p) => p.transform(&input, context),
            Stage::PrevisitTransform(ref p) => p.transform(&input, context),
            Stage::PostProcess(_) => Ok(input),
        }
    }

    pub fn post_process(&self, image: &Image) -> Result<()> {
        match *self {
            Stage::PostProcess(ref p) => p.process(image),
            _ => Ok(()),
        }
    }

    pub fn is_post_processor(&self) -> bool {
        match *self {
            Stage::PostProcess(_) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Stage({}, {})", self.name(), self.category())
    }
}

/// Names of every plugin `create` knows.
pub const PLUGIN_NAMES: &[&str] = &[
    exclude::EXCLUDE_RESOURCES,
    exclude::EXCLUDE_FILES,
    exclude::STRIP_NATIVE_COMMANDS,
    exclude_vm::NAME,
    strip_debug::NAME,
    class_for_name::NAME,
    release_info::NAME,
    system_modules::NAME,
    order::NAME,
    compress::NAME,
    verify_image::NAME,
];

/// Configures the plugin named by `config`.
pub fn create(config: &PluginConfig) -> Result<Stage> {
    let stage = match config.plugin() {
        exclude::EXCLUDE_RESOURCES => Stage::Transform(Box::new(exclude::ExcludePlugin::configure(config)?)),
        exclude::EXCLUDE_FILES => Stage::Transform(Box::new(exclude::ExcludeFilesPlugin::configure(config)?)),
        exclude::STRIP_NATIVE_COMMANDS => {
            Stage::Transform(Box::new(exclude::StripNativeCommandsPlugin::configure(config)?))
        }
        exclude_vm::NAME => Stage::Transform(Box::new(exclude_vm::ExcludeVmPlugin::configure(config)?)),
        strip_debug::NAME => Stage::Transform(Box::new(strip_debug::StripDebugPlugin::configure(config)?)),
        class_for_name::NAME => {
            Stage::PrevisitTransform(Box::new(class_for_name::ClassForNamePlugin::configure(config)?))
        }
        release_info::NAME => Stage::Transform(Box::new(release_info::ReleaseInfoPlugin::configure(config)?)),
        system_modules::NAME => {
            Stage::Transform(Box::new(system_modules::SystemModulesPlugin::configure(config)?))
        }
        order::NAME => Stage::Transform(Box::new(order::OrderResourcesPlugin::configure(config)?)),
        compress::NAME => Stage::PrevisitTransform(Box::new(compress::CompressPlugin::configure(config)?)),
        verify_image::NAME => Stage::PostProcess(Box::new(verify_image::VerifyImagePlugin::configure(config)?)),
        other => {
            return Err(Error::config(other, format!("unknown plugin; known plugins are {}", PLUGIN_NAMES.join(", "))))
        }
    };
    Ok(stage)
}

/// Reads a whole configuration file named by a plugin option.
pub(crate) fn read_option_file(plugin: &str, path: &Path) -> Result<String> {
    ::std::fs::read_to_string(path).map_err(|e| Error::config(plugin, format!("cannot read {}: {}", path.display(), e)))
}
