//! Reorders classes and resources so that the ones needed first are stored
//! together at the front of the image.

use std::collections::HashMap;
use std::path::Path;

use log::debug;

use super::{read_option_file, Category, LinkContext, Plugin, Transformer};
use crate::config::{parse_list, PluginConfig};
use crate::error::{Error, Result};
use crate::pool::filter::ResourceFilter;
use crate::pool::{Artifact, ArtifactKind, Pool};

pub const NAME: &str = "order-resources";

/// The position of an artifact is the ordinal of the first rule that
/// matches it. `@file` lists give each listed class its own ordinal.
#[derive(Debug)]
pub struct OrderResourcesPlugin {
    listed: HashMap<String, usize>,
    filters: Vec<(usize, ResourceFilter)>,
}

impl OrderResourcesPlugin {
    pub fn configure(config: &PluginConfig) -> Result<Self> {
        let value = config.main().ok_or_else(|| Error::config(NAME, "a list of patterns is required"))?;
        let mut plugin = OrderResourcesPlugin { listed: HashMap::new(), filters: Vec::new() };
        let mut ordinal = 0;
        for item in parse_list(value) {
            if item.starts_with('@') {
                let text = read_option_file(NAME, Path::new(&item[1..]))?;
                for line in text.lines().map(str::trim).filter(|l| !l.is_empty() && !l.starts_with('#')) {
                    plugin.listed.entry(format!("{}.class", line)).or_insert(ordinal);
                    ordinal += 1;
                }
            } else {
                plugin.filters.push((ordinal, ResourceFilter::include(NAME, &item)?));
                ordinal += 1;
            }
        }
        Ok(plugin)
    }

    fn ordinal(&self, artifact: &Artifact) -> Option<usize> {
        if let Some(&ordinal) = self.listed.get(artifact.relative_path()) {
            return Some(ordinal);
        }
        self.filters.iter().find(|(_, f)| f.test(artifact.path())).map(|&(ordinal, _)| ordinal)
    }
}

impl Plugin for OrderResourcesPlugin {
    fn name(&self) -> &'static str {
        NAME
    }

    fn category(&self) -> Category {
        Category::Sorter
    }
}

impl Transformer for OrderResourcesPlugin {
    fn transform(&self, input: &Pool, _context: &LinkContext) -> Result<Pool> {
        let mut matched: Vec<(usize, &Artifact)> = Vec::new();
        let mut unmatched = Vec::new();
        let mut others = Vec::new();
        for artifact in input.entries() {
            if artifact.kind() != ArtifactKind::ClassOrResource {
                others.push(artifact);
            } else if let Some(ordinal) = self.ordinal(artifact) {
                matched.push((ordinal, artifact));
            } else {
                unmatched.push(artifact);
            }
        }
        matched.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.path().cmp(b.1.path())));
        debug!("{} of {} resources ordered", matched.len(), matched.len() + unmatched.len());

        let mut out = input.builder();
        let ordered = matched.into_iter().map(|(_, a)| a).chain(unmatched).chain(others);
        for artifact in ordered {
            out.add(artifact.clone())?;
        }
        Ok(out.build())
    }
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use super::*;
    use crate::pool::PoolBuilder;

    fn pool(paths: &[(&str, ArtifactKind)]) -> Pool {
        let mut builder = PoolBuilder::new();
        for &(path, kind) in paths {
            builder.add(Artifact::new(path, kind, Vec::<u8>::new()).unwrap()).unwrap();
        }
        builder.build()
    }

    fn order(option: &str, input: &Pool) -> Vec<String> {
        let plugin = OrderResourcesPlugin::configure(&PluginConfig::new(NAME).with_main(option)).unwrap();
        let out = plugin.transform(input, &LinkContext::new()).unwrap();
        out.entries().map(|a| a.path().to_owned()).collect()
    }

    #[test]
    fn test_rank_then_path_then_pool_order() {
        let input = pool(&[
            ("/m/z/Late.class", ArtifactKind::ClassOrResource),
            ("/m/lib/libx.so", ArtifactKind::NativeLib),
            ("/m/b/B.class", ArtifactKind::ClassOrResource),
            ("/m/a/A.class", ArtifactKind::ClassOrResource),
            ("/m/y/data.txt", ArtifactKind::ClassOrResource),
            ("/m/first.txt", ArtifactKind::ClassOrResource),
        ]);
        let got = order("*.txt,/m/a/**,/m/b/**", &input);
        assert_eq!(
            got,
            vec![
                "/m/first.txt",
                "/m/y/data.txt",
                "/m/a/A.class",
                "/m/b/B.class",
                "/m/z/Late.class",
                "/m/lib/libx.so",
            ]
        );
    }

    #[test]
    fn test_sort_is_stable() {
        let input = pool(&[
            ("/m/c.txt", ArtifactKind::ClassOrResource),
            ("/m/b.class", ArtifactKind::ClassOrResource),
            ("/m/a.class", ArtifactKind::ClassOrResource),
        ]);
        let once = order("*.txt", &input);
        assert_eq!(once, vec!["/m/c.txt", "/m/b.class", "/m/a.class"]);
        let reordered: Vec<(&str, ArtifactKind)> =
            once.iter().map(|p| (p.as_str(), ArtifactKind::ClassOrResource)).collect();
        let again = order("*.txt", &pool(&reordered));
        assert_eq!(once, again);
    }

    #[test]
    fn test_class_list_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# startup classes\np/Second\np/First").unwrap();
        let input = pool(&[
            ("/m/p/First.class", ArtifactKind::ClassOrResource),
            ("/m/p/Other.class", ArtifactKind::ClassOrResource),
            ("/m/p/Second.class", ArtifactKind::ClassOrResource),
        ]);
        let got = order(&format!("@{}", file.path().display()), &input);
        assert_eq!(got, vec!["/m/p/Second.class", "/m/p/First.class", "/m/p/Other.class"]);
    }
}
