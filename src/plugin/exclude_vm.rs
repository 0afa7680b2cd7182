//! Keeps a single VM variant in `java.base` and rewrites `jvm.cfg` to match.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str;

use log::debug;

use super::{Category, LinkContext, Plugin, Transformer};
use crate::config::PluginConfig;
use crate::error::{Error, Result};
use crate::pool::Pool;

pub const NAME: &str = "vm";

pub const JVM_CFG: &str = "/java.base/lib/jvm.cfg";
const JVM_LIBRARIES: &[&str] = &["libjvm.so", "jvm.dll", "libjvm.dylib"];

/// VM variants, most efficient first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Variant {
    Server,
    Client,
    Minimal,
}

impl Variant {
    pub const ALL: [Variant; 3] = [Variant::Server, Variant::Client, Variant::Minimal];

    pub fn name(self) -> &'static str {
        match self {
            Variant::Server => "server",
            Variant::Client => "client",
            Variant::Minimal => "minimal",
        }
    }

    pub fn from_name(name: &str) -> Option<Variant> {
        Variant::ALL.iter().cloned().find(|v| v.name() == name)
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Selection {
    All,
    Only(Variant),
}

#[derive(Debug)]
pub struct ExcludeVmPlugin {
    selection: Selection,
}

impl ExcludeVmPlugin {
    pub fn configure(config: &PluginConfig) -> Result<Self> {
        let selection = match config.main().unwrap_or("all") {
            "all" => Selection::All,
            name => match Variant::from_name(name) {
                Some(v) => Selection::Only(v),
                None => {
                    return Err(Error::config(NAME, format!("unknown VM {:?}; expected client, server, minimal or all", name)))
                }
            },
        };
        Ok(ExcludeVmPlugin { selection })
    }
}

impl Plugin for ExcludeVmPlugin {
    fn name(&self) -> &'static str {
        NAME
    }

    fn category(&self) -> Category {
        Category::Filter
    }
}

/// Finds the VM libraries of `java.base`, by variant.
fn vm_libraries(input: &Pool) -> BTreeMap<Variant, Vec<String>> {
    let mut found: BTreeMap<Variant, Vec<String>> = BTreeMap::new();
    let java_base = match input.module("java.base") {
        Some(m) => m,
        None => return found,
    };
    for artifact in java_base.entries() {
        let parts: Vec<&str> = artifact.relative_path().split('/').collect();
        if let ["lib", variant, library] = parts[..] {
            if let Some(variant) = Variant::from_name(variant) {
                if JVM_LIBRARIES.contains(&library) {
                    found.entry(variant).or_insert_with(Vec::new).push(artifact.path().to_owned());
                }
            }
        }
    }
    found
}

impl Transformer for ExcludeVmPlugin {
    fn transform(&self, input: &Pool, _context: &LinkContext) -> Result<Pool> {
        let selected = match self.selection {
            Selection::All => return Ok(input.clone()),
            Selection::Only(v) => v,
        };
        let libraries = vm_libraries(input);
        if !libraries.contains_key(&selected) {
            return Err(Error::Invariant(format!("selected VM {} does not exist in java.base", selected)));
        }
        let removed_variants: Vec<Variant> = libraries.keys().cloned().filter(|&v| v != selected).collect();
        let removed_paths: BTreeSet<&str> = removed_variants
            .iter()
            .flat_map(|v| libraries[v].iter().map(String::as_str))
            .collect();
        let cfg = input
            .get(JVM_CFG)
            .ok_or_else(|| Error::Invariant(format!("{} is missing", JVM_CFG)))?;
        let new_cfg = jvm_cfg(cfg.content(), &[selected], &removed_variants)?;
        debug!("keeping VM {}, removing {:?}", selected, removed_variants);

        let mut out = input.builder();
        input.transform_and_copy(
            |artifact| {
                if removed_paths.contains(artifact.path()) {
                    Ok(None)
                } else if artifact.path() == JVM_CFG {
                    Ok(Some(artifact.with_content(new_cfg.clone())))
                } else {
                    Ok(Some(artifact.clone()))
                }
            },
            &mut out,
        )?;
        Ok(out.build())
    }
}

/// Rewrites a `jvm.cfg`: comment lines are kept, followed by the kept
/// variants in order of efficiency and then the removed variants as aliases
/// of the best kept one.
pub fn jvm_cfg(original: &[u8], kept: &[Variant], removed: &[Variant]) -> Result<Vec<u8>> {
    let text = str::from_utf8(original).map_err(|e| Error::MalformedInput(format!("{}: {}", JVM_CFG, e)))?;
    let mut kept = kept.to_vec();
    kept.sort();
    let mut removed = removed.to_vec();
    removed.sort();
    let best = kept.first().ok_or_else(|| Error::Invariant("no VM left in the image".to_owned()))?;

    let mut out = String::new();
    for line in text.lines().filter(|l| l.starts_with('#')) {
        out.push_str(line);
        out.push('\n');
    }
    for v in &kept {
        out.push_str(&format!("-{} KNOWN\n", v));
    }
    for v in &removed {
        out.push_str(&format!("-{} ALIASED_TO -{}\n", v, best));
    }
    Ok(out.into_bytes())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::ErrorKind;
    use crate::pool::{Artifact, ArtifactKind, PoolBuilder};

    const CFG: &str = "# comment\n-server KNOWN\n-client IGNORE\n";

    fn pool(variants: &[&str]) -> Pool {
        let mut builder = PoolBuilder::new();
        for v in variants {
            let path = format!("/java.base/lib/{}/libjvm.so", v);
            builder.add(Artifact::new(&path, ArtifactKind::NativeLib, vec![0u8]).unwrap()).unwrap();
        }
        builder.add(Artifact::new(JVM_CFG, ArtifactKind::NativeLib, CFG.as_bytes().to_vec()).unwrap()).unwrap();
        builder.build()
    }

    fn run(option: &str, input: &Pool) -> Result<Pool> {
        let plugin = ExcludeVmPlugin::configure(&PluginConfig::new(NAME).with_main(option))?;
        plugin.transform(input, &LinkContext::new())
    }

    #[test]
    fn test_keeps_selected_variant() {
        let out = run("client", &pool(&["server", "client", "minimal"])).unwrap();
        assert!(out.contains("/java.base/lib/client/libjvm.so"));
        assert!(!out.contains("/java.base/lib/server/libjvm.so"));
        assert!(!out.contains("/java.base/lib/minimal/libjvm.so"));
        let cfg = str::from_utf8(out.get(JVM_CFG).unwrap().content()).unwrap().to_owned();
        assert_eq!(cfg, "# comment\n-client KNOWN\n-server ALIASED_TO -client\n-minimal ALIASED_TO -client\n");
    }

    #[test]
    fn test_cfg_order() {
        let cfg = jvm_cfg(b"", &[Variant::Minimal, Variant::Server], &[Variant::Client]).unwrap();
        assert_eq!(
            String::from_utf8(cfg).unwrap(),
            "-server KNOWN\n-minimal KNOWN\n-client ALIASED_TO -server\n"
        );
    }

    #[test]
    fn test_all_is_unchanged() {
        let input = pool(&["server", "client"]);
        let out = run("all", &input).unwrap();
        assert_eq!(out.len(), input.len());
        assert_eq!(out.get(JVM_CFG).unwrap().content(), CFG.as_bytes());
    }

    #[test]
    fn test_missing_variant() {
        let err = run("minimal", &pool(&["server"])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
        let err = run("fast", &pool(&["server"])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigurationError);
    }
}
