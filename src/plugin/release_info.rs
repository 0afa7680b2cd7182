//! Edits the properties written to the image's `release` file.

use std::collections::BTreeMap;
use std::path::Path;

use log::debug;

use super::{read_option_file, Category, LinkContext, Plugin, Transformer};
use crate::config::{parse_list, PluginConfig};
use crate::error::{Error, Result};
use crate::pool::Pool;

pub const NAME: &str = "release-info";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Action {
    /// Sets properties, replacing existing values.
    Add(BTreeMap<String, String>),
    Delete(Vec<String>),
}

#[derive(Debug)]
pub struct ReleaseInfoPlugin {
    action: Action,
}

impl ReleaseInfoPlugin {
    pub fn configure(config: &PluginConfig) -> Result<Self> {
        let action = match config.main() {
            Some("add") => {
                Action::Add(config.extra_options().map(|(k, v)| (k.to_owned(), v.to_owned())).collect())
            }
            Some("del") => {
                let keys = parse_list(config.get("keys").ok_or_else(|| Error::config(NAME, "del requires keys=<list>"))?);
                Action::Delete(keys)
            }
            Some(file) => Action::Add(parse_properties(&read_option_file(NAME, Path::new(file))?)?),
            None => return Err(Error::config(NAME, "expected add, del or a properties file")),
        };
        Ok(ReleaseInfoPlugin { action })
    }
}

/// Parses `KEY=value` lines. Blank lines and lines starting with `#` are
/// ignored.
pub fn parse_properties(text: &str) -> Result<BTreeMap<String, String>> {
    let mut properties = BTreeMap::new();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty() && !l.starts_with('#')) {
        match line.find('=') {
            Some(i) if i > 0 => {
                properties.insert(line[..i].trim().to_owned(), line[i + 1..].trim().to_owned());
            }
            _ => return Err(Error::config(NAME, format!("expected KEY=value, found {:?}", line))),
        }
    }
    Ok(properties)
}

impl Plugin for ReleaseInfoPlugin {
    fn name(&self) -> &'static str {
        NAME
    }

    fn category(&self) -> Category {
        Category::Transformer
    }
}

impl Transformer for ReleaseInfoPlugin {
    fn transform(&self, input: &Pool, _context: &LinkContext) -> Result<Pool> {
        let mut out = input.builder();
        input.transform_and_copy(|a| Ok(Some(a.clone())), &mut out)?;
        let release = out.release_properties_mut();
        match self.action {
            Action::Add(ref properties) => {
                for (k, v) in properties {
                    debug!("release: {}={}", k, v);
                    release.insert(k.clone(), v.clone());
                }
            }
            Action::Delete(ref keys) => {
                for k in keys {
                    if release.remove(k).is_some() {
                        debug!("release: removed {}", k);
                    }
                }
            }
        }
        Ok(out.build())
    }
}
