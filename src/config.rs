//! Plugin options: a flat map from option name to string value. The value
//! stored under the plugin's own name is its main argument.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginConfig {
    plugin: String,
    options: BTreeMap<String, String>,
}

impl PluginConfig {
    pub fn new(plugin: &str) -> Self {
        PluginConfig { plugin: plugin.to_owned(), options: BTreeMap::new() }
    }

    /// Parses a command-line style argument, `<main>[:<key>=<value>]*`, for
    /// the named plugin. An empty argument sets no main value.
    pub fn parse(plugin: &str, argument: &str) -> Result<Self> {
        let mut config = PluginConfig::new(plugin);
        let mut parts = argument.split(':');
        if let Some(main) = parts.next() {
            if !main.is_empty() {
                config.set(plugin, main);
            }
        }
        for part in parts {
            match part.find('=') {
                Some(i) if i > 0 => config.set(&part[..i], &part[i + 1..]),
                _ => return Err(Error::config(plugin, format!("expected <key>=<value>, found {:?}", part))),
            }
        }
        Ok(config)
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.set(key, value);
        self
    }

    /// Sets the main argument.
    pub fn with_main(self, value: &str) -> Self {
        let plugin = self.plugin.clone();
        self.with(&plugin, value)
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.options.insert(key.to_owned(), value.to_owned());
    }

    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    pub fn main(&self) -> Option<&str> {
        self.get(&self.plugin)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| Error::config(&self.plugin, format!("missing option {}", key)))
    }

    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool> {
        match self.get(key) {
            None => Ok(default),
            Some("true") => Ok(true),
            Some("false") => Ok(false),
            Some(other) => Err(Error::config(&self.plugin, format!("{} must be true or false, not {:?}", key, other))),
        }
    }

    /// Options other than the main argument.
    pub fn extra_options(&self) -> impl Iterator<Item = (&str, &str)> {
        let plugin = self.plugin.as_str();
        self.options.iter().filter(move |(k, _)| *k != plugin).map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Splits a comma separated list, trimming entries and dropping empty ones.
pub fn parse_list(value: &str) -> Vec<String> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned).collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_parse_argument() {
        let config = PluginConfig::parse("compress", "2:filter=**.class").unwrap();
        assert_eq!(config.main(), Some("2"));
        assert_eq!(config.get("filter"), Some("**.class"));
        assert_eq!(config.extra_options().collect::<Vec<_>>(), vec![("filter", "**.class")]);
        assert!(PluginConfig::parse("compress", "").unwrap().main().is_none());
        assert_eq!(PluginConfig::parse("compress", "2:oops").unwrap_err().kind(), ErrorKind::ConfigurationError);
    }

    #[test]
    fn test_typed_getters() {
        let config = PluginConfig::new("system-modules").with("dedup", "false").with("bad", "yes");
        assert_eq!(config.get_bool("dedup", true).unwrap(), false);
        assert_eq!(config.get_bool("absent", true).unwrap(), true);
        assert!(config.get_bool("bad", true).is_err());
        assert!(config.require("absent").is_err());
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(parse_list(" a, b ,,c "), vec!["a", "b", "c"]);
        assert!(parse_list("").is_empty());
    }
}
