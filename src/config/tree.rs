//! The loaded module tree.

use std::collections::{BTreeMap, BTreeSet};

use crate::addrs::{ConfigResource, LocalProviderConfig, ModulePath, Provider, Resource};
use crate::diagnostics::SourceRange;
use crate::error::ConfigError;

use super::types::{
    ModuleCallBlock, ModuleFile, OutputBlock, ProviderBlock, ResourceBlock, VariableBlock,
};

/// One module of the configuration together with its children.
#[derive(Debug, Clone)]
pub struct Module {
    /// Static path of this module.
    pub path: ModulePath,
    /// File the module was loaded from.
    pub filename: String,
    /// Raw file text, kept for hashing.
    pub text: String,
    /// Parsed contents.
    pub file: ModuleFile,
    /// Child modules by call name.
    pub children: BTreeMap<String, Module>,
    /// Provider local names the calling module passes in explicitly.
    pub passed_providers: BTreeSet<String>,
    /// The subset of `passed_providers` passed with an instance key.
    pub keyed_providers: BTreeSet<String>,
}

impl Module {
    /// Looks up a resource or data source block.
    #[must_use]
    pub fn resource(&self, addr: &Resource) -> Option<&ResourceBlock> {
        self.file.resources.iter().find(|r| r.addr() == *addr)
    }

    /// Looks up a module call.
    #[must_use]
    pub fn module_call(&self, name: &str) -> Option<&ModuleCallBlock> {
        self.file.modules.iter().find(|m| m.name == name)
    }

    /// Looks up a variable declaration.
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&VariableBlock> {
        self.file.variables.iter().find(|v| v.name == name)
    }

    /// Looks up an output.
    #[must_use]
    pub fn output(&self, name: &str) -> Option<&OutputBlock> {
        self.file.outputs.iter().find(|o| o.name == name)
    }

    /// Looks up a provider configuration block.
    #[must_use]
    pub fn provider_block(&self, local: &LocalProviderConfig) -> Option<&ProviderBlock> {
        self.file
            .providers
            .iter()
            .find(|p| p.name == local.local_name && p.alias == local.alias)
    }

    /// Resolves a provider local name to its source address.
    ///
    /// Names missing from `required_providers` map to the default namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the declared source is malformed.
    pub fn provider_for_local_name(&self, local_name: &str) -> Result<Provider, ConfigError> {
        match self.file.required_providers.get(local_name) {
            Some(required) => required.source.parse(),
            None => Ok(Provider::default_for(local_name)),
        }
    }

    /// The provider configuration a resource block uses.
    ///
    /// # Errors
    ///
    /// Returns an error if the `provider` argument is malformed.
    pub fn resource_provider_config(
        &self,
        block: &ResourceBlock,
    ) -> Result<LocalProviderConfig, ConfigError> {
        match &block.provider {
            Some(text) => text.parse(),
            None => Ok(LocalProviderConfig::new(block.addr().implied_provider(), None)),
        }
    }

    /// Source range of a declaration inside this module's file.
    #[must_use]
    pub fn range(&self, path: impl Into<String>) -> SourceRange {
        SourceRange {
            filename: self.filename.clone(),
            path: path.into(),
        }
    }

    fn walk<'a>(&'a self, out: &mut Vec<&'a Self>) {
        out.push(self);
        for child in self.children.values() {
            child.walk(out);
        }
    }
}

/// A fully loaded configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// The root module.
    pub root: Module,
}

impl Config {
    /// Wraps a root module.
    #[must_use]
    pub const fn new(root: Module) -> Self {
        Self { root }
    }

    /// Looks up a module by static path.
    #[must_use]
    pub fn module(&self, path: &ModulePath) -> Option<&Module> {
        let mut current = &self.root;
        for name in path.steps() {
            current = current.children.get(name)?;
        }
        Some(current)
    }

    /// Every module, parents before children.
    #[must_use]
    pub fn modules(&self) -> Vec<&Module> {
        let mut out = Vec::new();
        self.root.walk(&mut out);
        out
    }

    /// Looks up a resource block by configuration address.
    #[must_use]
    pub fn resource(&self, addr: &ConfigResource) -> Option<&ResourceBlock> {
        self.module(&addr.module)?.resource(&addr.resource)
    }

    /// Every resource block with its address.
    #[must_use]
    pub fn resources(&self) -> Vec<(ConfigResource, &ResourceBlock)> {
        self.modules()
            .into_iter()
            .flat_map(|module| {
                module
                    .file
                    .resources
                    .iter()
                    .map(move |block| (block.addr().in_module(module.path.clone()), block))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;

    fn config() -> Config {
        ConfigParser::new()
            .with_source(
                "main.yaml",
                r#"
required_providers:
  test:
    source: hashicorp/test
resources:
  - type: test_instance
    name: a
  - type: test_instance
    name: b
    provider: test.east
modules:
  - name: child
    source: child.yaml
"#,
            )
            .with_source(
                "child.yaml",
                r"
resources:
  - type: test_instance
    name: c
",
            )
            .load_file("main.yaml")
            .expect("load")
    }

    #[test]
    fn test_module_lookup() {
        let config = config();
        let child = config.module(&ModulePath::root().child("child")).expect("child");
        assert_eq!(child.file.resources.len(), 1);
        assert!(config.module(&ModulePath::root().child("missing")).is_none());
        assert_eq!(config.modules().len(), 2);
        assert_eq!(config.resources().len(), 3);
    }

    #[test]
    fn test_provider_resolution() {
        let config = config();
        let root = &config.root;
        assert_eq!(
            root.provider_for_local_name("test").expect("fqn"),
            Provider::new("hashicorp", "test")
        );
        assert_eq!(
            root.provider_for_local_name("other").expect("fqn"),
            Provider::default_for("other")
        );

        let b = root.resource(&Resource::managed("test_instance", "b")).expect("b");
        let local = root.resource_provider_config(b).expect("local");
        assert_eq!(local.to_string(), "test.east");

        let a = root.resource(&Resource::managed("test_instance", "a")).expect("a");
        assert_eq!(root.resource_provider_config(a).expect("local").to_string(), "test");
    }
}
