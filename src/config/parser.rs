//! Configuration parser for loading module trees.
//!
//! The root module file names its children through `modules[].source`, and
//! each child path is resolved relative to the file that calls it.

use crate::addrs::ModulePath;
use crate::error::{ConfigError, EngineError, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::tree::{Config, Module};
use super::types::ModuleFile;

/// Deepest allowed chain of module calls.
pub const MAX_MODULE_DEPTH: usize = 32;

/// Configuration parser for loading module trees.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths.
    base_path: Option<PathBuf>,
    /// In-memory file contents, used instead of the filesystem.
    sources: HashMap<PathBuf, String>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Serves a file from memory instead of the filesystem.
    #[must_use]
    pub fn with_source(mut self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.sources.insert(path.into(), content.into());
        self
    }

    /// Loads the module tree rooted at a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if any module file cannot be read or parsed, or if
    /// module calls nest deeper than [`MAX_MODULE_DEPTH`].
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());
        let root = self.load_module(path, ModulePath::root())?;
        debug!("Loaded {} module(s)", count_modules(&root));
        Ok(Config::new(root))
    }

    fn load_module(&self, path: &Path, module_path: ModulePath) -> Result<Module> {
        if module_path.depth() > MAX_MODULE_DEPTH {
            return Err(EngineError::validation(
                format!("module calls nest deeper than {MAX_MODULE_DEPTH} levels"),
                Some(module_path.to_string()),
            ));
        }

        let text = self.read(path)?;
        let file = self.parse_yaml(&text, Some(path))?;
        debug!("Parsed module {:?} from {}", module_path.to_string(), path.display());

        let dir = path.parent().unwrap_or_else(|| Path::new(""));
        let mut children = BTreeMap::new();
        for call in &file.modules {
            let child_path = dir.join(&call.source);
            let mut child = self.load_module(&child_path, module_path.child(&call.name))?;
            child.passed_providers = call.providers.keys().cloned().collect();
            child.keyed_providers = call
                .providers
                .iter()
                .filter(|(_, passing)| passing.key().is_some())
                .map(|(name, _)| name.clone())
                .collect();
            children.insert(call.name.clone(), child);
        }

        Ok(Module {
            path: module_path,
            filename: path.display().to_string(),
            text,
            file,
            children,
            passed_providers: BTreeSet::new(),
            keyed_providers: BTreeSet::new(),
        })
    }

    fn read(&self, path: &Path) -> Result<String> {
        if let Some(content) = self.sources.get(path) {
            return Ok(content.clone());
        }

        let resolved = match &self.base_path {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        };
        if !resolved.exists() {
            return Err(EngineError::Config(ConfigError::FileNotFound { path: resolved }));
        }

        std::fs::read_to_string(&resolved).map_err(|e| {
            EngineError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(resolved.display().to_string()),
            })
        })
    }

    /// Parses one module file from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<ModuleFile> {
        if content.trim().is_empty() {
            return Ok(ModuleFile::default());
        }
        serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            EngineError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })
    }
}

fn count_modules(module: &Module) -> usize {
    1 + module.children.values().map(count_modules).sum::<usize>()
}

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["main.yaml", "main.yml", "graphform.yaml"];

/// Finds the configuration file in the current directory or parent directories.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(EngineError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}
