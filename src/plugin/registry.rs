//! Plugin registry mapping names to factories.

use super::{InputPlugin, OutputPlugin, ProcessorPlugin};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::RwLock;

type InputFactory = Box<dyn Fn() -> Box<dyn InputPlugin> + Send + Sync>;
type ProcessorFactory = Box<dyn Fn() -> Box<dyn ProcessorPlugin> + Send + Sync>;
type OutputFactory = Box<dyn Fn() -> Box<dyn OutputPlugin> + Send + Sync>;

/// Registry of plugin factories, indexed by name and role.
///
/// The registry provides a central place to:
/// - Register plugin implementations under a name
/// - Query which plugins are available
/// - Create fresh plugin instances for a pipeline run
///
/// One name may be registered in several roles (e.g. `file` is both an
/// input and an output). The same registry can serve any number of
/// pipeline runs; factories are called once per run.
pub struct PluginRegistry {
    inputs: RwLock<HashMap<String, InputFactory>>,
    processors: RwLock<HashMap<String, ProcessorFactory>>,
    outputs: RwLock<HashMap<String, OutputFactory>>,
}

impl PluginRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            inputs: RwLock::new(HashMap::new()),
            processors: RwLock::new(HashMap::new()),
            outputs: RwLock::new(HashMap::new()),
        }
    }

    /// Create a registry pre-loaded with the built-in plugins.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        crate::plugins::register_builtins(&registry);
        registry
    }

    /// Register an input plugin factory under a name.
    pub fn register_input<F, P>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> P + Send + Sync + 'static,
        P: InputPlugin + 'static,
    {
        let mut inputs = self.inputs.write().unwrap();
        inputs.insert(name.into(), Box::new(move || Box::new(factory())));
    }

    /// Register a processor plugin factory under a name.
    pub fn register_processor<F, P>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> P + Send + Sync + 'static,
        P: ProcessorPlugin + 'static,
    {
        let mut processors = self.processors.write().unwrap();
        processors.insert(name.into(), Box::new(move || Box::new(factory())));
    }

    /// Register an output plugin factory under a name.
    pub fn register_output<F, P>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> P + Send + Sync + 'static,
        P: OutputPlugin + 'static,
    {
        let mut outputs = self.outputs.write().unwrap();
        outputs.insert(name.into(), Box::new(move || Box::new(factory())));
    }

    /// Check if an input plugin is available.
    pub fn has_input(&self, name: &str) -> bool {
        self.inputs.read().unwrap().contains_key(name)
    }

    /// Check if a processor plugin is available.
    pub fn has_processor(&self, name: &str) -> bool {
        self.processors.read().unwrap().contains_key(name)
    }

    /// Check if an output plugin is available.
    pub fn has_output(&self, name: &str) -> bool {
        self.outputs.read().unwrap().contains_key(name)
    }

    /// List all registered input plugin names.
    pub fn list_inputs(&self) -> Vec<String> {
        self.inputs.read().unwrap().keys().cloned().collect()
    }

    /// List all registered processor plugin names.
    pub fn list_processors(&self) -> Vec<String> {
        self.processors.read().unwrap().keys().cloned().collect()
    }

    /// List all registered output plugin names.
    pub fn list_outputs(&self) -> Vec<String> {
        self.outputs.read().unwrap().keys().cloned().collect()
    }

    /// Create an input plugin instance by name.
    pub fn create_input(&self, name: &str) -> Result<Box<dyn InputPlugin>> {
        let inputs = self.inputs.read().unwrap();
        inputs
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| Error::PluginNotFound(name.to_string()))
    }

    /// Create a processor plugin instance by name.
    pub fn create_processor(&self, name: &str) -> Result<Box<dyn ProcessorPlugin>> {
        let processors = self.processors.read().unwrap();
        processors
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| Error::PluginNotFound(name.to_string()))
    }

    /// Create an output plugin instance by name.
    pub fn create_output(&self, name: &str) -> Result<Box<dyn OutputPlugin>> {
        let outputs = self.outputs.read().unwrap();
        outputs
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| Error::PluginNotFound(name.to_string()))
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("inputs", &self.inputs.read().unwrap().len())
            .field("processors", &self.processors.read().unwrap().len())
            .field("outputs", &self.outputs.read().unwrap().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::{DropOutput, NullInput, PassThrough};

    #[test]
    fn test_registry_creation() {
        let registry = PluginRegistry::new();
        assert!(registry.list_inputs().is_empty());
        assert!(registry.list_processors().is_empty());
        assert!(registry.list_outputs().is_empty());
    }

    #[test]
    fn test_register_and_create() {
        let registry = PluginRegistry::new();
        registry.register_input("null", || NullInput::new(10));
        registry.register_processor("pass", PassThrough::new);
        registry.register_output("drop", DropOutput::new);

        assert!(registry.has_input("null"));
        assert!(registry.has_processor("pass"));
        assert!(registry.has_output("drop"));

        let plugin = registry.create_input("null").unwrap();
        assert_eq!(plugin.name(), "null");
    }

    #[test]
    fn test_create_not_found() {
        let registry = PluginRegistry::new();
        let result = registry.create_output("nonexistent");
        assert!(matches!(result, Err(Error::PluginNotFound(_))));
    }

    #[test]
    fn test_roles_are_independent() {
        let registry = PluginRegistry::new();
        registry.register_processor("pass", PassThrough::new);

        // Registered as processor only; other roles must not see it.
        assert!(!registry.has_input("pass"));
        assert!(!registry.has_output("pass"));
        assert!(matches!(
            registry.create_input("pass"),
            Err(Error::PluginNotFound(_))
        ));
    }

    #[test]
    fn test_builtins_present() {
        let registry = PluginRegistry::with_builtins();
        assert!(registry.has_input("null"));
        assert!(registry.has_input("file"));
        assert!(registry.has_processor("pass"));
        assert!(registry.has_processor("filter-null"));
        assert!(registry.has_output("file"));
        assert!(registry.has_output("drop"));
    }
}
