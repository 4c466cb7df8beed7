//! Name → constructor table for pipeline components.
//!
//! Names are resolved eagerly in [`ComponentRegistry::build`]: an unknown
//! name fails before any component is constructed or any audio is read.

use tracing::debug;

use crate::config::EnhancementConfig;
use crate::error::{Result, SubtideError};

use super::components::{RefineEnhancer, SplitEnhancer, VadEnhancer};
use super::{Enhancer, EnhancementPipeline, SharedResources};

type Constructor =
    Box<dyn Fn(&EnhancementConfig, &SharedResources) -> Box<dyn Enhancer> + Send + Sync>;

pub struct ComponentRegistry {
    /// Registration order is listing order.
    constructors: Vec<(&'static str, Constructor)>,
    shared: SharedResources,
}

impl ComponentRegistry {
    /// An empty registry around `shared`.
    pub fn new(shared: SharedResources) -> Self {
        Self {
            constructors: Vec::new(),
            shared,
        }
    }

    /// `vad`, `refine` and `split` over fresh shared resources.
    pub fn with_builtins() -> Self {
        Self::with_builtins_shared(SharedResources::new())
    }

    pub fn with_builtins_shared(shared: SharedResources) -> Self {
        let mut registry = Self::new(shared);
        registry.register("vad", |cfg, shared| {
            Box::new(VadEnhancer::from_config(&cfg.vad, shared))
        });
        registry.register("refine", |cfg, shared| {
            Box::new(RefineEnhancer::from_config(&cfg.refine, shared))
        });
        registry.register("split", |cfg, _| Box::new(SplitEnhancer::from_config(&cfg.split)));
        registry
    }

    /// Add or replace a constructor.
    pub fn register<F>(&mut self, name: &'static str, constructor: F)
    where
        F: Fn(&EnhancementConfig, &SharedResources) -> Box<dyn Enhancer> + Send + Sync + 'static,
    {
        let constructor: Constructor = Box::new(constructor);
        match self.constructors.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = constructor,
            None => self.constructors.push((name, constructor)),
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.constructors.iter().map(|(n, _)| *n).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.iter().any(|(n, _)| *n == name)
    }

    pub fn shared(&self) -> &SharedResources {
        &self.shared
    }

    /// Construct one component by name.
    pub fn create(&self, name: &str, cfg: &EnhancementConfig) -> Result<Box<dyn Enhancer>> {
        self.constructors
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, ctor)| ctor(cfg, &self.shared))
            .ok_or_else(|| SubtideError::UnknownComponent {
                name: name.to_string(),
                known: self.names().join(", "),
            })
    }

    /// Build the pipeline named by `cfg.pipeline`.
    pub fn build(&self, cfg: &EnhancementConfig) -> Result<EnhancementPipeline> {
        let names = cfg.component_names();
        if let Some(unknown) = names.iter().find(|n| !self.contains(n)) {
            return Err(SubtideError::UnknownComponent {
                name: unknown.clone(),
                known: self.names().join(", "),
            });
        }

        let components = names
            .iter()
            .map(|name| self.create(name, cfg))
            .collect::<Result<Vec<_>>>()?;
        debug!(components = ?names, "pipeline built");
        Ok(EnhancementPipeline::new(components))
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("components", &self.names())
            .field("shared", &self.shared)
            .finish()
    }
}
