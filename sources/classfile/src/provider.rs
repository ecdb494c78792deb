use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;
use thiserror::Error;
use tracing::debug;

use crate::classfile::ClassDescriptor;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("class {0} could not be found")]
    NotFound(String),

    #[error("failed to read class {name}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Resolves class names to decoded descriptors. Implementations are shared
/// between every VM thread.
pub trait DescriptorProvider: Send + Sync {
    fn resolve(&self, name: &str) -> Result<Arc<ClassDescriptor>, ProviderError>;
}

/// Serves descriptors registered ahead of time
#[derive(Debug, Default)]
pub struct MemoryProvider {
    classes: RwLock<HashMap<String, Arc<ClassDescriptor>>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_classes(classes: impl IntoIterator<Item = ClassDescriptor>) -> Self {
        let provider = Self::new();
        for class in classes {
            provider.insert(class);
        }

        provider
    }

    pub fn insert(&self, class: ClassDescriptor) {
        self.classes.write().insert(class.name.clone(), Arc::new(class));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.read().contains_key(name)
    }
}

impl DescriptorProvider for MemoryProvider {
    fn resolve(&self, name: &str) -> Result<Arc<ClassDescriptor>, ProviderError> {
        self.classes
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(name.to_string()))
    }
}

/// Tries each provider in order, like walking a class path.
/// `NotFound` moves on to the next provider, any other error stops the search.
#[derive(Default)]
pub struct ProviderChain {
    providers: Vec<Box<dyn DescriptorProvider>>,
}

impl ProviderChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, provider: impl DescriptorProvider + 'static) {
        self.providers.push(Box::new(provider));
    }
}

impl DescriptorProvider for ProviderChain {
    fn resolve(&self, name: &str) -> Result<Arc<ClassDescriptor>, ProviderError> {
        for (index, provider) in self.providers.iter().enumerate() {
            match provider.resolve(name) {
                Ok(class) => {
                    debug!("Resolved {} from provider {}", name, index);
                    return Ok(class);
                }
                Err(ProviderError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        Err(ProviderError::NotFound(name.to_string()))
    }
}
