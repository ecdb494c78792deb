use std::{collections::HashMap, sync::Arc};

use classfile::{
    classfile::ClassDescriptor,
    provider::{DescriptorProvider, ProviderError},
};
use parking_lot::Mutex;
use support::descriptor::FieldType;
use tracing::debug;

use super::class::Class;
use crate::{error::Throwable, internal, internalise};

/// Turns names into linked classes. Every name maps to exactly one class
/// for the lifetime of the loader, however many threads race to load it.
pub struct ClassLoader {
    provider: Box<dyn DescriptorProvider>,
    classes: Mutex<HashMap<String, Arc<Class>>>,
}

impl ClassLoader {
    pub fn new(provider: impl DescriptorProvider + 'static) -> Self {
        Self {
            provider: Box::new(provider),
            classes: Mutex::new(HashMap::new()),
        }
    }

    /// Load and link `name`. Initialization is left to the caller.
    pub fn for_name(&self, name: &str) -> Result<Arc<Class>, Throwable> {
        let class = self.load(name)?;
        self.link(&class, &mut vec![])?;

        Ok(class)
    }

    pub fn loaded_count(&self) -> usize {
        self.classes.lock().len()
    }

    fn load(&self, name: &str) -> Result<Arc<Class>, Throwable> {
        if let Some(class) = self.classes.lock().get(name) {
            debug!("Fast path for {}", name);
            return Ok(class.clone());
        }

        debug!("Slow path for {}", name);

        // The provider is called without the lock, two threads may both get here.
        // Whoever inserts first wins and the other descriptor is dropped.
        let class = if name.starts_with('[') {
            self.synthesize_array(name)?
        } else {
            let descriptor = self.provider.resolve(name).map_err(|e| match e {
                ProviderError::NotFound(missing) => Throwable::ClassNotFound(missing),
                other => Throwable::Provider(other),
            })?;

            if descriptor.name != name {
                return Err(internal!(
                    "provider returned {} when asked for {}",
                    descriptor.name,
                    name
                ));
            }

            Class::new(descriptor)?
        };

        let mut classes = self.classes.lock();
        Ok(classes
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(class))
            .clone())
    }

    fn synthesize_array(&self, name: &str) -> Result<Class, Throwable> {
        let ty = FieldType::parse(name).map_err(internalise!())?;
        let component = match ty {
            FieldType::Array(array) => *array.field_type,
            _ => return Err(internal!("{} is not an array descriptor", name)),
        };

        let element = match component.class_name() {
            Some(component_name) => Some(self.for_name(&component_name)?),
            None => None,
        };

        Class::new_array(Arc::new(ClassDescriptor::array(name)), component, element)
    }

    fn link(&self, class: &Arc<Class>, linking: &mut Vec<String>) -> Result<(), Throwable> {
        if class.is_linked() {
            return Ok(());
        }

        if linking.iter().any(|name| name == class.name()) {
            return Err(Throwable::Linkage {
                class: class.name().to_string(),
                reason: format!("circular hierarchy through {}", linking.join(" -> ")),
            });
        }

        linking.push(class.name().to_string());

        let descriptor = class.descriptor().clone();
        let super_class = match &descriptor.super_class {
            Some(name) => {
                let parent = self.link_dependency(class, name, linking)?;
                if parent.is_interface() {
                    return Err(Throwable::Linkage {
                        class: class.name().to_string(),
                        reason: format!("superclass {} is an interface", name),
                    });
                }

                Some(parent)
            }
            None => None,
        };

        let mut interfaces = Vec::with_capacity(descriptor.interfaces.len());
        for name in &descriptor.interfaces {
            let interface = self.link_dependency(class, name, linking)?;
            if !interface.is_interface() {
                return Err(Throwable::Linkage {
                    class: class.name().to_string(),
                    reason: format!("{} is not an interface", name),
                });
            }

            interfaces.push(interface);
        }

        linking.pop();
        class.link(super_class, interfaces)?;
        debug!("Linked {}", class.name());

        Ok(())
    }

    fn link_dependency(
        &self,
        class: &Arc<Class>,
        name: &str,
        linking: &mut Vec<String>,
    ) -> Result<Arc<Class>, Throwable> {
        let dependency = self.load(name).map_err(|e| match e {
            Throwable::ClassNotFound(missing) => Throwable::Linkage {
                class: class.name().to_string(),
                reason: format!("{} could not be found", missing),
            },
            other => other,
        })?;

        self.link(&dependency, linking)?;
        Ok(dependency)
    }
}
