//! Scheme to driver lookup.

use std::collections::HashMap;
use std::sync::Arc;

use databus_common::{Error, Result};

use crate::driver::TransportDriver;

/// Maps endpoint schemes to transport drivers.
///
/// Populated at startup, then shared read-only by the [`DataBus`](crate::DataBus).
/// A driver serving several schemes (e.g. `mqtt` and `mqtts`) is registered
/// once and shared between them.
///
/// # Example
///
/// ```ignore
/// let registry = DriverRegistry::new()
///     .with(MemoryDriver::default())
///     .with(MqttDriver::new(options.clone()));
/// let bus = DataBus::new(registry);
/// ```
#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn TransportDriver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `driver` for every scheme it declares, replacing earlier
    /// registrations of the same schemes.
    pub fn register(&mut self, driver: Arc<dyn TransportDriver>) -> &mut Self {
        for scheme in driver.schemes() {
            if let Some(previous) = self.drivers.insert(scheme.to_string(), driver.clone()) {
                tracing::warn!(
                    scheme = %scheme,
                    previous = previous.name(),
                    replacement = driver.name(),
                    "Transport driver replaced"
                );
            }
        }
        self
    }

    /// Builder-style [`register`](Self::register).
    pub fn with<D: TransportDriver + 'static>(mut self, driver: D) -> Self {
        self.register(Arc::new(driver));
        self
    }

    /// Look up the driver for a (lowercase) scheme.
    pub fn resolve(&self, scheme: &str) -> Result<Arc<dyn TransportDriver>> {
        self.drivers
            .get(scheme)
            .cloned()
            .ok_or_else(|| Error::UnknownScheme(scheme.to_string()))
    }

    pub fn contains(&self, scheme: &str) -> bool {
        self.drivers.contains_key(scheme)
    }

    /// Registered schemes, sorted.
    pub fn schemes(&self) -> Vec<&str> {
        let mut schemes: Vec<&str> = self.drivers.keys().map(String::as_str).collect();
        schemes.sort_unstable();
        schemes
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("schemes", &self.schemes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDriver;

    #[test]
    fn test_resolve_registered_scheme() {
        let registry = DriverRegistry::new().with(MemoryDriver::default());

        assert!(registry.contains("mem"));
        assert_eq!(registry.resolve("mem").unwrap().name(), "memory");
        assert_eq!(registry.schemes(), vec!["mem"]);
    }

    #[test]
    fn test_unknown_scheme() {
        let registry = DriverRegistry::new();
        assert!(registry.is_empty());
        assert!(matches!(
            registry.resolve("amqp"),
            Err(Error::UnknownScheme(s)) if s == "amqp"
        ));
    }
}
