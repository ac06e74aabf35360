//! Driver factory registry.
//!
//! Driver crates register their [`DriverFactory`] at startup; the host then builds the
//! configured focuser by `type` name. Building hands back an owned `Box<dyn Focuser>`,
//! so there is no process-wide driver instance.

use anyhow::{anyhow, Context, Result};
use focus_core::capabilities::Focuser;
use focus_core::driver::{Capability, DriverFactory};
use std::collections::BTreeMap;

/// Factory information for introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactoryInfo {
    pub driver_type: String,
    pub name: String,
    pub capabilities: Vec<Capability>,
}

/// Registered driver factories, keyed by driver type.
#[derive(Default)]
pub struct FactoryRegistry {
    factories: BTreeMap<String, Box<dyn DriverFactory>>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every driver shipped in this workspace.
    pub fn with_builtin_drivers() -> Self {
        focus_driver_microstepper::link();
        let mut registry = Self::new();
        registry.register_factory(Box::new(focus_driver_microstepper::MicroStepperFactory));
        registry
    }

    /// Register a driver factory for its driver type.
    ///
    /// # Returns
    /// The previous factory for this driver_type, if any was registered.
    pub fn register_factory(
        &mut self,
        factory: Box<dyn DriverFactory>,
    ) -> Option<Box<dyn DriverFactory>> {
        let driver_type = factory.driver_type().to_string();
        tracing::debug!(
            driver_type = %driver_type,
            name = %factory.name(),
            capabilities = ?factory.capabilities(),
            "Registering driver factory"
        );
        self.factories.insert(driver_type, factory)
    }

    /// Look up the factory for a driver type.
    pub fn factory(&self, driver_type: &str) -> Option<&dyn DriverFactory> {
        self.factories.get(driver_type).map(|factory| factory.as_ref())
    }

    /// Check if a factory is registered for a driver type.
    pub fn has_factory(&self, driver_type: &str) -> bool {
        self.factories.contains_key(driver_type)
    }

    /// List all registered driver types, sorted.
    pub fn list_factories(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// Get factory information for debugging/introspection.
    pub fn factory_info(&self, driver_type: &str) -> Option<FactoryInfo> {
        self.factory(driver_type).map(|factory| FactoryInfo {
            driver_type: factory.driver_type().to_string(),
            name: factory.name().to_string(),
            capabilities: factory.capabilities().to_vec(),
        })
    }

    /// Validate `config` with the matching factory, then build the driver.
    ///
    /// # Errors
    /// Returns error if:
    /// - No factory is registered for the driver_type
    /// - Configuration validation fails
    /// - The driver cannot open or handshake with the device
    pub async fn build(&self, driver_type: &str, config: toml::Value) -> Result<Box<dyn Focuser>> {
        let factory = self.factory(driver_type).ok_or_else(|| {
            anyhow!(
                "No factory registered for driver_type '{}'. Available factories: {:?}",
                driver_type,
                self.list_factories()
            )
        })?;

        factory
            .validate(&config)
            .with_context(|| format!("Invalid configuration for '{}'", driver_type))?;

        let device = factory
            .build(config)
            .await
            .with_context(|| format!("Failed to build '{}' driver", driver_type))?;

        tracing::info!(
            driver_type,
            capabilities = ?device.capabilities(),
            "Focuser ready"
        );
        Ok(device)
    }
}
