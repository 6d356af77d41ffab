/// Process-wide format registry
use crate::config::EngineConfig;
use mtag_core::{Registry, Result, TagError};
use once_cell::sync::OnceCell;
use std::sync::Arc;

static GLOBAL: OnceCell<Arc<Registry>> = OnceCell::new();

/// The registry `open` uses
///
/// Filled with the built-in formats on first use unless a registry was
/// installed before.
pub fn global_registry() -> Result<Arc<Registry>> {
    GLOBAL
        .get_or_try_init(|| EngineConfig::default().build_registry().map(Arc::new))
        .cloned()
}

/// Install the process-wide registry
///
/// Must happen before the first `open`; afterwards the registry is read-only
/// and a second install fails.
pub fn install_global_registry(registry: Registry) -> Result<Arc<Registry>> {
    let registry = Arc::new(registry);
    GLOBAL
        .set(registry.clone())
        .map_err(|_| TagError::Config("global registry is already initialised".to_string()))?;
    Ok(registry)
}
