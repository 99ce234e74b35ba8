/*!
 * Runtime Context
 *
 * Explicitly constructed owner of the descriptor table and attachment cache.
 * Built once by the bootstrap path and shared with every consumer.
 */

use super::lifecycle::Subsystem;
use crate::attach::AttachmentCache;
use crate::config::RuntimeConfig;
use crate::core::errors::LoadError;
use crate::core::fatal::abort_process;
use crate::core::types::RuntimeResult;
use crate::descriptors::DescriptorTable;
use crate::forward::Forwarder;
use crate::monitoring::span_operation;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{debug, error, info};

/// Process-lifetime runtime state
pub struct RuntimeContext {
    config: RuntimeConfig,
    descriptors: Arc<DescriptorTable>,
    attachments: AttachmentCache,
    subsystems: Vec<Box<dyn Subsystem>>,
    loaded: OnceLock<Result<(), LoadError>>,
}

impl RuntimeContext {
    pub fn builder() -> RuntimeContextBuilder {
        RuntimeContextBuilder::new()
    }

    /// Context with the given configuration and no subsystems
    pub fn new(config: RuntimeConfig) -> Self {
        Self::builder().with_config(config).build()
    }

    /// Context configured from `VFD_*` environment variables
    pub fn from_env() -> RuntimeResult<Self> {
        Ok(Self::new(RuntimeConfig::from_env()?))
    }

    /// Context configured from a JSON document
    pub fn from_json(json: &str) -> RuntimeResult<Self> {
        Ok(Self::new(RuntimeConfig::from_json(json)?))
    }

    #[inline]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    #[inline]
    pub fn descriptors(&self) -> &Arc<DescriptorTable> {
        &self.descriptors
    }

    #[inline]
    pub fn attachments(&self) -> &AttachmentCache {
        &self.attachments
    }

    /// Forwarder over the real OS surface sharing this context's table
    pub fn forwarder(&self) -> Forwarder {
        Forwarder::new(Arc::clone(&self.descriptors))
    }

    /// Module load: create the attachment key, then bring up subsystems in order
    ///
    /// Stops at the first failing subsystem. Runs once; later calls return the
    /// first outcome.
    pub fn on_load(&self) -> Result<(), LoadError> {
        self.loaded.get_or_init(|| self.run_load()).clone()
    }

    /// Module load where any failure is fatal to the process
    pub fn load_or_abort(&self) {
        if let Err(e) = self.on_load() {
            abort_process(&format!("runtime initialization failed: {}", e));
        }
    }

    /// Module unload: delete the attachment key
    pub fn on_unload(&self) {
        self.attachments.delete_key();
        info!("runtime unloaded");
    }

    fn run_load(&self) -> Result<(), LoadError> {
        let span = span_operation("runtime_load");
        let _entered = span.enter();

        let key = self.attachments.create_key();
        debug!(key = key.id(), "attachment key ready");

        for subsystem in &self.subsystems {
            let name = subsystem.name();
            debug!(subsystem = name, "initializing subsystem");
            if let Err(e) = subsystem.init() {
                error!(subsystem = name, error = %e, "subsystem initialization failed");
                span.record_error(&e.to_string());
                return Err(LoadError::Subsystem {
                    name: name.to_string(),
                    message: e.to_string(),
                });
            }
        }

        span.record_result(true);
        info!(
            subsystems = self.subsystems.len(),
            max_descriptors = self.descriptors.capacity(),
            "runtime loaded"
        );
        Ok(())
    }
}

impl Default for RuntimeContext {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("config", &self.config)
            .field("descriptors", &self.descriptors)
            .field("attachments", &self.attachments)
            .field("subsystems", &self.subsystems.iter().map(|s| s.name()).collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for RuntimeContext
pub struct RuntimeContextBuilder {
    config: RuntimeConfig,
    descriptors: Option<Arc<DescriptorTable>>,
    subsystems: Vec<Box<dyn Subsystem>>,
}

impl RuntimeContextBuilder {
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            descriptors: None,
            subsystems: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an existing descriptor table instead of building one from config
    pub fn with_descriptors(mut self, descriptors: Arc<DescriptorTable>) -> Self {
        self.descriptors = Some(descriptors);
        self
    }

    /// Append a subsystem; subsystems initialize in the order they are added
    pub fn with_subsystem<S: Subsystem + 'static>(mut self, subsystem: S) -> Self {
        self.subsystems.push(Box::new(subsystem));
        self
    }

    pub fn build(self) -> RuntimeContext {
        let descriptors = self
            .descriptors
            .unwrap_or_else(|| Arc::new(DescriptorTable::new(self.config.table)));

        debug!(
            subsystems = self.subsystems.len(),
            max_descriptors = descriptors.capacity(),
            "runtime context built"
        );

        RuntimeContext {
            config: self.config,
            descriptors,
            attachments: AttachmentCache::new(),
            subsystems: self.subsystems,
            loaded: OnceLock::new(),
        }
    }
}

impl Default for RuntimeContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}
