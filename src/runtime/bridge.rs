/*!
 * Host Bridge
 *
 * Entry points the hosting VM invokes when it loads and unloads the module.
 */

use super::context::RuntimeContext;
use crate::attach::{HostVm, InterfaceVersion};
use crate::core::errors::BridgeError;
use crate::core::limits::LOAD_FAILED_SENTINEL;
use std::sync::Arc;
use tracing::{error, info};

/// Host-facing load/unload entry points
#[derive(Debug, Clone)]
pub struct HostBridge {
    context: Arc<RuntimeContext>,
}

impl HostBridge {
    pub fn new(context: Arc<RuntimeContext>) -> Self {
        Self { context }
    }

    #[inline]
    pub fn context(&self) -> &Arc<RuntimeContext> {
        &self.context
    }

    /// Capture the host VM and the calling thread's environment
    ///
    /// Returns the negotiated interface version. The VM is not registered if
    /// the environment cannot be obtained.
    pub fn on_host_load(&self, vm: Arc<dyn HostVm>) -> Result<InterfaceVersion, BridgeError> {
        let version = InterfaceVersion::new(self.context.config().interface_version);

        let env = vm.get_env(version).map_err(|e| {
            error!(error = %e, "can't get env from host VM");
            BridgeError::EnvUnavailable(e)
        })?;

        let attachments = self.context.attachments();
        attachments.set_vm(vm);
        attachments.save_env(env).map_err(|e| {
            error!(error = %e, "can't save env");
            BridgeError::SaveFailed(e)
        })?;

        info!(version = version.raw(), %env, "host VM loaded module");
        Ok(version)
    }

    /// Same as [`on_host_load`](Self::on_host_load), reported as the raw
    /// version or `-1`
    pub fn on_host_load_raw(&self, vm: Arc<dyn HostVm>) -> i32 {
        match self.on_host_load(vm) {
            Ok(version) => version.raw(),
            Err(_) => LOAD_FAILED_SENTINEL,
        }
    }

    /// Forget the host VM
    pub fn on_host_unload(&self) {
        self.context.attachments().clear_vm();
        info!("host VM unloaded module");
    }
}
