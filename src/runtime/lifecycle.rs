/*!
 * Module Lifecycle
 * Auxiliary subsystems initialized in a fixed order at module load
 */

use crate::core::errors::SubsystemError;

/// Auxiliary subsystem brought up at module load
pub trait Subsystem: Send + Sync {
    fn name(&self) -> &'static str;

    fn init(&self) -> Result<(), SubsystemError>;
}

/// Subsystem backed by a closure
pub struct FnSubsystem<F> {
    name: &'static str,
    init: F,
}

impl<F> FnSubsystem<F>
where
    F: Fn() -> Result<(), SubsystemError> + Send + Sync,
{
    pub fn new(name: &'static str, init: F) -> Self {
        Self { name, init }
    }
}

impl<F> Subsystem for FnSubsystem<F>
where
    F: Fn() -> Result<(), SubsystemError> + Send + Sync,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn init(&self) -> Result<(), SubsystemError> {
        (self.init)()
    }
}
