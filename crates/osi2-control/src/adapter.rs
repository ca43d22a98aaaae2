//! Object adapters.
//!
//! An adapter is handed to the plugin manager during object construction so
//! the plugin can negotiate which capabilities the host offers. The control
//! layer never inspects it.

bitflags::bitflags! {
    /// Capabilities a host advertises to a plugin factory.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Capabilities: u64 {
        /// Host accepts diagnostic callbacks from the object
        const MESSAGES = 1 << 0;
        /// Host can hand out parameter storage
        const PARAMETERS = 1 << 1;
        /// Host supports warm-start data exchange
        const WARM_START = 1 << 2;
        /// Host allows the object to spawn its own threads
        const THREADS = 1 << 3;
    }
}

/// Capability negotiation value passed opaquely to the manager.
pub trait ObjectAdapter {
    /// Capabilities offered to the object being constructed.
    fn capabilities(&self) -> Capabilities;
}

/// Adapter used when the caller does not supply one. Offers nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAdapter;

impl ObjectAdapter for DefaultAdapter {
    fn capabilities(&self) -> Capabilities {
        Capabilities::empty()
    }
}

impl ObjectAdapter for Capabilities {
    fn capabilities(&self) -> Capabilities {
        *self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_adapter_offers_nothing() {
        assert!(DefaultAdapter.capabilities().is_empty());
    }

    #[test]
    fn test_capabilities_as_adapter() {
        let caps = Capabilities::MESSAGES | Capabilities::WARM_START;
        assert_eq!(caps.capabilities().bits(), 0b101);
    }
}
