//! Service gating for privileged fund actions

use parking_lot::RwLock;
use revfund_core::Address;
use std::collections::{HashMap, HashSet};

/// Action name guarding period closing
pub const CLOSE_ACCRUAL_PERIOD_ACTION: &str = "close_accrual_period";

/// Answers whether an action is enabled and the caller authorized for it
pub trait ServiceGate: Send + Sync {
    fn is_enabled(&self, action: &str, caller: &Address) -> bool;
}

/// Gate that lets every caller through
#[derive(Clone, Copy, Debug, Default)]
pub struct OpenGate;

impl ServiceGate for OpenGate {
    fn is_enabled(&self, _action: &str, _caller: &Address) -> bool {
        true
    }
}

/// Registered services, each with its own set of enabled actions
#[derive(Default)]
pub struct ServiceRegistry {
    services: RwLock<HashMap<Address, HashSet<String>>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_service(&self, service: Address) {
        self.services.write().entry(service).or_default();
    }

    pub fn deregister_service(&self, service: &Address) {
        self.services.write().remove(service);
    }

    pub fn is_registered(&self, service: &Address) -> bool {
        self.services.read().contains_key(service)
    }

    /// Enable `action` for a registered service; false if not registered
    pub fn enable_action(&self, service: &Address, action: &str) -> bool {
        match self.services.write().get_mut(service) {
            Some(actions) => {
                actions.insert(action.to_string());
                true
            }
            None => false,
        }
    }

    pub fn disable_action(&self, service: &Address, action: &str) {
        if let Some(actions) = self.services.write().get_mut(service) {
            actions.remove(action);
        }
    }
}

impl ServiceGate for ServiceRegistry {
    fn is_enabled(&self, action: &str, caller: &Address) -> bool {
        self.services
            .read()
            .get(caller)
            .map(|actions| actions.contains(action))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_requires_registration_and_action() {
        let registry = ServiceRegistry::new();
        let service = Address::repeat_byte(5);

        assert!(!registry.enable_action(&service, CLOSE_ACCRUAL_PERIOD_ACTION));
        assert!(!registry.is_enabled(CLOSE_ACCRUAL_PERIOD_ACTION, &service));

        registry.register_service(service);
        assert!(!registry.is_enabled(CLOSE_ACCRUAL_PERIOD_ACTION, &service));

        assert!(registry.enable_action(&service, CLOSE_ACCRUAL_PERIOD_ACTION));
        assert!(registry.is_enabled(CLOSE_ACCRUAL_PERIOD_ACTION, &service));
        assert!(!registry.is_enabled("other", &service));
    }

    #[test]
    fn test_disable_and_deregister() {
        let registry = ServiceRegistry::new();
        let service = Address::repeat_byte(5);
        registry.register_service(service);
        registry.enable_action(&service, CLOSE_ACCRUAL_PERIOD_ACTION);

        registry.disable_action(&service, CLOSE_ACCRUAL_PERIOD_ACTION);
        assert!(!registry.is_enabled(CLOSE_ACCRUAL_PERIOD_ACTION, &service));

        registry.enable_action(&service, CLOSE_ACCRUAL_PERIOD_ACTION);
        registry.deregister_service(&service);
        assert!(!registry.is_registered(&service));
        assert!(!registry.is_enabled(CLOSE_ACCRUAL_PERIOD_ACTION, &service));
    }

    #[test]
    fn test_open_gate() {
        assert!(OpenGate.is_enabled("anything", &Address::ZERO));
    }
}
