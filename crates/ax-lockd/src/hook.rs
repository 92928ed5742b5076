//! Global input interception seam

use crate::filter::EventFilter;
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;

pub type SharedFilter = Arc<Mutex<EventFilter>>;

#[derive(Debug, Error)]
pub enum HookError {
    #[error("input monitoring permission has not been granted")]
    PermissionDenied,

    #[error("global input interception is not available on this platform")]
    Unsupported,

    #[error("failed to install input hook: {0}")]
    Install(String),
}

/// Installs a system-wide hook that routes every input event through a filter
///
/// The hook must consult the filter synchronously for each event, in order.
pub trait InputInterceptor: Send {
    fn install(&mut self, filter: SharedFilter) -> Result<(), HookError>;

    fn uninstall(&mut self);
}

/// Interceptor for targets without a native hook
#[derive(Debug, Default)]
pub struct UnsupportedInterceptor;

impl InputInterceptor for UnsupportedInterceptor {
    fn install(&mut self, _filter: SharedFilter) -> Result<(), HookError> {
        Err(HookError::Unsupported)
    }

    fn uninstall(&mut self) {}
}

/// Interceptor for this build
#[cfg(target_os = "macos")]
pub fn platform_interceptor() -> Box<dyn InputInterceptor> {
    Box::new(crate::macos::EventTapInterceptor::new())
}

/// Interceptor for this build
#[cfg(not(target_os = "macos"))]
pub fn platform_interceptor() -> Box<dyn InputInterceptor> {
    Box::new(UnsupportedInterceptor)
}

impl InputInterceptor for Box<dyn InputInterceptor> {
    fn install(&mut self, filter: SharedFilter) -> Result<(), HookError> {
        (**self).install(filter)
    }

    fn uninstall(&mut self) {
        (**self).uninstall()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Notify;

    fn filter() -> SharedFilter {
        Arc::new(Mutex::new(EventFilter::new(Arc::new(Notify::new()))))
    }

    #[test]
    fn test_unsupported_interceptor_fails_install() {
        let mut hook = UnsupportedInterceptor;
        assert!(matches!(hook.install(filter()), Err(HookError::Unsupported)));
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn test_targets_without_event_tap_report_unsupported() {
        let mut hook = platform_interceptor();
        assert!(matches!(hook.install(filter()), Err(HookError::Unsupported)));
        hook.uninstall();
    }
}
