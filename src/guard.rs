use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Liveness flag shared between a view and the requests it issues.
///
/// A response that completes after `dispose` must be dropped without touching
/// view state; callers check `is_live` after every await.
#[derive(Debug, Clone)]
pub struct ViewGuard {
    live: Arc<AtomicBool>,
}

impl Default for ViewGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewGuard {
    pub fn new() -> Self {
        Self {
            live: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    pub fn dispose(&self) {
        self.live.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let guard = ViewGuard::new();
        let handed_out = guard.clone();
        assert!(handed_out.is_live());
        guard.dispose();
        assert!(!handed_out.is_live());
    }
}
