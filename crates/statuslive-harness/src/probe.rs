//! Reload callback probe.

use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

/// Counts reload invocations.
///
/// Hand [`callback`](Self::callback) to `LiveHandle::subscribe` and read
/// [`count`](Self::count) after settling.
#[derive(Debug, Clone, Default)]
pub struct ReloadProbe {
    count: Arc<AtomicUsize>,
}

impl ReloadProbe {
    /// Create a probe at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reloads observed so far.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Reload callback that bumps this probe.
    pub fn callback(&self) -> impl Fn() -> BoxedReload + Send + Sync + 'static {
        let count = Arc::clone(&self.count);
        move || {
            let count = Arc::clone(&count);
            Box::pin(async move {
                count.fetch_add(1, Ordering::SeqCst);
            })
        }
    }
}

/// Future returned by [`ReloadProbe::callback`].
pub type BoxedReload = std::pin::Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counts_each_invocation() {
        let probe = ReloadProbe::new();
        let reload = probe.callback();

        reload().await;
        reload().await;

        assert_eq!(probe.count(), 2);
    }
}
