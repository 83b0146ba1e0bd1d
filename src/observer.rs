//! Lifecycle hooks for conversion requests.
//!
//! Inject an [`Arc<dyn ConversionObserver>`] via
//! [`crate::config::GatewayConfigBuilder::observer`] to be told when a
//! workspace is created or removed and when a converter process starts and
//! finishes. Useful for metrics, audit logs, or asserting in tests that no
//! process was spawned for a rejected request.
//!
//! # Example
//!
//! ```rust
//! use convgate::{ConversionObserver, GatewayConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct SpawnCounter(AtomicUsize);
//!
//! impl ConversionObserver for SpawnCounter {
//!     fn on_tool_spawned(&self, _tool: &str, _argv: &[String]) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let counter = Arc::new(SpawnCounter(AtomicUsize::new(0)));
//! let config = GatewayConfig::builder()
//!     .observer(counter.clone() as Arc<dyn ConversionObserver>)
//!     .build()
//!     .unwrap();
//! ```

use crate::error::FailureKind;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Receives request lifecycle events.
///
/// Implementations must be `Send + Sync`: requests run concurrently and the
/// destroy event can fire from whichever task drops the response body. All
/// methods default to no-ops.
pub trait ConversionObserver: Send + Sync {
    /// A fresh workspace directory now exists.
    fn on_workspace_created(&self, path: &Path) {
        let _ = path;
    }

    /// A converter process is about to be spawned.
    fn on_tool_spawned(&self, tool: &str, argv: &[String]) {
        let _ = (tool, argv);
    }

    /// The converter process has exited or been killed.
    ///
    /// # Arguments
    /// * `exit_code`: `None` if the process was terminated by a signal
    /// * `timed_out`: `true` if it was killed for exceeding its budget
    /// * `elapsed`: wall-clock time from spawn to reap
    fn on_tool_finished(
        &self,
        tool: &str,
        exit_code: Option<i32>,
        timed_out: bool,
        elapsed: Duration,
    ) {
        let _ = (tool, exit_code, timed_out, elapsed);
    }

    /// The conversion failed; fired before the error is returned.
    fn on_conversion_failed(&self, kind: FailureKind) {
        let _ = kind;
    }

    /// The workspace directory and all its contents are gone.
    fn on_workspace_destroyed(&self, path: &Path) {
        let _ = path;
    }
}

/// A no-op implementation.
pub struct NoopObserver;

impl ConversionObserver for NoopObserver {}

/// Alias for the type stored in [`crate::config::GatewayConfig`].
pub type ObserverHandle = Arc<dyn ConversionObserver>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Tracking {
        created: AtomicUsize,
        destroyed: AtomicUsize,
        spawned: AtomicUsize,
        failures: Mutex<Vec<FailureKind>>,
    }

    impl ConversionObserver for Tracking {
        fn on_workspace_created(&self, _path: &Path) {
            self.created.fetch_add(1, Ordering::SeqCst);
        }

        fn on_tool_spawned(&self, _tool: &str, _argv: &[String]) {
            self.spawned.fetch_add(1, Ordering::SeqCst);
        }

        fn on_conversion_failed(&self, kind: FailureKind) {
            self.failures.lock().unwrap().push(kind);
        }

        fn on_workspace_destroyed(&self, _path: &Path) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_observer_does_not_panic() {
        let o = NoopObserver;
        o.on_workspace_created(Path::new("/tmp/x"));
        o.on_tool_spawned("office", &["soffice".into()]);
        o.on_tool_finished("office", Some(0), false, Duration::from_millis(5));
        o.on_conversion_failed(FailureKind::ToolTimeout);
        o.on_workspace_destroyed(Path::new("/tmp/x"));
    }

    #[test]
    fn tracking_observer_receives_events() {
        let t = Tracking::default();
        t.on_workspace_created(Path::new("/tmp/a"));
        t.on_tool_spawned("text", &[]);
        t.on_conversion_failed(FailureKind::OutputNotProduced);
        t.on_workspace_destroyed(Path::new("/tmp/a"));

        assert_eq!(t.created.load(Ordering::SeqCst), 1);
        assert_eq!(t.spawned.load(Ordering::SeqCst), 1);
        assert_eq!(t.destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(
            *t.failures.lock().unwrap(),
            vec![FailureKind::OutputNotProduced]
        );
    }

    #[test]
    fn arc_dyn_observer_works() {
        let o: ObserverHandle = Arc::new(NoopObserver);
        o.on_tool_finished("raster", None, true, Duration::from_secs(1));
    }
}
