//! The run-context metadata bag and stage coordination utilities.
//!
//! Plugins are mutually unaware; this bag is their sole coordination
//! surface. The orchestrator owns the bag but never consults it: locks are
//! advisory, completion flags are hints, and cleanups run only when a plugin
//! asks for them.

use crate::hooks::BoxFuture;
use crate::pipeline::Stage;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::future::Future;
use std::sync::OnceLock;
use tracing::warn;

type CleanupFn = Box<dyn FnOnce() -> BoxFuture<anyhow::Result<()>> + Send>;

struct NamedCleanup {
    name: String,
    run: CleanupFn,
}

/// The three lazily-created coordination sub-maps.
#[derive(Default)]
struct StageCoordination {
    locks: RwLock<HashMap<Stage, bool>>,
    cleanups: Mutex<HashMap<Stage, Vec<NamedCleanup>>>,
    completed: RwLock<HashMap<Stage, bool>>,
}

/// Open key/value bag plus the stage coordination region.
///
/// Free-form values are `serde_json::Value` and writes overwrite; this is a
/// handoff surface, not a conflict domain. The coordination sub-maps are
/// created on first access and persist for the context's lifetime.
#[derive(Default)]
pub struct MetadataBag {
    values: RwLock<HashMap<String, serde_json::Value>>,
    coordination: OnceLock<StageCoordination>,
}

impl std::fmt::Debug for MetadataBag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataBag")
            .field("keys", &self.keys())
            .field("coordination_initialized", &self.coordination.get().is_some())
            .finish()
    }
}

impl MetadataBag {
    /// Creates an empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotently initializes the coordination sub-maps. Safe to call any
    /// number of times; every utility below calls it implicitly.
    pub fn ensure(&self) {
        let _ = self.coordination();
    }

    fn coordination(&self) -> &StageCoordination {
        self.coordination.get_or_init(StageCoordination::default)
    }

    // --- free-form values ---

    /// Gets a value from the bag.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.values.read().get(key).cloned()
    }

    /// Sets a value, overwriting any previous one.
    pub fn set(&self, key: impl Into<String>, value: serde_json::Value) {
        self.values.write().insert(key.into(), value);
    }

    /// Checks if a key exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.read().contains_key(key)
    }

    /// Returns all keys.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.values.read().keys().cloned().collect()
    }

    // --- advisory stage locks ---

    /// Returns true if the advisory lock for `stage` is held.
    #[must_use]
    pub fn is_stage_locked(&self, stage: Stage) -> bool {
        self.coordination()
            .locks
            .read()
            .get(&stage)
            .copied()
            .unwrap_or(false)
    }

    /// Takes the advisory lock for `stage`.
    ///
    /// Returns false if it was already held. Purely cooperative: nothing is
    /// enforced, and the orchestrator never consults these locks.
    pub fn lock_stage(&self, stage: Stage) -> bool {
        let mut locks = self.coordination().locks.write();
        let held = locks.entry(stage).or_insert(false);
        if *held {
            false
        } else {
            *held = true;
            true
        }
    }

    /// Releases the advisory lock for `stage`.
    pub fn unlock_stage(&self, stage: Stage) {
        self.coordination().locks.write().insert(stage, false);
    }

    // --- deferred cleanups ---

    /// Registers a named deferred cleanup for `stage`.
    ///
    /// Cleanups run in registration order when a plugin calls
    /// [`run_stage_cleanups`](Self::run_stage_cleanups).
    pub fn add_stage_cleanup<F, Fut>(&self, stage: Stage, name: impl Into<String>, cleanup: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let entry = NamedCleanup {
            name: name.into(),
            run: Box::new(move || Box::pin(cleanup())),
        };
        self.coordination()
            .cleanups
            .lock()
            .entry(stage)
            .or_default()
            .push(entry);
    }

    /// Returns the number of pending cleanups for `stage`.
    #[must_use]
    pub fn pending_cleanups(&self, stage: Stage) -> usize {
        self.coordination()
            .cleanups
            .lock()
            .get(&stage)
            .map_or(0, Vec::len)
    }

    /// Runs all cleanups registered for `stage`, in registration order.
    ///
    /// Each cleanup is isolated: a failure is logged and recorded, and the
    /// rest still run. Returns the completed names and the failed
    /// `(name, message)` pairs.
    pub async fn run_stage_cleanups(&self, stage: Stage) -> (Vec<String>, Vec<(String, String)>) {
        let cleanups: Vec<NamedCleanup> = self
            .coordination()
            .cleanups
            .lock()
            .remove(&stage)
            .unwrap_or_default();

        let mut completed = Vec::new();
        let mut failed = Vec::new();
        for cleanup in cleanups {
            match (cleanup.run)().await {
                Ok(()) => completed.push(cleanup.name),
                Err(err) => {
                    warn!(
                        stage = %stage,
                        cleanup = %cleanup.name,
                        error = %err,
                        "stage cleanup failed"
                    );
                    failed.push((cleanup.name, err.to_string()));
                }
            }
        }
        (completed, failed)
    }

    /// Drops all cleanups registered for `stage` without running them.
    pub fn clear_stage_cleanups(&self, stage: Stage) {
        self.coordination().cleanups.lock().remove(&stage);
    }

    // --- completion flags ---

    /// Sets the advisory completion flag for `stage`.
    pub fn mark_stage_completed(&self, stage: Stage, completed: bool) {
        self.coordination()
            .completed
            .write()
            .insert(stage, completed);
    }

    /// Returns the advisory completion flag for `stage`.
    #[must_use]
    pub fn is_stage_completed(&self, stage: Stage) -> bool {
        self.coordination()
            .completed
            .read()
            .get(&stage)
            .copied()
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn ensure_is_idempotent() {
        let bag = MetadataBag::new();
        bag.ensure();
        bag.lock_stage(Stage::InitEngine);
        bag.ensure();
        assert!(bag.is_stage_locked(Stage::InitEngine));
    }

    #[test]
    fn locks_are_per_stage() {
        let bag = MetadataBag::new();
        assert!(!bag.is_stage_locked(Stage::BuildScene));
        assert!(bag.lock_stage(Stage::BuildScene));
        assert!(!bag.lock_stage(Stage::BuildScene));
        assert!(!bag.is_stage_locked(Stage::ResourceLoad));

        bag.unlock_stage(Stage::BuildScene);
        assert!(!bag.is_stage_locked(Stage::BuildScene));
        assert!(bag.lock_stage(Stage::BuildScene));
    }

    #[tokio::test]
    async fn cleanups_run_in_registration_order_with_isolation() {
        let bag = MetadataBag::new();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for label in ["a", "b"] {
            let order = Arc::clone(&order);
            bag.add_stage_cleanup(Stage::InitEngine, label, move || async move {
                order.lock().push(label);
                Ok(())
            });
        }
        bag.add_stage_cleanup(Stage::InitEngine, "broken", || async {
            anyhow::bail!("handle already released")
        });
        {
            let order = Arc::clone(&order);
            bag.add_stage_cleanup(Stage::InitEngine, "c", move || async move {
                order.lock().push("c");
                Ok(())
            });
        }

        let (completed, failed) = bag.run_stage_cleanups(Stage::InitEngine).await;
        assert_eq!(completed, vec!["a", "b", "c"]);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, "broken");
        assert_eq!(*order.lock(), vec!["a", "b", "c"]);

        // A second run finds nothing left.
        let (completed, failed) = bag.run_stage_cleanups(Stage::InitEngine).await;
        assert!(completed.is_empty());
        assert!(failed.is_empty());
    }

    #[tokio::test]
    async fn cleared_cleanups_never_run() {
        let bag = MetadataBag::new();
        let ran = Arc::new(AtomicUsize::new(0));
        let ran_clone = Arc::clone(&ran);
        bag.add_stage_cleanup(Stage::BuildScene, "never", move || {
            let ran = Arc::clone(&ran_clone);
            async move {
                ran.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        bag.clear_stage_cleanups(Stage::BuildScene);
        let (completed, _) = bag.run_stage_cleanups(Stage::BuildScene).await;
        assert!(completed.is_empty());
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn completion_flags_round_trip() {
        let bag = MetadataBag::new();
        assert!(!bag.is_stage_completed(Stage::ResourceParse));
        bag.mark_stage_completed(Stage::ResourceParse, true);
        assert!(bag.is_stage_completed(Stage::ResourceParse));
        bag.mark_stage_completed(Stage::ResourceParse, false);
        assert!(!bag.is_stage_completed(Stage::ResourceParse));
    }

    #[test]
    fn value_bag_overwrites() {
        let bag = MetadataBag::new();
        bag.set("camera", serde_json::json!({"fov": 45}));
        bag.set("camera", serde_json::json!({"fov": 60}));
        assert_eq!(bag.get("camera"), Some(serde_json::json!({"fov": 60})));
        assert!(bag.contains_key("camera"));
        assert_eq!(bag.keys(), vec!["camera".to_string()]);
    }
}
