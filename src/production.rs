use crate::scene::{Production, Scene, ScenePatch, Topic};
use std::sync::{Arc, Mutex, MutexGuard};

/// Shared handle to the single active production.
///
/// Mutations are append/patch only; wholesale replacement happens when a new
/// production begins, which bumps a monotonically increasing generation
/// stamp. Every writer carries the stamp it was spawned under, so results
/// from a superseded production are detected and discarded instead of
/// written.
#[derive(Clone, Default)]
pub struct ProductionState {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    generation: u64,
    production: Production,
}

impl ProductionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the aggregate wholesale and return the new generation stamp.
    /// In-flight resolvers holding the prior stamp become stale.
    pub fn begin(&self, topic: Topic) -> u64 {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.production = Production {
            topic,
            scenes: Vec::new(),
            complete: false,
        };
        inner.generation
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Append in arrival order. Returns false when the stamp is stale.
    pub fn append_scene(&self, stamp: u64, scene: Scene) -> bool {
        let mut inner = self.lock();
        if inner.generation != stamp {
            return false;
        }
        inner.production.scenes.push(scene);
        true
    }

    /// Index-scoped partial merge. Stale stamps and out-of-range indices are
    /// rejected; concurrent resolvers always target disjoint indices.
    pub fn patch_scene(&self, stamp: u64, index: usize, patch: ScenePatch) -> bool {
        let mut inner = self.lock();
        if inner.generation != stamp {
            return false;
        }
        let Some(scene) = inner.production.scenes.get_mut(index) else {
            return false;
        };
        scene.apply(patch);
        true
    }

    pub fn mark_complete(&self, stamp: u64) -> bool {
        let mut inner = self.lock();
        if inner.generation != stamp {
            return false;
        }
        inner.production.complete = true;
        true
    }

    pub fn snapshot(&self) -> Production {
        self.lock().production.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
