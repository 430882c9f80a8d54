use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tracing::debug;
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{ModelScope, TrainedModel};

/// Storage contract for trained models. The swap in `insert_and_activate`
/// must be atomic: observers never see zero or two active models for a
/// scope.
pub trait ModelStore: Send + Sync {
    fn insert_and_activate(&self, model: TrainedModel);
    fn active(&self, scope: ModelScope) -> Option<TrainedModel>;
    /// Administrative deactivation. Returns whether an active model existed.
    fn deactivate(&self, scope: ModelScope) -> bool;
    fn all(&self) -> Vec<TrainedModel>;
}

#[derive(Default)]
pub struct InMemoryModelStore {
    models: Mutex<HashMap<Uuid, TrainedModel>>,
}

impl InMemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ModelStore for InMemoryModelStore {
    fn insert_and_activate(&self, mut model: TrainedModel) {
        let mut models = self.models.lock().expect("model store poisoned");
        for existing in models.values_mut() {
            if existing.scope == model.scope {
                existing.is_active = false;
            }
        }
        model.is_active = true;
        models.insert(model.id, model);
    }

    fn active(&self, scope: ModelScope) -> Option<TrainedModel> {
        let models = self.models.lock().expect("model store poisoned");
        models
            .values()
            .find(|m| m.scope == scope && m.is_active)
            .cloned()
    }

    fn deactivate(&self, scope: ModelScope) -> bool {
        let mut models = self.models.lock().expect("model store poisoned");
        let mut found = false;
        for existing in models.values_mut() {
            if existing.scope == scope && existing.is_active {
                existing.is_active = false;
                found = true;
            }
        }
        found
    }

    fn all(&self) -> Vec<TrainedModel> {
        let models = self.models.lock().expect("model store poisoned");
        models.values().cloned().collect()
    }
}

/// Read-through cache of active model weights, keyed by scope. Activation
/// goes through here and nowhere else, so a stale entry cannot survive a
/// swap.
pub struct ActiveModelCache<S: ModelStore> {
    store: S,
    cache: RwLock<HashMap<ModelScope, Arc<TrainedModel>>>,
}

impl<S: ModelStore> ActiveModelCache<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// The only write path: persists, swaps activation, and replaces the
    /// cached entry for the scope in one motion.
    pub fn activate(&self, model: TrainedModel) {
        let scope = model.scope;
        self.store.insert_and_activate(model.clone());
        let mut cache = self.cache.write().expect("model cache poisoned");
        cache.insert(scope, Arc::new(model));
        debug!(%scope, "activated model and refreshed cache");
    }

    pub fn deactivate(&self, scope: ModelScope) -> bool {
        let existed = self.store.deactivate(scope);
        let mut cache = self.cache.write().expect("model cache poisoned");
        cache.remove(&scope);
        existed
    }

    pub fn active(&self, scope: ModelScope) -> Option<Arc<TrainedModel>> {
        {
            let cache = self.cache.read().expect("model cache poisoned");
            if let Some(model) = cache.get(&scope) {
                return Some(Arc::clone(model));
            }
        }

        let model = Arc::new(self.store.active(scope)?);
        let mut cache = self.cache.write().expect("model cache poisoned");
        cache.insert(scope, Arc::clone(&model));
        Some(model)
    }

    /// Two-tier selection: the scholarship's own active model when it has
    /// one, the global model otherwise.
    pub fn model_for(&self, scholarship_id: Uuid) -> Result<Arc<TrainedModel>, EngineError> {
        if let Some(model) = self.active(ModelScope::Scholarship(scholarship_id)) {
            return Ok(model);
        }
        self.active(ModelScope::Global)
            .ok_or(EngineError::ModelUnavailable { scholarship_id })
    }
}
