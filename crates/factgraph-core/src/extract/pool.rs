use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use super::custom::EntityModel;
use super::relation::RelationModel;
use super::rule_ner::RuleBasedNer;
use super::ExtractionResult;

struct ModelCache<M: ?Sized> {
    models: RwLock<HashMap<String, Arc<M>>>,
}

impl<M: ?Sized> Default for ModelCache<M> {
    fn default() -> Self {
        Self {
            models: RwLock::new(HashMap::new()),
        }
    }
}

impl<M: ?Sized> ModelCache<M> {
    fn get(&self, id: &str) -> Option<Arc<M>> {
        self.models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    fn insert(&self, id: &str, model: Arc<M>) -> Arc<M> {
        let mut models = self.models.write().unwrap_or_else(PoisonError::into_inner);
        // A concurrent loader may have won; keep the first instance.
        models.entry(id.to_string()).or_insert(model).clone()
    }

    fn get_or_load<F>(&self, id: &str, loads: &AtomicUsize, load: F) -> ExtractionResult<Arc<M>>
    where
        F: FnOnce() -> ExtractionResult<Arc<M>>,
    {
        if let Some(model) = self.get(id) {
            return Ok(model);
        }

        let model = load()?;
        loads.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(model = %id, "Loaded model");
        Ok(self.insert(id, model))
    }
}

/// Caller-owned cache of model instances keyed by model identity. Hand the
/// same pool to every pipeline of a run so each model loads once.
#[derive(Default)]
pub struct ModelPool {
    rule_ner: ModelCache<RuleBasedNer>,
    entity_models: ModelCache<dyn EntityModel>,
    relation_models: ModelCache<dyn RelationModel>,
    loads: AtomicUsize,
}

impl ModelPool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule_ner(&self, id: &str) -> ExtractionResult<Arc<RuleBasedNer>> {
        self.rule_ner
            .get_or_load(id, &self.loads, || Ok(Arc::new(RuleBasedNer::new()?)))
    }

    pub fn entity_model<F>(&self, id: &str, load: F) -> ExtractionResult<Arc<dyn EntityModel>>
    where
        F: FnOnce() -> ExtractionResult<Arc<dyn EntityModel>>,
    {
        self.entity_models.get_or_load(id, &self.loads, load)
    }

    pub fn relation_model<F>(&self, id: &str, load: F) -> ExtractionResult<Arc<dyn RelationModel>>
    where
        F: FnOnce() -> ExtractionResult<Arc<dyn RelationModel>>,
    {
        self.relation_models.get_or_load(id, &self.loads, load)
    }

    /// Installs an already-built entity model under its own id.
    pub fn register_entity_model(&self, model: Arc<dyn EntityModel>) {
        let id = model.id().to_string();
        self.entity_models.insert(&id, model);
    }

    pub fn register_relation_model(&self, model: Arc<dyn RelationModel>) {
        let id = model.id().to_string();
        self.relation_models.insert(&id, model);
    }

    /// Number of models constructed by this pool so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for ModelPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelPool")
            .field("loads", &self.load_count())
            .finish_non_exhaustive()
    }
}
