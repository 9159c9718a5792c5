use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use serde_json as json;

use crate::act::Act;

pub mod weighted;

/// Computes a score from the acts a run has completed so far.
pub trait Scorer: Send + Sync {
    fn score(&self, acts: &[Act]) -> Result<json::Value>;
}

#[derive(Clone, Default)]
pub struct Scorers {
    scorers: BTreeMap<String, Arc<dyn Scorer>>,
}

impl Scorers {
    pub fn builtin() -> Self {
        let mut scorers = Scorers::default();
        scorers.register("weighted", weighted::Weighted);
        scorers
    }

    pub fn register(&mut self, name: &str, scorer: impl Scorer + 'static) {
        self.scorers.insert(name.to_string(), Arc::new(scorer));
    }

    pub fn get(&self, name: &str) -> Option<&dyn Scorer> {
        self.scorers.get(name).map(|scorer| scorer.as_ref())
    }
}
