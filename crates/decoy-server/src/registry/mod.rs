//! MappingRegistry - the shared mapping collection and the selection policy.
//!
//! Mappings live in a single insertion-ordered list behind a `RwLock`.
//! Resolution clones the list of `Arc`s under the read lock and scores the
//! snapshot without holding any lock, so concurrent registrations never
//! block or corrupt an in-flight resolution.

use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DecoyError, Result};
use crate::mapping::Mapping;
use crate::matching::RequestMatchResult;
use crate::request::RequestValue;
use crate::scenario::ScenarioStore;

/// A mapping together with the score it got for one request.
#[derive(Debug, Clone)]
pub struct MatchedMapping {
    pub mapping: Arc<Mapping>,
    pub result: RequestMatchResult,
}

/// Outcome of [`MappingRegistry::resolve`].
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Best mapping with a total score above zero
    pub matched: Option<MatchedMapping>,
    /// Best non-matching candidate, only computed when partial mapping is allowed
    pub partial: Option<MatchedMapping>,
}

impl Resolution {
    pub fn is_match(&self) -> bool {
        self.matched.is_some()
    }
}

/// Concurrent, insertion-ordered mapping store.
#[derive(Debug, Default)]
pub struct MappingRegistry {
    mappings: RwLock<Vec<Arc<Mapping>>>,
}

impl MappingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace by GUID. A replacement keeps the original slot and
    /// gets a fresh `updated_at`. Returns the stored mapping.
    pub fn register(&self, mut mapping: Mapping) -> Arc<Mapping> {
        mapping.updated_at = Utc::now();
        let guid = mapping.guid;
        let mapping = Arc::new(mapping);

        let mut mappings = self.mappings.write();
        match mappings.iter_mut().find(|existing| existing.guid == guid) {
            Some(slot) => {
                *slot = Arc::clone(&mapping);
                info!(guid = %guid, title = ?mapping.title, "Replaced mapping");
            }
            None => {
                mappings.push(Arc::clone(&mapping));
                info!(guid = %guid, title = ?mapping.title, priority = mapping.priority, "Registered mapping");
            }
        }
        mapping
    }

    /// Remove a mapping by GUID.
    pub fn unregister(&self, guid: Uuid) -> Result<Arc<Mapping>> {
        let mut mappings = self.mappings.write();
        let index = mappings
            .iter()
            .position(|m| m.guid == guid)
            .ok_or(DecoyError::MappingNotFound(guid))?;
        let removed = mappings.remove(index);
        info!(guid = %guid, "Removed mapping");
        Ok(removed)
    }

    /// Remove every mapping that is not permanent. Returns how many were removed.
    pub fn reset(&self) -> usize {
        let mut mappings = self.mappings.write();
        let before = mappings.len();
        mappings.retain(|m| m.is_permanent());
        let removed = before - mappings.len();
        info!(removed, kept = mappings.len(), "Reset mappings");
        removed
    }

    pub fn get(&self, guid: Uuid) -> Option<Arc<Mapping>> {
        self.mappings.read().iter().find(|m| m.guid == guid).cloned()
    }

    /// All mappings in registration order.
    pub fn list(&self) -> Vec<Arc<Mapping>> {
        self.snapshot()
    }

    pub fn len(&self) -> usize {
        self.mappings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.read().is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<Mapping>> {
        self.mappings.read().clone()
    }

    /// Select the best mapping for `request`.
    pub fn resolve(
        &self,
        request: &RequestValue,
        scenarios: &ScenarioStore,
        allow_partial: bool,
    ) -> Resolution {
        self.resolve_among(request, scenarios, allow_partial, |_| true)
    }

    /// Select the best mapping among those accepted by `filter`.
    ///
    /// Highest total score wins, then lowest priority, then earliest
    /// registration. A total score of zero is never served.
    pub fn resolve_among<F>(
        &self,
        request: &RequestValue,
        scenarios: &ScenarioStore,
        allow_partial: bool,
        filter: F,
    ) -> Resolution
    where
        F: Fn(&Mapping) -> bool,
    {
        let snapshot = self.snapshot();
        let scored: Vec<MatchedMapping> = snapshot
            .into_iter()
            .filter(|mapping| filter(mapping))
            .map(|mapping| {
                let result = mapping.score(request, scenarios);
                MatchedMapping { mapping, result }
            })
            .collect();

        let matched = select_best(scored.iter().filter(|c| c.result.is_match()), |c| {
            c.result.total_score()
        });

        let partial = if allow_partial && matched.is_none() {
            select_best(
                scored
                    .iter()
                    .filter(|c| !c.mapping.is_permanent())
                    .filter(|c| !c.result.is_match() && c.result.average_score() > 0.0),
                |c| c.result.average_score(),
            )
        } else {
            None
        };

        match (&matched, &partial) {
            (Some(m), _) => debug!(
                method = %request.method,
                path = %request.path,
                mapping = %m.mapping.display_name(),
                score = m.result.total_score(),
                candidates = scored.len(),
                "Resolved mapping"
            ),
            (None, Some(p)) => debug!(
                method = %request.method,
                path = %request.path,
                partial = %p.mapping.display_name(),
                score = p.result.average_score(),
                "No mapping matched; best partial candidate"
            ),
            (None, None) => debug!(
                method = %request.method,
                path = %request.path,
                candidates = scored.len(),
                "No mapping matched"
            ),
        }

        Resolution {
            matched: matched.cloned(),
            partial: partial.cloned(),
        }
    }
}

/// First candidate with the highest score, ties broken by lowest priority.
/// Iteration order is registration order, so strict comparisons keep the
/// earliest candidate on a full tie.
fn select_best<'a, I, S>(candidates: I, score: S) -> Option<&'a MatchedMapping>
where
    I: Iterator<Item = &'a MatchedMapping>,
    S: Fn(&MatchedMapping) -> f64,
{
    let mut best: Option<(&MatchedMapping, f64)> = None;
    for candidate in candidates {
        let candidate_score = score(candidate);
        let better = match best {
            None => true,
            Some((current, current_score)) => {
                candidate_score > current_score
                    || (candidate_score == current_score
                        && candidate.mapping.priority < current.mapping.priority)
            }
        };
        if better {
            best = Some((candidate, candidate_score));
        }
    }
    best.map(|(candidate, _)| candidate)
}
