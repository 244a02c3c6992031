//! Scenario state machine.
//!
//! A scenario is a named state shared by the mappings that declare it. Rows
//! are created lazily on the first execution of such a mapping and only change
//! after a response has been produced. Reads are lock-free per shard; a
//! transition holds the row's shard lock for its whole check-and-set, so two
//! requests racing on the same scenario cannot both move it.

use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;

use crate::matchers::scores;

/// Current state of one scenario.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScenarioState {
    pub name: String,
    /// State the next eligible mapping must declare in `WhenStateIs`
    pub next_state: Option<String>,
    pub started: bool,
    pub finished: bool,
    /// Executions of any mapping in this scenario
    pub counter: u64,
    /// Executions seen in the current state; reset on every transition
    #[serde(skip)]
    pub(crate) times_in_state: u32,
}

impl ScenarioState {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            next_state: None,
            started: false,
            finished: false,
            counter: 0,
            times_in_state: 0,
        }
    }
}

/// The scenario part of a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScenarioStep<'a> {
    pub scenario: &'a str,
    pub when_state_is: Option<&'a str>,
    pub set_state_to: Option<&'a str>,
    /// Executions required in the current state before `set_state_to` applies
    pub times_in_same_state: Option<u32>,
}

/// Scenario rows keyed by name.
#[derive(Debug, Default)]
pub struct ScenarioStore {
    states: DashMap<String, ScenarioState>,
}

impl ScenarioStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<ScenarioState> {
        self.states.get(name).map(|row| row.clone())
    }

    /// All scenarios, ordered by name.
    pub fn list(&self) -> Vec<ScenarioState> {
        let mut states: Vec<ScenarioState> =
            self.states.iter().map(|row| row.value().clone()).collect();
        states.sort_by(|a, b| a.name.cmp(&b.name));
        states
    }

    /// Scenario dimension score: 1.0 when the scenario currently sits in the
    /// state the step requires (no row and no required state is the start case).
    pub fn score(&self, step: &ScenarioStep<'_>) -> f64 {
        let current_matches = match self.states.get(step.scenario) {
            Some(row) => row.next_state.as_deref() == step.when_state_is,
            None => step.when_state_is.is_none(),
        };
        scores::from_bool(current_matches)
    }

    /// Apply the post-execution transition and return the resulting row.
    ///
    /// The counter always increments. The state only moves when it still
    /// equals `when_state_is`; a request that lost a race against another
    /// transition leaves the state alone.
    pub fn advance(&self, step: &ScenarioStep<'_>) -> ScenarioState {
        let mut row = self
            .states
            .entry(step.scenario.to_string())
            .or_insert_with(|| ScenarioState::new(step.scenario));

        row.counter += 1;
        row.started = true;

        if row.next_state.as_deref() != step.when_state_is {
            debug!(
                "Scenario '{}' moved to {:?} concurrently; not applying transition",
                step.scenario, row.next_state
            );
            return row.clone();
        }

        match step.set_state_to {
            Some(next) => {
                row.times_in_state += 1;
                let due = step
                    .times_in_same_state
                    .map_or(true, |required| row.times_in_state >= required);
                if due {
                    debug!(
                        "Scenario '{}': {:?} -> '{}'",
                        step.scenario, row.next_state, next
                    );
                    row.next_state = Some(next.to_string());
                    row.times_in_state = 0;
                }
            }
            None => {
                debug!("Scenario '{}' finished", step.scenario);
                row.finished = true;
            }
        }

        row.clone()
    }

    pub fn reset(&self) {
        self.states.clear();
    }

    pub fn reset_scenario(&self, name: &str) -> bool {
        self.states.remove(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn step<'a>(when: Option<&'a str>, set: Option<&'a str>) -> ScenarioStep<'a> {
        ScenarioStep {
            scenario: "s",
            when_state_is: when,
            set_state_to: set,
            times_in_same_state: None,
        }
    }

    #[test]
    fn test_start_state_scores_until_first_transition() {
        let store = ScenarioStore::new();
        let start = step(None, Some("X"));
        let gated = step(Some("X"), None);

        assert_eq!(store.score(&start), 1.0);
        assert_eq!(store.score(&gated), 0.0);

        store.advance(&start);
        assert_eq!(store.score(&start), 0.0);
        assert_eq!(store.score(&gated), 1.0);

        let state = store.get("s").unwrap();
        assert_eq!(state.next_state.as_deref(), Some("X"));
        assert!(state.started);
        assert!(!state.finished);
        assert_eq!(state.counter, 1);
    }

    #[test]
    fn test_terminal_step_finishes_without_changing_state() {
        let store = ScenarioStore::new();
        store.advance(&step(None, Some("X")));
        let state = store.advance(&step(Some("X"), None));

        assert!(state.finished);
        assert_eq!(state.next_state.as_deref(), Some("X"));
        assert_eq!(state.counter, 2);
        assert_eq!(store.score(&step(None, Some("X"))), 0.0);
    }

    #[test]
    fn test_times_in_same_state() {
        let store = ScenarioStore::new();
        let step = ScenarioStep {
            times_in_same_state: Some(3),
            ..step(None, Some("done"))
        };

        store.advance(&step);
        store.advance(&step);
        assert_eq!(store.get("s").unwrap().next_state, None);
        assert_eq!(store.score(&step), 1.0);

        store.advance(&step);
        let state = store.get("s").unwrap();
        assert_eq!(state.next_state.as_deref(), Some("done"));
        assert_eq!(state.counter, 3);
        assert_eq!(state.times_in_state, 0);
    }

    #[test]
    fn test_stale_transition_only_counts() {
        let store = ScenarioStore::new();
        store.advance(&step(None, Some("A")));
        let state = store.advance(&step(None, Some("B")));

        assert_eq!(state.next_state.as_deref(), Some("A"));
        assert_eq!(state.counter, 2);
    }

    #[test]
    fn test_concurrent_advance_moves_state_once() {
        let store = Arc::new(ScenarioStore::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store.advance(&step(None, Some("next")));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let state = store.get("s").unwrap();
        assert_eq!(state.next_state.as_deref(), Some("next"));
        assert_eq!(state.counter, 16);
        assert_eq!(state.times_in_state, 0);
    }

    #[test]
    fn test_list_and_reset() {
        let store = ScenarioStore::new();
        store.advance(&ScenarioStep {
            scenario: "b",
            ..step(None, Some("1"))
        });
        store.advance(&ScenarioStep {
            scenario: "a",
            ..step(None, Some("1"))
        });

        let names: Vec<String> = store.list().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["a", "b"]);

        assert!(store.reset_scenario("a"));
        assert_eq!(store.len(), 1);
        store.reset();
        assert!(store.is_empty());
    }
}
