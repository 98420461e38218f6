//! Executor (component C7) — the scheduler core.
//!
//! Drives the per-step protocol of §4.7 against a [`crate::graph::Graph`]:
//! condition evaluation and its `condition_process` overrides, recognition,
//! action dispatch, and the successor search with its poll-wait/timeout
//! loop. Single-threaded and synchronous — a blocking collaborator call
//! blocks the whole engine, matching §5's stated scheduling model.

use std::time::Duration;

use ahash::AHashSet;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::action::ResolvedArgs;
use crate::collaborators::{Clock, InputBackend, LogSink, VisionBackend};
use crate::control::{Control, ExecutorState};
use crate::expr::{evaluate_condition, interpolate};
use crate::graph::Graph;
use crate::node::Node;
use crate::variable::VariableStore;

/// How often the successor-search poll loop retries candidate recognition
/// (§4.7(7c), ~100 ms in the source).
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// The outcome of processing one node for one step: either a transition to
/// a named successor, or a terminal stop.
enum StepOutcome {
    Next(String),
    Stopped,
}

/// Drives one execution of a [`Graph`] from a named entry point.
///
/// Owns the variable store exclusively — per §5, no other thread reads or
/// writes it. [`Executor::control`] returns a handle the embedder can use
/// from another thread to stop/suspend/resume and to register observers
/// without touching node state directly.
pub struct Executor {
    graph: Graph,
    store: VariableStore,
    control: std::sync::Arc<Control>,
    rng: ChaCha8Rng,
    visited_var_nodes: AHashSet<String>,
    current_node: Option<String>,
}

impl Executor {
    /// Builds an executor for `graph`, seeding the variable store from its
    /// `var_global` definitions. The coordinate-jitter RNG is seeded from
    /// OS entropy; use [`Executor::with_seed`] for reproducible tests.
    #[must_use]
    pub fn new(graph: Graph) -> Self {
        let mut store = VariableStore::new();
        store.parse_definitions(graph.var_global.iter().map(String::as_str));
        Self {
            graph,
            store,
            control: std::sync::Arc::new(Control::new()),
            rng: ChaCha8Rng::from_entropy(),
            visited_var_nodes: AHashSet::default(),
            current_node: None,
        }
    }

    /// As [`Executor::new`], but with an explicit RNG seed — every
    /// `rand() % w`-style coordinate resolution becomes reproducible.
    #[must_use]
    pub fn with_seed(graph: Graph, seed: u64) -> Self {
        let mut executor = Self::new(graph);
        executor.rng = ChaCha8Rng::seed_from_u64(seed);
        executor
    }

    /// A cloneable handle for stopping/suspending/resuming this executor
    /// and registering observers from another thread.
    #[must_use]
    pub fn control(&self) -> std::sync::Arc<Control> {
        std::sync::Arc::clone(&self.control)
    }

    #[must_use]
    pub fn state(&self) -> ExecutorState {
        self.control.state()
    }

    #[must_use]
    pub fn current_node_name(&self) -> Option<&str> {
        self.current_node.as_deref()
    }

    #[must_use]
    pub fn variables(&self) -> &VariableStore {
        &self.store
    }

    /// Runs the graph from `start_name` to completion — a terminal `Stopped`
    /// state, per the exit conditions in §6. Returns the final state.
    pub fn run(
        &mut self,
        start_name: &str,
        vision: &mut impl VisionBackend,
        input: &mut impl InputBackend,
        log: &mut impl LogSink,
        clock: &impl Clock,
    ) -> ExecutorState {
        self.control.start();
        if self.graph.get(start_name).is_none() {
            self.control.stop();
            return self.control.state();
        }
        self.current_node = Some(start_name.to_owned());

        loop {
            // Step 9: the single cooperative yield point, checked before
            // every step rather than only after one — a `suspend()` landing
            // between a step's end and this check must still be caught here
            // instead of racing the loop into exiting on a stray `Suspended`.
            match self.control.state() {
                ExecutorState::Stopped => break,
                ExecutorState::Suspended => {
                    self.control.park_while_suspended();
                    continue;
                }
                ExecutorState::Running => {}
            }

            let node_name = self
                .current_node
                .clone()
                .expect("Running state implies a current node");

            match self.step(&node_name, vision, input, log, clock) {
                StepOutcome::Next(next) => self.current_node = Some(next),
                StepOutcome::Stopped => {
                    self.control.stop();
                    self.current_node = None;
                    break;
                }
            }
        }

        self.control.state()
    }

    fn step(
        &mut self,
        node_name: &str,
        vision: &mut impl VisionBackend,
        input: &mut impl InputBackend,
        log: &mut impl LogSink,
        clock: &impl Clock,
    ) -> StepOutcome {
        let Some(mut node) = self.graph.get(node_name).cloned() else {
            return StepOutcome::Stopped;
        };

        // 1. Disabled nodes stop the run outright.
        if !node.enabled {
            return StepOutcome::Stopped;
        }

        // 2. Apply this node's `var` definitions on first visit only.
        if self.visited_var_nodes.insert(node.name.clone()) {
            self.store.parse_definitions(node.var_definitions.iter().map(String::as_str));
        }

        // 3. Evaluate the condition (absent condition is vacuously true).
        let condition_result = node
            .condition
            .as_deref()
            .map_or(true, |c| evaluate_condition(&self.store, c));

        // 4. Clear and reinstall overrides for this step, run var_operation
        // and condition_log through the expression engine.
        node.clear_overrides();
        let (var_operation, condition_log) = node.apply_condition_process(condition_result);
        if let Some(op) = &var_operation {
            interpolate(&mut self.store, op);
        }
        if let Some(tmpl) = &condition_log {
            let rendered = interpolate(&mut self.store, tmpl);
            log.log(&rendered);
        }
        // Persist the override state for this step so an embedder
        // inspecting the graph after `run` sees this step's projection.
        self.graph.nodes.insert(node_name.to_owned(), node.clone());

        // 5. A false condition skips recognition entirely.
        if !condition_result {
            return match node.effective_interrupt().first().or_else(|| node.effective_next().first()) {
                Some(next) => StepOutcome::Next(next.clone()),
                None => StepOutcome::Stopped,
            };
        }

        // 6. Recognize, after the node's pre-recognition settle delay.
        if node.pre_delay_ms > 0 {
            clock.sleep(Duration::from_millis(node.pre_delay_ms));
        }
        let result = node.recognition.evaluate(vision);

        // 7. Successful recognition dispatches the action.
        if result.success {
            let resolved = node.action.resolve(&mut self.store, &mut self.rng, &result);
            let action_success = match &resolved {
                Some(ResolvedArgs::StopTask { reason }) => {
                    self.control.request_stop(&node.name, reason);
                    true
                }
                Some(args) => input.perform(args),
                None => false,
            };
            // Post-action settle delay, regardless of the action's outcome.
            if node.post_delay_ms > 0 {
                clock.sleep(Duration::from_millis(node.post_delay_ms));
            }
            self.control.notify_node_event(&node.name, action_success);
            if let Some(tmpl) = node.log_for(action_success) {
                let rendered = interpolate(&mut self.store, tmpl);
                log.log(&rendered);
            }

            if !action_success {
                return on_error_or_stop(&node);
            }
            if matches!(resolved, Some(ResolvedArgs::StopTask { .. })) {
                return StepOutcome::Stopped;
            }
            if node.effective_next().is_empty() {
                return StepOutcome::Stopped;
            }
            return self.search_successor(&node, vision, clock);
        }

        // 8. Failed recognition.
        on_error_or_stop(&node)
    }

    /// Step 7c: scans `effective_next` then `effective_interrupt` for a
    /// candidate whose own recognition succeeds, polling every
    /// [`POLL_INTERVAL`] until a winner is found, the run is stopped, or
    /// `node.timeout_ms` elapses. All timing goes through `clock` so tests
    /// can drive it with a [`crate::collaborators::FakeClock`].
    fn search_successor(&mut self, node: &Node, vision: &mut impl VisionBackend, clock: &impl Clock) -> StepOutcome {
        let start = clock.now();
        loop {
            if let Some(next) = self.scan_candidates(node.effective_next(), vision) {
                return StepOutcome::Next(next);
            }
            if let Some(next) = self.scan_candidates(node.effective_interrupt(), vision) {
                return StepOutcome::Next(next);
            }

            match self.control.state() {
                ExecutorState::Stopped => return StepOutcome::Stopped,
                ExecutorState::Suspended => {
                    self.control.park_while_suspended();
                    continue;
                }
                ExecutorState::Running => {}
            }

            if clock.now().saturating_duration_since(start) > Duration::from_millis(node.timeout_ms) {
                return on_error_or_stop(node);
            }

            clock.sleep(POLL_INTERVAL);
        }
    }

    /// Scans `names` in order for a candidate that is enabled and whose own
    /// recognition succeeds (§4.7(7c): each candidate is asked with its own
    /// recognition, not the departing node's).
    fn scan_candidates(&self, names: &[String], vision: &mut impl VisionBackend) -> Option<String> {
        for name in names {
            let Some(candidate) = self.graph.get(name) else { continue };
            if !candidate.enabled {
                continue;
            }
            if candidate.recognition.evaluate(vision).success {
                return Some(name.clone());
            }
        }
        None
    }
}

fn on_error_or_stop(node: &Node) -> StepOutcome {
    match node.on_error.first() {
        Some(name) => StepOutcome::Next(name.clone()),
        None => StepOutcome::Stopped,
    }
}
