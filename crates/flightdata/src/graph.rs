//! Step dependency graph.
//!
//! Steps are wired by column name: an edge runs from the step producing a
//! column to every step reading it. Columns nobody produces are expected to
//! come from the parser, so the builder itself plays the role of the root.
//!
//! Execution starts one task per leaf (a step nothing depends on). A task
//! first drives the tasks of everything its step requires, each memoized so
//! a shared dependency runs once, then evaluates its own step. Step bodies
//! run on the blocking pool, at most `parallelism` at a time.
//!
//! A step that is inapplicable or fails is disabled along with everything
//! downstream of it. Disabling a mandatory step is fatal for the flight.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{OnceCell, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::builder::FlightBuilder;
use crate::error::{Error, Result};
use crate::steps::{already_satisfied, applicable, explain_applicability, ProcessStep, StepContext};
use crate::storage::SeriesKind;

#[derive(Debug)]
struct Node {
    step: Arc<dyn ProcessStep>,
    /// Producers this step reads from.
    requires: Vec<usize>,
    /// Consumers of this step's outputs.
    required_by: Vec<usize>,
}

/// A validated DAG of process steps for one flight.
#[derive(Debug)]
pub struct DependencyGraph {
    nodes: Vec<Node>,
    producers: HashMap<String, usize>,
}

impl DependencyGraph {
    /// Register `steps` and wire their edges.
    ///
    /// # Errors
    ///
    /// Fails if two steps produce the same column, the steps form a cycle,
    /// or a mandatory step depends on an optional one.
    pub fn new(steps: Vec<Arc<dyn ProcessStep>>) -> Result<Self> {
        let mut nodes: Vec<Node> = Vec::with_capacity(steps.len());
        let mut producers: HashMap<String, usize> = HashMap::new();

        for step in steps {
            let index = nodes.len();
            for column in step.outputs() {
                if let Some(&other) = producers.get(column) {
                    return Err(Error::DuplicateOutputColumn {
                        column: column.to_string(),
                        first: nodes[other].step.name().to_string(),
                        second: step.name().to_string(),
                    });
                }
                producers.insert(column.to_string(), index);
            }
            nodes.push(Node {
                step,
                requires: Vec::new(),
                required_by: Vec::new(),
            });
        }

        for consumer in 0..nodes.len() {
            let mut requires: Vec<usize> = nodes[consumer]
                .step
                .required_columns()
                .iter()
                .filter_map(|column| producers.get(*column).copied())
                .filter(|&producer| producer != consumer)
                .collect();
            requires.sort_unstable();
            requires.dedup();
            for &producer in &requires {
                nodes[producer].required_by.push(consumer);
            }
            nodes[consumer].requires = requires;
        }

        let graph = Self { nodes, producers };
        graph.check_acyclic()?;
        graph.check_mandatory()?;
        debug!(steps = graph.nodes.len(), "built dependency graph");
        Ok(graph)
    }

    /// Number of registered steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no steps are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Name of the step producing `column`, if any.
    #[must_use]
    pub fn producer_of(&self, column: &str) -> Option<&'static str> {
        self.producers.get(column).map(|&i| self.nodes[i].step.name())
    }

    /// Step names in an order that respects every dependency.
    #[must_use]
    pub fn topological_order(&self) -> Vec<&'static str> {
        self.kahn_order()
            .into_iter()
            .map(|i| self.nodes[i].step.name())
            .collect()
    }

    fn kahn_order(&self) -> Vec<usize> {
        let mut in_degree: Vec<usize> = self.nodes.iter().map(|n| n.requires.len()).collect();
        let mut queue: VecDeque<usize> = (0..self.nodes.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(node) = queue.pop_front() {
            order.push(node);
            for &next in &self.nodes[node].required_by {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }
        order
    }

    fn check_acyclic(&self) -> Result<()> {
        let order = self.kahn_order();
        if order.len() == self.nodes.len() {
            return Ok(());
        }
        let mut ordered = vec![false; self.nodes.len()];
        for i in order {
            ordered[i] = true;
        }
        let steps = self
            .nodes
            .iter()
            .zip(ordered)
            .filter(|(_, ok)| !ok)
            .map(|(n, _)| n.step.name().to_string())
            .collect();
        Err(Error::DependencyCycle { steps })
    }

    fn check_mandatory(&self) -> Result<()> {
        for node in self.nodes.iter().filter(|n| n.step.is_mandatory()) {
            if let Some(&optional) = node
                .requires
                .iter()
                .find(|&&p| !self.nodes[p].step.is_mandatory())
            {
                return Err(Error::OptionalDependency {
                    mandatory: node.step.name().to_string(),
                    optional: self.nodes[optional].step.name().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Run every step against `builder`.
    ///
    /// Recoverable step errors are added to the builder's warnings. Fatal
    /// errors, including disabled mandatory steps, are returned together.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FlightFailed`] carrying every fatal error.
    pub async fn execute(
        self,
        builder: Arc<FlightBuilder>,
        ctx: StepContext,
        parallelism: usize,
    ) -> Result<()> {
        let states = self.nodes.iter().map(|_| NodeState::default()).collect();
        let run = Arc::new(Execution {
            graph: self,
            builder,
            ctx,
            semaphore: Arc::new(Semaphore::new(parallelism.max(1))),
            states,
        });

        let mut leaves = JoinSet::new();
        for (index, node) in run.graph.nodes.iter().enumerate() {
            if node.required_by.is_empty() {
                leaves.spawn(Execution::run_node(Arc::clone(&run), index));
            }
        }
        while let Some(joined) = leaves.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "step task failed to complete");
                return Err(Error::FlightFailed {
                    errors: vec![Error::internal(format!("step task failed: {e}"))],
                });
            }
        }

        run.collect()
    }
}

#[derive(Debug)]
struct NodeState {
    enabled: AtomicBool,
    errors: Mutex<Vec<Error>>,
    done: OnceCell<()>,
}

impl Default for NodeState {
    fn default() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            errors: Mutex::new(Vec::new()),
            done: OnceCell::new(),
        }
    }
}

impl NodeState {
    fn record(&self, error: Error) {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(error);
    }
}

type NodeFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Debug)]
struct Execution {
    graph: DependencyGraph,
    builder: Arc<FlightBuilder>,
    ctx: StepContext,
    semaphore: Arc<Semaphore>,
    states: Vec<NodeState>,
}

impl Execution {
    /// Evaluate `index` exactly once, however many dependents ask for it.
    fn run_node(run: Arc<Self>, index: usize) -> NodeFuture {
        Box::pin(async move {
            run.states[index]
                .done
                .get_or_init(|| Arc::clone(&run).evaluate(index))
                .await;
        })
    }

    async fn evaluate(self: Arc<Self>, index: usize) {
        let node = &self.graph.nodes[index];
        let state = &self.states[index];

        let mut dependencies = JoinSet::new();
        for &dependency in &node.requires {
            dependencies.spawn(Self::run_node(Arc::clone(&self), dependency));
        }
        while let Some(joined) = dependencies.join_next().await {
            if let Err(e) = joined {
                state.record(Error::internal(format!("dependency task failed: {e}")));
                self.disable(index, "a dependency task failed");
            }
        }

        if !state.enabled.load(Ordering::Acquire) {
            return;
        }

        let step = Arc::clone(&node.step);
        if already_satisfied(step.as_ref(), &self.builder) {
            debug!(step = step.name(), "outputs already present, skipping");
            return;
        }
        if !applicable(step.as_ref(), &self.builder, &self.ctx) {
            let reason = explain_applicability(step.as_ref(), &self.builder, &self.ctx);
            self.disable(index, &reason);
            return;
        }

        let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                state.record(Error::internal(format!("step semaphore closed: {e}")));
                self.disable(index, "step semaphore closed");
                return;
            }
        };

        let builder = Arc::clone(&self.builder);
        let ctx = self.ctx.clone();
        let worker_step = Arc::clone(&step);
        let outcome = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            worker_step.compute(&builder, &ctx)?;
            register_outputs(worker_step.as_ref(), &builder, &ctx)
        })
        .await
        .unwrap_or_else(|e| Err(Error::internal(format!("step '{}' panicked: {e}", step.name()))));

        match outcome {
            Ok(()) => debug!(step = step.name(), "step computed"),
            Err(e) => {
                warn!(step = step.name(), error = %e, "step failed");
                let reason = e.to_string();
                state.record(e);
                self.disable(index, &reason);
            }
        }
    }

    /// Disable `index` and everything that transitively requires it.
    fn disable(&self, index: usize, reason: &str) {
        let mut pending = vec![(index, reason.to_string())];
        while let Some((current, reason)) = pending.pop() {
            let state = &self.states[current];
            if !state.enabled.swap(false, Ordering::AcqRel) {
                continue;
            }

            let step = &self.graph.nodes[current].step;
            if step.is_mandatory() {
                error!(step = step.name(), %reason, "mandatory step disabled");
                state.record(Error::fatal(format!(
                    "required step '{}' was disabled: {reason}",
                    step.name()
                )));
            } else {
                debug!(step = step.name(), %reason, "optional step disabled");
            }

            for &child in &self.graph.nodes[current].required_by {
                pending.push((
                    child,
                    format!("it depends on disabled step '{}'", step.name()),
                ));
            }
        }
    }

    /// Move recoverable errors into the builder and aggregate fatal ones.
    fn collect(&self) -> Result<()> {
        let mut fatal = Vec::new();
        for state in &self.states {
            let errors = std::mem::take(
                &mut *state.errors.lock().unwrap_or_else(PoisonError::into_inner),
            );
            for error in errors {
                if error.is_recoverable() {
                    self.builder.add_warning(error);
                } else {
                    fatal.push(error);
                }
            }
        }

        if fatal.is_empty() {
            info!(steps = self.graph.nodes.len(), "step graph complete");
            Ok(())
        } else {
            Err(Error::FlightFailed { errors: fatal })
        }
    }
}

fn register_outputs(step: &dyn ProcessStep, builder: &FlightBuilder, ctx: &StepContext) -> Result<()> {
    for column in step.outputs() {
        if let Some(series) = builder.numeric(column).filter(|s| !s.is_temporary()) {
            ctx.register_series(column, series.data_type(), SeriesKind::Numeric)?;
        } else if let Some(series) = builder.text(column).filter(|s| !s.is_temporary()) {
            ctx.register_series(column, series.data_type(), SeriesKind::Text)?;
        }
    }
    Ok(())
}
