// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Priority-ordered emission.
//!
//! Every job announces the IDs it consumes before it runs. Jobs are popped in
//! order of descending priority, then insertion order. A job whose consumed IDs
//! are not all bound yet is parked on the first missing one and re-queued, with
//! its original priority and position, as soon as a variable for that ID is
//! created. An empty queue with parked jobs left over is a deadlock.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};
use std::fmt;

use fw_config_core::ConfigValue;
use tracing::{debug, trace};

use crate::emit::EmitContext;
use crate::error::{CoreError, Result};

type JobFn = Box<dyn FnOnce(&mut EmitContext) -> Result<()>>;

/// One unit of emission work.
pub struct Job {
    label: String,
    priority: f64,
    consumes: Vec<String>,
    run: JobFn,
}

impl Job {
    pub fn new<F>(label: impl Into<String>, priority: f64, consumes: Vec<String>, run: F) -> Self
    where
        F: FnOnce(&mut EmitContext) -> Result<()> + 'static,
    {
        Self {
            label: label.into(),
            priority,
            consumes,
            run: Box::new(run),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("label", &self.label)
            .field("priority", &self.priority)
            .field("consumes", &self.consumes)
            .finish_non_exhaustive()
    }
}

/// IDs a validated fragment declares and the ones it needs from elsewhere.
///
/// Consumed IDs are named references plus the `id(...)` uses of lambdas,
/// minus anything the fragment declares itself, in order of appearance.
pub fn announced_ids(fragment: &ConfigValue) -> (Vec<String>, Vec<String>) {
    fn walk(value: &ConfigValue, produces: &mut Vec<String>, consumes: &mut Vec<String>) {
        match value {
            ConfigValue::Id(id) => {
                if let Some(name) = id.name() {
                    let list = if id.is_declaration() { &mut *produces } else { &mut *consumes };
                    if !list.iter().any(|n| n == name) {
                        list.push(name.to_string());
                    }
                }
            }
            ConfigValue::Lambda(lambda) => {
                for name in lambda.requires_ids() {
                    if !consumes.contains(name) {
                        consumes.push(name.clone());
                    }
                }
            }
            ConfigValue::Mapping(map) => map.values().for_each(|v| walk(v, produces, consumes)),
            ConfigValue::Sequence(items) => items.iter().for_each(|v| walk(v, produces, consumes)),
            _ => {}
        }
    }

    let mut produces = Vec::new();
    let mut consumes = Vec::new();
    walk(fragment, &mut produces, &mut consumes);
    consumes.retain(|name| !produces.contains(name));
    (produces, consumes)
}

struct Queued {
    seq: u64,
    job: Job,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    // Max-heap: higher priority first, then lower sequence number.
    fn cmp(&self, other: &Self) -> Ordering {
        self.job
            .priority
            .total_cmp(&other.job.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Drains emission jobs into an [`EmitContext`].
#[derive(Default)]
pub struct Scheduler {
    queue: BinaryHeap<Queued>,
    parked: BTreeMap<String, Vec<Queued>>,
    next_seq: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, job: Job) {
        let seq = self.next_seq;
        self.next_seq += 1;
        trace!(job = %job.label, priority = job.priority, seq, "Queued job");
        self.queue.push(Queued { seq, job });
    }

    pub fn len(&self) -> usize {
        self.queue.len() + self.parked.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every job. Jobs deferred by a running job join the queue.
    pub fn run(mut self, ctx: &mut EmitContext) -> Result<()> {
        while let Some(entry) = self.queue.pop() {
            let missing = entry
                .job
                .consumes
                .iter()
                .find(|id| !ctx.model().has_variable(id))
                .cloned();
            if let Some(id) = missing {
                trace!(job = %entry.job.label, id = %id, "Waiting for variable");
                self.parked.entry(id).or_default().push(entry);
                continue;
            }

            let bound_before = ctx.model().variable_ids().len();
            let Queued { seq, job } = entry;
            debug!(job = %job.label, priority = job.priority, seq, "Running job");
            ctx.set_component(&job.label);
            (job.run)(ctx).map_err(|source| CoreError::Emission {
                component: job.label.clone(),
                source: Box::new(source),
            })?;

            for deferred in ctx.take_deferred() {
                self.push(deferred);
            }
            let bound: Vec<String> = ctx.model().variable_ids()[bound_before..].to_vec();
            for id in bound {
                if let Some(waiting) = self.parked.remove(&id) {
                    trace!(id = %id, woken = waiting.len(), "Variable bound");
                    for entry in waiting {
                        self.queue.push(entry);
                    }
                }
            }
        }

        match self.parked.into_iter().next() {
            None => Ok(()),
            Some((id, waiting)) => {
                let labels: BTreeSet<String> = waiting.into_iter().map(|q| q.job.label).collect();
                Err(CoreError::Deadlock {
                    id,
                    waiting: labels.into_iter().collect(),
                })
            }
        }
    }
}
