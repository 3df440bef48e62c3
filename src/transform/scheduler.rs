//! Topological ordering of transformers.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::error::ScheduleError;
use crate::transform::{Transformer, TransformerScope};

/// Execution order as indices into the registered transformer list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    pub document: Vec<usize>,
    pub global: Vec<usize>,
}

/// Order `transformers` per scope so every `before`/`after` constraint holds.
///
/// Ties are broken by registration order. Fails on duplicate names or on a
/// cycle within a scope.
pub fn schedule(transformers: &[Box<dyn Transformer>]) -> Result<Schedule, ScheduleError> {
    let mut seen = HashSet::new();
    for t in transformers {
        if !seen.insert(t.name()) {
            return Err(ScheduleError::DuplicateTransformer {
                name: t.name().to_string(),
            });
        }
    }

    let schedule = Schedule {
        document: order_scope(transformers, TransformerScope::Document)?,
        global: order_scope(transformers, TransformerScope::Global)?,
    };
    tracing::debug!(
        document = ?names(transformers, &schedule.document),
        global = ?names(transformers, &schedule.global),
        "transformer order"
    );
    Ok(schedule)
}

fn names(transformers: &[Box<dyn Transformer>], order: &[usize]) -> Vec<&'static str> {
    order.iter().map(|&i| transformers[i].name()).collect()
}

fn order_scope(
    transformers: &[Box<dyn Transformer>],
    scope: TransformerScope,
) -> Result<Vec<usize>, ScheduleError> {
    let members: Vec<usize> = (0..transformers.len())
        .filter(|&i| transformers[i].scope() == scope)
        .collect();
    let by_name: HashMap<&str, usize> = members
        .iter()
        .map(|&i| (transformers[i].name(), i))
        .collect();

    let mut successors: HashMap<usize, BTreeSet<usize>> = HashMap::new();
    for &i in &members {
        let t = &transformers[i];
        for name in t.before() {
            if let Some(&j) = by_name.get(name) {
                successors.entry(i).or_default().insert(j);
            }
        }
        for name in t.after() {
            if let Some(&j) = by_name.get(name) {
                successors.entry(j).or_default().insert(i);
            }
        }
    }

    let mut in_degree: HashMap<usize, usize> = members.iter().map(|&i| (i, 0)).collect();
    for targets in successors.values() {
        for j in targets {
            if let Some(d) = in_degree.get_mut(j) {
                *d += 1;
            }
        }
    }

    let mut ready: BTreeSet<usize> = members
        .iter()
        .copied()
        .filter(|i| in_degree[i] == 0)
        .collect();
    let mut order = Vec::with_capacity(members.len());
    while let Some(i) = ready.pop_first() {
        order.push(i);
        for j in successors.get(&i).into_iter().flatten() {
            if let Some(d) = in_degree.get_mut(j) {
                *d -= 1;
                if *d == 0 {
                    ready.insert(*j);
                }
            }
        }
    }

    if order.len() != members.len() {
        let transformers = members
            .iter()
            .filter(|&&i| in_degree[&i] > 0)
            .map(|&i| transformers[i].name().to_string())
            .collect();
        return Err(ScheduleError::DependencyCycle {
            scope: scope.to_string(),
            transformers,
        });
    }
    Ok(order)
}
