//! Dependency resolution: producer/consumer graph, pre-flight checks, and
//! Kahn ordering.
//!
//! Edge `B -> A` exists whenever a path in `A.required_inputs` is in
//! `B.output_params`. Units are addressed by their declaration index so ties
//! break deterministically by registration order.

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;

use crate::core::error::EngineError;
use crate::core::registry::ParameterRegistry;
use crate::core::unit::UnitDescriptor;

/// Resolved execution plan over declaration indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    /// Topological order; ready ties go to the earliest declared unit.
    pub order: Vec<usize>,
    /// Kahn levels. Units within a level have no edges between them.
    pub levels: Vec<Vec<usize>>,
    /// Producers each unit depends on, sorted.
    pub dependencies: Vec<Vec<usize>>,
    /// Output path to its single producer, in declaration order.
    pub producers: IndexMap<String, usize>,
}

/// Run every static check and compute the order.
///
/// Checks run in order: duplicate producers, outputs colliding with
/// `ESTABLISHED` values, unresolvable inputs, cycles. The registry is only
/// read.
pub fn resolve(
    units: &[&UnitDescriptor],
    registry: &ParameterRegistry,
) -> Result<ExecutionPlan, EngineError> {
    let producers = index_producers(units)?;
    check_established_outputs(units, registry)?;
    check_resolvable(units, &producers, registry)?;

    let dependencies = build_dependencies(units, &producers);
    let order = kahn_order(&dependencies);
    if order.len() != units.len() {
        let cycle = find_cycle(&dependencies, &order)
            .into_iter()
            .map(|idx| units[idx].id.clone())
            .collect();
        return Err(EngineError::CyclicDependency { cycle });
    }
    let levels = kahn_levels(&dependencies);

    Ok(ExecutionPlan {
        order,
        levels,
        dependencies: dependencies
            .into_iter()
            .map(|deps| deps.into_iter().collect())
            .collect(),
        producers,
    })
}

fn index_producers(units: &[&UnitDescriptor]) -> Result<IndexMap<String, usize>, EngineError> {
    let mut all: IndexMap<&str, Vec<usize>> = IndexMap::new();
    for (idx, unit) in units.iter().enumerate() {
        for path in &unit.output_params {
            all.entry(path.as_str()).or_default().push(idx);
        }
    }

    let duplicate = all
        .iter()
        .filter(|(_, owners)| owners.len() > 1)
        .min_by_key(|(path, _)| **path);
    if let Some((path, owners)) = duplicate {
        return Err(EngineError::DuplicateProducer {
            path: path.to_string(),
            units: owners.iter().map(|idx| units[*idx].id.clone()).collect(),
        });
    }

    Ok(all
        .into_iter()
        .map(|(path, owners)| (path.to_string(), owners[0]))
        .collect())
}

fn check_established_outputs(
    units: &[&UnitDescriptor],
    registry: &ParameterRegistry,
) -> Result<(), EngineError> {
    for unit in units {
        if let Some(path) = unit
            .output_params
            .iter()
            .find(|path| registry.is_established(path))
        {
            return Err(EngineError::EstablishedOutput {
                unit_id: unit.id.clone(),
                path: path.clone(),
            });
        }
    }
    Ok(())
}

fn check_resolvable(
    units: &[&UnitDescriptor],
    producers: &IndexMap<String, usize>,
    registry: &ParameterRegistry,
) -> Result<(), EngineError> {
    for unit in units {
        let missing: Vec<String> = unit
            .required_inputs
            .iter()
            .filter(|path| !registry.has_param(path) && !producers.contains_key(path.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(EngineError::UnresolvableDependency {
                unit_id: unit.id.clone(),
                paths: missing,
            });
        }
    }
    Ok(())
}

fn build_dependencies(
    units: &[&UnitDescriptor],
    producers: &IndexMap<String, usize>,
) -> Vec<BTreeSet<usize>> {
    units
        .iter()
        .map(|unit| {
            unit.required_inputs
                .iter()
                .filter_map(|path| producers.get(path.as_str()).copied())
                .collect()
        })
        .collect()
}

fn dependents_of(dependencies: &[BTreeSet<usize>]) -> Vec<Vec<usize>> {
    let mut dependents = vec![Vec::new(); dependencies.len()];
    for (consumer, deps) in dependencies.iter().enumerate() {
        for producer in deps {
            dependents[*producer].push(consumer);
        }
    }
    dependents
}

/// Kahn's algorithm, always taking the lowest ready declaration index.
fn kahn_order(dependencies: &[BTreeSet<usize>]) -> Vec<usize> {
    let dependents = dependents_of(dependencies);
    let mut in_degree: Vec<usize> = dependencies.iter().map(BTreeSet::len).collect();
    let mut ready: BTreeSet<usize> = (0..dependencies.len())
        .filter(|idx| in_degree[*idx] == 0)
        .collect();

    let mut order = Vec::with_capacity(dependencies.len());
    while let Some(idx) = ready.pop_first() {
        order.push(idx);
        for consumer in &dependents[idx] {
            in_degree[*consumer] -= 1;
            if in_degree[*consumer] == 0 {
                ready.insert(*consumer);
            }
        }
    }
    order
}

/// Kahn levels (wavefronts), each sorted by declaration index.
fn kahn_levels(dependencies: &[BTreeSet<usize>]) -> Vec<Vec<usize>> {
    let dependents = dependents_of(dependencies);
    let mut in_degree: Vec<usize> = dependencies.iter().map(BTreeSet::len).collect();
    let mut current: Vec<usize> = (0..dependencies.len())
        .filter(|idx| in_degree[*idx] == 0)
        .collect();

    let mut levels = Vec::new();
    while !current.is_empty() {
        let mut next = Vec::new();
        for idx in &current {
            for consumer in &dependents[*idx] {
                in_degree[*consumer] -= 1;
                if in_degree[*consumer] == 0 {
                    next.push(*consumer);
                }
            }
        }
        next.sort_unstable();
        levels.push(current);
        current = next;
    }
    levels
}

/// Extract one concrete cycle from the units Kahn could not order.
///
/// Every unordered unit still has an unordered producer, so walking producers
/// from any of them must revisit a unit. Returned in dependency order.
fn find_cycle(dependencies: &[BTreeSet<usize>], ordered: &[usize]) -> Vec<usize> {
    let ordered: BTreeSet<usize> = ordered.iter().copied().collect();
    let Some(start) = (0..dependencies.len()).find(|idx| !ordered.contains(idx)) else {
        return Vec::new();
    };

    let mut walk = vec![start];
    let mut position = BTreeMap::from([(start, 0usize)]);
    let mut current = start;
    loop {
        let Some(producer) = dependencies[current]
            .iter()
            .copied()
            .find(|idx| !ordered.contains(idx))
        else {
            return walk;
        };
        if let Some(&pos) = position.get(&producer) {
            let mut cycle = walk[pos..].to_vec();
            cycle.reverse();
            return cycle;
        }
        position.insert(producer, walk.len());
        walk.push(producer);
        current = producer;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(id: &str, requires: &[&str], produces: &[&str]) -> UnitDescriptor {
        UnitDescriptor::new(id, "1").requires(requires).produces(produces)
    }

    fn resolve_all(
        units: &[UnitDescriptor],
        registry: &ParameterRegistry,
    ) -> Result<ExecutionPlan, EngineError> {
        let refs: Vec<&UnitDescriptor> = units.iter().collect();
        resolve(&refs, registry)
    }

    fn bootstrapped() -> ParameterRegistry {
        let mut registry = ParameterRegistry::new();
        registry.establish("topology.b3", 24.0, "bootstrap").expect("b3");
        registry
    }

    #[test]
    fn order_respects_producers_and_declaration_ties() {
        let units = vec![
            unit("consumer", &["mid.value"], &["out.value"]),
            unit("independent", &["topology.b3"], &["side.value"]),
            unit("producer", &["topology.b3"], &["mid.value"]),
        ];
        let plan = resolve_all(&units, &bootstrapped()).expect("plan");
        assert_eq!(plan.order, vec![1, 2, 0]);
        assert_eq!(plan.levels, vec![vec![1, 2], vec![0]]);
        assert_eq!(plan.dependencies[0], vec![2]);
        assert_eq!(plan.producers.get("mid.value"), Some(&2));
    }

    #[test]
    fn duplicate_producers_are_rejected() {
        let units = vec![
            unit("a", &[], &["shared.path", "a.only"]),
            unit("b", &[], &["shared.path"]),
        ];
        let err = resolve_all(&units, &ParameterRegistry::new()).expect_err("duplicate");
        assert_eq!(
            err,
            EngineError::DuplicateProducer {
                path: "shared.path".to_string(),
                units: vec!["a".to_string(), "b".to_string()],
            }
        );
    }

    #[test]
    fn outputs_may_not_shadow_established_values() {
        let units = vec![unit("a", &[], &["topology.b3"])];
        let err = resolve_all(&units, &bootstrapped()).expect_err("established");
        assert!(matches!(err, EngineError::EstablishedOutput { .. }));
    }

    #[test]
    fn unresolvable_inputs_are_rejected() {
        let units = vec![unit("needs-xy", &["x.y", "topology.b3"], &["z.w"])];
        let err = resolve_all(&units, &bootstrapped()).expect_err("unresolvable");
        assert_eq!(
            err,
            EngineError::UnresolvableDependency {
                unit_id: "needs-xy".to_string(),
                paths: vec!["x.y".to_string()],
            }
        );
    }

    #[test]
    fn cycles_name_their_units_in_dependency_order() {
        let units = vec![
            unit("root", &[], &["root.value"]),
            unit("a", &["b.value", "root.value"], &["a.value"]),
            unit("b", &["c.value"], &["b.value"]),
            unit("c", &["a.value"], &["c.value"]),
            unit("downstream", &["a.value"], &["d.value"]),
        ];
        let err = resolve_all(&units, &ParameterRegistry::new()).expect_err("cycle");
        match err {
            EngineError::CyclicDependency { cycle } => {
                assert_eq!(cycle, vec!["c".to_string(), "b".to_string(), "a".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    /// Producers already present as non-established values still order first.
    #[test]
    fn derived_values_in_registry_do_not_remove_edges() {
        let mut registry = ParameterRegistry::new();
        registry.set_param("mid.value", 1.0, "stale").expect("stale");
        let units = vec![
            unit("consumer", &["mid.value"], &["out.value"]),
            unit("producer", &[], &["mid.value"]),
        ];
        let plan = resolve_all(&units, &registry).expect("plan");
        assert_eq!(plan.order, vec![1, 0]);
    }
}
