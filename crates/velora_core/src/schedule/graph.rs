//! # Layered Dependency Scheduling
//!
//! Turns a set of systems with named dependencies into an ordered sequence of
//! layers (topological generations):
//!
//! ```text
//!   A ──► B ──► D
//!   └───► C ──┘
//!
//!   layer 0: [A]
//!   layer 1: [B, C]   ← mutually independent, run concurrently
//!   layer 2: [D]
//! ```
//!
//! Every system of a layer has all of its dependencies in strictly earlier
//! layers, and no two systems of a layer depend on each other. The graph is
//! rebuilt from the declared name lists each time a schedule is built.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::debug;

use super::system::System;
use crate::error::{EcsError, EcsResult};

/// One generation of mutually independent systems.
pub type Layer = Vec<Arc<dyn System>>;

/// Performs a layered topological sort (Kahn's algorithm, by generation).
///
/// The whole current frontier is drained as one layer; dependents whose
/// in-degree reaches zero go to the next layer. Layer order is deterministic
/// for a given graph; within a layer, systems keep their registration order,
/// which callers must not rely on.
///
/// # Errors
///
/// - [`EcsError::DuplicateSystem`] if two systems share a name
/// - [`EcsError::UnknownDependency`] if a dependency names no system
/// - [`EcsError::CycleDetected`] if the graph is not a DAG
pub fn topological_sort_layers(systems: &[Arc<dyn System>]) -> EcsResult<Vec<Layer>> {
    let mut index_of: HashMap<&str, usize> = HashMap::with_capacity(systems.len());
    for (index, system) in systems.iter().enumerate() {
        if index_of.insert(system.name(), index).is_some() {
            return Err(EcsError::DuplicateSystem(system.name().to_string()));
        }
    }

    // Edge dependency → dependent.
    let mut in_degree = vec![0_usize; systems.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); systems.len()];

    for (index, system) in systems.iter().enumerate() {
        // A repeated dependency name is one edge.
        let mut seen = HashSet::new();
        for dependency in system.dependencies() {
            let Some(&from) = index_of.get(dependency) else {
                return Err(EcsError::UnknownDependency {
                    system: system.name().to_string(),
                    dependency: dependency.to_string(),
                });
            };
            if seen.insert(from) {
                dependents[from].push(index);
                in_degree[index] += 1;
            }
        }
    }

    let mut frontier: VecDeque<usize> = (0..systems.len())
        .filter(|&index| in_degree[index] == 0)
        .collect();
    let mut layers: Vec<Layer> = Vec::new();

    while !frontier.is_empty() {
        let layer_size = frontier.len();
        let mut layer = Vec::with_capacity(layer_size);
        let mut next: Vec<usize> = Vec::new();

        for _ in 0..layer_size {
            let Some(index) = frontier.pop_front() else {
                break;
            };
            layer.push(Arc::clone(&systems[index]));

            for &dependent in &dependents[index] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    next.push(dependent);
                }
            }
        }

        next.sort_unstable();
        frontier.extend(next);
        layers.push(layer);
    }

    let blocked: Vec<String> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, &degree)| degree != 0)
        .map(|(index, _)| systems[index].name().to_string())
        .collect();
    if !blocked.is_empty() {
        return Err(EcsError::CycleDetected { systems: blocked });
    }

    Ok(layers)
}

/// A precomputed layer sequence for one scheduling domain.
#[derive(Clone, Default)]
pub struct Schedule {
    layers: Vec<Layer>,
}

impl Schedule {
    /// Builds the layer sequence for `systems`.
    ///
    /// # Errors
    ///
    /// Fails on duplicate names, unknown dependencies and cycles; see
    /// [`topological_sort_layers`].
    pub fn new(systems: &[Arc<dyn System>]) -> EcsResult<Self> {
        let layers = topological_sort_layers(systems)?;
        for (depth, layer) in layers.iter().enumerate() {
            debug!("--- system layer {} ---", depth);
            for system in layer {
                debug!("{}", system.name());
            }
        }
        Ok(Self { layers })
    }

    /// A schedule with no systems.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// The layers, in execution order.
    #[must_use]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Number of layers.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Total number of systems.
    #[must_use]
    pub fn system_count(&self) -> usize {
        self.layers.iter().map(Vec::len).sum()
    }

    /// Returns `true` if the schedule runs nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Finds a system by name.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownSystem`] if no system has that name.
    pub fn system(&self, name: &str) -> EcsResult<&Arc<dyn System>> {
        self.layers
            .iter()
            .flatten()
            .find(|system| system.name() == name)
            .ok_or_else(|| EcsError::UnknownSystem(name.to_string()))
    }

    /// Index of the layer containing the named system.
    #[must_use]
    pub fn layer_of(&self, name: &str) -> Option<usize> {
        self.layers
            .iter()
            .position(|layer| layer.iter().any(|system| system.name() == name))
    }

    /// System names per layer.
    #[must_use]
    pub fn layer_names(&self) -> Vec<Vec<String>> {
        self.layers
            .iter()
            .map(|layer| layer.iter().map(|s| s.name().to_string()).collect())
            .collect()
    }
}

impl std::fmt::Debug for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schedule")
            .field("layers", &self.layer_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::system::SystemContext;
    use async_trait::async_trait;

    struct Named {
        name: &'static str,
        deps: Vec<&'static str>,
    }

    #[async_trait]
    impl System for Named {
        fn name(&self) -> &str {
            self.name
        }

        fn dependencies(&self) -> Vec<&str> {
            self.deps.clone()
        }

        async fn run(&self, _ctx: SystemContext) -> EcsResult<()> {
            Ok(())
        }
    }

    fn sys(name: &'static str, deps: &[&'static str]) -> Arc<dyn System> {
        Arc::new(Named {
            name,
            deps: deps.to_vec(),
        })
    }

    fn sorted(layer: &[String]) -> Vec<String> {
        let mut layer = layer.to_vec();
        layer.sort();
        layer
    }

    #[test]
    fn test_diamond_layers() {
        let systems = vec![
            sys("A", &[]),
            sys("B", &["A"]),
            sys("C", &["A"]),
            sys("D", &["B", "C"]),
        ];
        let schedule = Schedule::new(&systems).unwrap();
        let names = schedule.layer_names();
        assert_eq!(names.len(), 3);
        assert_eq!(names[0], vec!["A"]);
        assert_eq!(sorted(&names[1]), vec!["B", "C"]);
        assert_eq!(names[2], vec!["D"]);
    }

    #[test]
    fn test_registration_order_does_not_matter() {
        let systems = vec![
            sys("D", &["B", "C"]),
            sys("C", &["A"]),
            sys("B", &["A"]),
            sys("A", &[]),
        ];
        let schedule = Schedule::new(&systems).unwrap();
        assert_eq!(schedule.layer_of("A"), Some(0));
        assert_eq!(schedule.layer_of("B"), Some(1));
        assert_eq!(schedule.layer_of("C"), Some(1));
        assert_eq!(schedule.layer_of("D"), Some(2));
    }

    #[test]
    fn test_independent_systems_share_first_layer() {
        let systems = vec![sys("X", &[]), sys("Y", &[]), sys("Z", &[])];
        let layers = topological_sort_layers(&systems).unwrap();
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].len(), 3);
    }

    #[test]
    fn test_two_cycle_detected() {
        let systems = vec![sys("A", &["B"]), sys("B", &["A"])];
        let err = topological_sort_layers(&systems).err().unwrap();
        assert_eq!(
            err,
            EcsError::CycleDetected {
                systems: vec!["A".into(), "B".into()]
            }
        );
    }

    #[test]
    fn test_cycle_behind_valid_prefix_detected() {
        let systems = vec![
            sys("Root", &[]),
            sys("P", &["Root", "R"]),
            sys("Q", &["P"]),
            sys("R", &["Q"]),
        ];
        match topological_sort_layers(&systems) {
            Err(EcsError::CycleDetected { systems }) => {
                assert_eq!(systems, vec!["P", "Q", "R"]);
            }
            other => panic!("expected cycle, got {:?}", other.map(|l| l.len())),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let systems = vec![sys("Loop", &["Loop"])];
        assert!(matches!(
            topological_sort_layers(&systems),
            Err(EcsError::CycleDetected { .. })
        ));
    }

    #[test]
    fn test_unknown_dependency() {
        let systems = vec![sys("Visual", &["PositionSystem"])];
        assert_eq!(
            topological_sort_layers(&systems).err().unwrap(),
            EcsError::UnknownDependency {
                system: "Visual".into(),
                dependency: "PositionSystem".into(),
            }
        );
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let systems = vec![sys("A", &[]), sys("A", &[])];
        assert_eq!(
            topological_sort_layers(&systems).err().unwrap(),
            EcsError::DuplicateSystem("A".into())
        );
    }

    #[test]
    fn test_repeated_dependency_counts_once() {
        let systems = vec![sys("A", &[]), sys("B", &["A", "A"])];
        let schedule = Schedule::new(&systems).unwrap();
        assert_eq!(schedule.depth(), 2);
    }

    #[test]
    fn test_layering_properties_on_wide_graph() {
        // Each system i depends on i/2 and i/3 (when distinct and below i).
        let names: Vec<&'static str> = (0..40)
            .map(|i| &*Box::leak(format!("S{i}").into_boxed_str()))
            .collect();
        let systems: Vec<Arc<dyn System>> = (0..40)
            .map(|i| {
                let mut deps = Vec::new();
                if i > 0 {
                    deps.push(names[i / 2]);
                }
                if i > 2 && i / 3 != i / 2 {
                    deps.push(names[i / 3]);
                }
                Arc::new(Named {
                    name: names[i],
                    deps,
                }) as Arc<dyn System>
            })
            .collect();

        let schedule = Schedule::new(&systems).unwrap();
        assert_eq!(schedule.system_count(), systems.len());

        let mut seen = HashSet::new();
        for (depth, layer) in schedule.layers().iter().enumerate() {
            for system in layer {
                assert!(seen.insert(system.name().to_string()));
                for dep in system.dependencies() {
                    let dep_layer = schedule.layer_of(dep).unwrap();
                    assert!(dep_layer < depth, "{dep} must precede {}", system.name());
                }
            }
        }
    }

    #[test]
    fn test_system_lookup() {
        let schedule = Schedule::new(&[sys("A", &[])]).unwrap();
        assert_eq!(schedule.system("A").unwrap().name(), "A");
        assert_eq!(
            schedule.system("B").err(),
            Some(EcsError::UnknownSystem("B".into()))
        );
        assert!(Schedule::empty().is_empty());
    }
}
