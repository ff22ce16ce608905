//! Dependency Resolver
//!
//! Orders a selection of modules so that every dependency comes first.
//!
//! # Rules
//!
//! | Edge                          | Honored when                  |
//! |-------------------------------|-------------------------------|
//! | mandatory dependency          | always (must also be selected on install) |
//! | optional dependency           | the dependency is selected    |
//!
//! The selection becomes a [`StableDiGraph`] with an edge from every module to
//! each dependency it honors. Nodes are added in registry declaration order
//! and the order is a depth-first post-order rooted at each node in turn, so
//! the result is deterministic and unconstrained modules keep the order they
//! were declared in.
//!
//! Install and delete check the selection in opposite directions: install
//! needs every mandatory dependency selected, delete refuses to remove a
//! module that an installed, unselected module still requires.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::algo::{is_cyclic_directed, tarjan_scc};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::DfsPostOrder;
use petgraph::Direction;

use super::plan::module;
use crate::error::{InstallerError, Result};
use crate::module::{ModuleName, Registry};

/// Edges point from a module to its dependencies.
type DependencyGraph = StableDiGraph<ModuleName, ()>;

// ============================================================================
// Resolution
// ============================================================================

/// Install order for `selected`.
///
/// # Errors
///
/// - `UnknownDependency` if any registered module names an unregistered
///   mandatory dependency
/// - `UnknownModule` if a selected name is not registered
/// - `MissingDependency` if a mandatory dependency is registered but not selected
/// - `CyclicDependency` naming the modules on the first cycle found
pub fn resolve(registry: &Registry, selected: &[ModuleName]) -> Result<Vec<ModuleName>> {
    registry.check_dependencies()?;
    let selection = selection_set(registry, selected)?;

    for module in registry.iter().filter(|m| selection.contains(m.name())) {
        if let Some(dep) = module
            .info()
            .mandatory
            .iter()
            .find(|dep| !selection.contains(*dep))
        {
            return Err(InstallerError::MissingDependency {
                module: module.name().clone(),
                dependency: dep.clone(),
            });
        }
    }

    let order = ordered(registry, &selection)?;
    tracing::debug!(order = ?order, "resolved install order");
    Ok(order)
}

/// Delete order for `selected`: dependents before their dependencies.
///
/// `installed` lists the modules currently installed. Deleting a module on
/// its own is fine, but deleting one that an installed module outside the
/// selection mandatorily depends on is a `RequiredBy` error. For a selection
/// that [`resolve`] accepts the result is exactly its reverse.
pub fn delete_order(
    registry: &Registry,
    selected: &[ModuleName],
    installed: &[ModuleName],
) -> Result<Vec<ModuleName>> {
    registry.check_dependencies()?;
    let selection = selection_set(registry, selected)?;

    for dependent in registry.iter() {
        let name = dependent.name();
        if selection.contains(name) || !installed.contains(name) {
            continue;
        }
        if let Some(dep) = dependent
            .info()
            .mandatory
            .iter()
            .find(|dep| selection.contains(*dep))
        {
            return Err(InstallerError::RequiredBy {
                module: dep.clone(),
                dependent: name.clone(),
            });
        }
    }

    let mut order = ordered(registry, &selection)?;
    order.reverse();
    tracing::debug!(order = ?order, "resolved delete order");
    Ok(order)
}

/// Close `selected` under mandatory dependencies.
///
/// Optional dependencies are not pulled in. The result is in declaration
/// order.
pub fn expand_selection(registry: &Registry, selected: &[ModuleName]) -> Result<Vec<ModuleName>> {
    registry.check_dependencies()?;
    let mut closed = selection_set(registry, selected)?;
    let mut pending: Vec<ModuleName> = closed.iter().cloned().collect();

    while let Some(name) = pending.pop() {
        for dep in &module(registry, &name)?.info().mandatory {
            if closed.insert(dep.clone()) {
                tracing::debug!(module = %name, dependency = %dep, "adding mandatory dependency");
                pending.push(dep.clone());
            }
        }
    }

    let mut names: Vec<&ModuleName> = closed.iter().collect();
    names.sort_by_key(|name| registry.position(name.as_str()).unwrap_or(usize::MAX));
    Ok(names.into_iter().cloned().collect())
}

// ============================================================================
// Graph
// ============================================================================

fn selection_set(registry: &Registry, selected: &[ModuleName]) -> Result<HashSet<ModuleName>> {
    let mut set = HashSet::with_capacity(selected.len());
    for name in selected {
        if !registry.contains(name.as_str()) {
            return Err(InstallerError::UnknownModule(name.clone()));
        }
        set.insert(name.clone());
    }
    Ok(set)
}

/// Graph over the selected modules. Dependencies outside the selection are
/// left out.
fn build_graph(registry: &Registry, selection: &HashSet<ModuleName>) -> DependencyGraph {
    let mut graph = DependencyGraph::new();
    let mut index: HashMap<&ModuleName, NodeIndex> = HashMap::new();

    for module in registry.iter().filter(|m| selection.contains(m.name())) {
        index.insert(module.name(), graph.add_node(module.name().clone()));
    }

    for module in registry.iter() {
        let Some(&from) = index.get(module.name()) else {
            continue;
        };
        let info = module.info();
        let mut deps: Vec<NodeIndex> = info
            .mandatory
            .iter()
            .chain(info.optional.iter())
            .filter_map(|dep| index.get(dep).copied())
            .collect();
        deps.sort();
        deps.dedup();
        for to in deps {
            graph.add_edge(from, to, ());
        }
    }

    graph
}

/// Dependencies-first order over the selection.
fn ordered(registry: &Registry, selection: &HashSet<ModuleName>) -> Result<Vec<ModuleName>> {
    let graph = build_graph(registry, selection);
    if is_cyclic_directed(&graph) {
        return Err(InstallerError::CyclicDependency {
            cycle: find_cycle(&graph),
        });
    }

    let mut dfs = DfsPostOrder::empty(&graph);
    let mut order = Vec::with_capacity(graph.node_count());
    for root in graph.node_indices() {
        dfs.move_to(root);
        while let Some(node) = dfs.next(&graph) {
            order.push(graph[node].clone());
        }
    }
    Ok(order)
}

/// Closed path `a -> b -> .. -> a` through the earliest-declared strongly
/// connected component that holds a cycle.
fn find_cycle(graph: &DependencyGraph) -> Vec<ModuleName> {
    let component = tarjan_scc(graph)
        .into_iter()
        .filter(|c| c.len() > 1 || c.iter().any(|&n| graph.find_edge(n, n).is_some()))
        .min_by_key(|c| c.iter().min().copied());
    let Some(component) = component else {
        return Vec::new();
    };
    let Some(&start) = component.iter().min() else {
        return Vec::new();
    };
    let members: HashSet<NodeIndex> = component.into_iter().collect();

    // Breadth-first along dependency edges until one leads back to `start`
    let mut parent: HashMap<NodeIndex, NodeIndex> = HashMap::new();
    let mut queue = VecDeque::from([start]);
    while let Some(node) = queue.pop_front() {
        let mut deps: Vec<NodeIndex> = graph
            .neighbors_directed(node, Direction::Outgoing)
            .filter(|n| members.contains(n))
            .collect();
        deps.sort();

        for dep in deps {
            if dep == start {
                let mut chain = vec![node];
                let mut current = node;
                while current != start {
                    match parent.get(&current) {
                        Some(&p) => {
                            chain.push(p);
                            current = p;
                        }
                        None => break,
                    }
                }
                chain.reverse();
                chain.push(start);
                return chain.into_iter().map(|n| graph[n].clone()).collect();
            }
            if !parent.contains_key(&dep) {
                parent.insert(dep, node);
                queue.push_back(dep);
            }
        }
    }

    Vec::new()
}
