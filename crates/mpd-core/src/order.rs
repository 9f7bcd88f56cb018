//! Build ordering of developed packages
//!
//! The order produced here lists dependencies before their dependents.
//! Callers that emit build files use it as-is.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

/// The resolver reported a dependency cycle among developed packages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("dependency cycle among developed packages: {}", .packages.iter().cloned().collect::<Vec<_>>().join(", "))]
pub struct CyclicDependencyError {
    /// Every package that could not be ordered.
    pub packages: BTreeSet<String>,
}

/// Non-developed packages that depend on developed ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingIntermediateDependencies {
    /// Consumer -> the developed packages it depends on.
    pub missing: BTreeMap<String, BTreeSet<String>>,
}

impl fmt::Display for MissingIntermediateDependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "The following packages are intermediate dependencies and must also be cloned:"
        )?;
        for (consumer, developed) in &self.missing {
            let list: Vec<_> = developed.iter().map(String::as_str).collect();
            writeln!(f, " - {consumer} (depends on {})", list.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for MissingIntermediateDependencies {}

/// Order developed packages so every package follows all of its dependencies.
///
/// `edges[p]` is the set of packages `p` depends on. Targets outside
/// `developed` are ignored. Among packages that are ready at the same time,
/// the lexicographically smallest comes first.
pub fn order(
    developed: &BTreeSet<String>,
    edges: &BTreeMap<String, BTreeSet<String>>,
) -> Result<Vec<String>, CyclicDependencyError> {
    let mut remaining: BTreeMap<&str, BTreeSet<&str>> = developed
        .iter()
        .map(|name| {
            let deps = edges
                .get(name)
                .into_iter()
                .flatten()
                .filter(|dep| *dep != name && developed.contains(*dep))
                .map(String::as_str)
                .collect();
            (name.as_str(), deps)
        })
        .collect();

    let mut result = Vec::with_capacity(remaining.len());
    while let Some(next) = remaining
        .iter()
        .find(|(_, deps)| deps.is_empty())
        .map(|(name, _)| *name)
    {
        remaining.remove(next);
        for deps in remaining.values_mut() {
            deps.remove(next);
        }
        result.push(next.to_string());
    }

    if remaining.is_empty() {
        Ok(result)
    } else {
        Err(CyclicDependencyError {
            packages: remaining.into_keys().map(str::to_string).collect(),
        })
    }
}

/// Find non-developed packages with a direct dependency on a developed one.
///
/// `direct_edges` maps every resolved package to its direct dependencies.
pub fn find_missing_intermediate_dependencies(
    direct_edges: &BTreeMap<String, BTreeSet<String>>,
    developed: &BTreeSet<String>,
) -> BTreeMap<String, BTreeSet<String>> {
    direct_edges
        .iter()
        .filter(|(consumer, _)| !developed.contains(*consumer))
        .filter_map(|(consumer, deps)| {
            let hits: BTreeSet<String> = deps.intersection(developed).cloned().collect();
            (!hits.is_empty()).then(|| (consumer.clone(), hits))
        })
        .collect()
}

/// Fail with the full list when any intermediate dependency is missing.
pub fn verify_no_missing_intermediate_dependencies(
    direct_edges: &BTreeMap<String, BTreeSet<String>>,
    developed: &BTreeSet<String>,
) -> Result<(), MissingIntermediateDependencies> {
    let missing = find_missing_intermediate_dependencies(direct_edges, developed);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(MissingIntermediateDependencies { missing })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    fn edges(pairs: &[(&str, &[&str])]) -> BTreeMap<String, BTreeSet<String>> {
        pairs
            .iter()
            .map(|(name, deps)| ((*name).to_string(), set(deps)))
            .collect()
    }

    #[test]
    fn test_dependency_first() {
        let order = order(&set(&["foo", "bar"]), &edges(&[("bar", &["foo"])])).unwrap();
        assert_eq!(order, vec!["foo", "bar"]);
    }

    #[test]
    fn test_transitive_chain() {
        let order = order(
            &set(&["a", "b", "c"]),
            &edges(&[("a", &["b", "c"]), ("b", &["c"])]),
        )
        .unwrap();
        assert_eq!(order, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_external_targets_ignored() {
        let order = order(
            &set(&["art", "cetlib"]),
            &edges(&[("art", &["cetlib", "root", "boost"]), ("cetlib", &["boost"])]),
        )
        .unwrap();
        assert_eq!(order, vec!["cetlib", "art"]);
    }

    #[test]
    fn test_empty() {
        assert!(order(&BTreeSet::new(), &BTreeMap::new()).unwrap().is_empty());
    }

    #[test]
    fn test_cycle_reports_all_members() {
        let err = order(
            &set(&["a", "b", "c", "d"]),
            &edges(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"])]),
        )
        .unwrap_err();
        assert_eq!(err.packages, set(&["a", "b", "c"]));
    }

    #[test]
    fn test_missing_intermediate() {
        let direct = edges(&[("C", &["A"]), ("A", &["B"]), ("D", &["E"])]);
        let missing = find_missing_intermediate_dependencies(&direct, &set(&["A", "B"]));
        assert_eq!(missing, BTreeMap::from([("C".to_string(), set(&["A"]))]));

        let err = verify_no_missing_intermediate_dependencies(&direct, &set(&["A", "B"]))
            .unwrap_err();
        assert!(err.to_string().contains(" - C (depends on A)"));
    }

    #[test]
    fn test_no_missing_intermediate() {
        let direct = edges(&[("A", &["B"]), ("B", &["zlib"])]);
        assert!(verify_no_missing_intermediate_dependencies(&direct, &set(&["A", "B"])).is_ok());
    }

    /// Random DAGs: an edge i -> j only when j < i.
    fn dag() -> impl Strategy<Value = (BTreeSet<String>, BTreeMap<String, BTreeSet<String>>)> {
        (1usize..12).prop_flat_map(|n| {
            prop::collection::vec(prop::collection::vec(any::<bool>(), n), n).prop_map(
                move |matrix| {
                    let names: Vec<String> = (0..n).map(|i| format!("pkg{i:02}")).collect();
                    let mut edges = BTreeMap::new();
                    for (i, row) in matrix.iter().enumerate() {
                        let deps: BTreeSet<String> = row
                            .iter()
                            .enumerate()
                            .filter(|(j, on)| **on && *j < i)
                            .map(|(j, _)| names[j].clone())
                            .collect();
                        edges.insert(names[i].clone(), deps);
                    }
                    (names.into_iter().collect(), edges)
                },
            )
        })
    }

    proptest! {
        #[test]
        fn test_topological_validity((developed, edges) in dag()) {
            let order = order(&developed, &edges).unwrap();
            prop_assert_eq!(order.len(), developed.len());

            let position: BTreeMap<&str, usize> = order
                .iter()
                .enumerate()
                .map(|(i, name)| (name.as_str(), i))
                .collect();
            for (consumer, deps) in &edges {
                for dep in deps {
                    prop_assert!(position[dep.as_str()] < position[consumer.as_str()]);
                }
            }
        }
    }
}
