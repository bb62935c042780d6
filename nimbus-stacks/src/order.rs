//! Deployment ordering
//!
//! Stacks form a DAG through their recorded dependencies. Ordering uses
//! Kahn's algorithm and breaks ties by declaration index, so the same
//! topology always yields the same order.

use std::collections::{BTreeMap, BTreeSet};

use nimbus_core::{CoreError, Stack, StackId};

use crate::error::{Result, TopologyError};

/// Declaration index of every stack, failing on unknown dependencies
fn index(stacks: &[Stack]) -> Result<BTreeMap<&StackId, usize>> {
    let positions: BTreeMap<&StackId, usize> = stacks
        .iter()
        .enumerate()
        .map(|(idx, stack)| (stack.id(), idx))
        .collect();

    for stack in stacks {
        for dependency in stack.dependencies() {
            if !positions.contains_key(dependency) {
                return Err(TopologyError::UnknownDependency {
                    stack: stack.id().clone(),
                    missing: dependency.clone(),
                });
            }
        }
    }

    Ok(positions)
}

/// Stacks in an order where every stack follows all of its dependencies
pub fn deployment_order(stacks: &[Stack]) -> Result<Vec<&Stack>> {
    let positions = index(stacks)?;
    let n = stacks.len();

    // dependents[i] = stacks that wait on stack i
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut in_degree: Vec<usize> = vec![0; n];

    for (idx, stack) in stacks.iter().enumerate() {
        for dependency in stack.dependencies() {
            dependents[positions[dependency]].push(idx);
            in_degree[idx] += 1;
        }
    }

    let mut ready: BTreeSet<usize> = (0..n).filter(|&idx| in_degree[idx] == 0).collect();
    let mut sorted = Vec::with_capacity(n);

    while let Some(idx) = ready.pop_first() {
        sorted.push(&stacks[idx]);
        for &next in &dependents[idx] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.insert(next);
            }
        }
    }

    if sorted.len() != n {
        let remaining: Vec<&str> = stacks
            .iter()
            .enumerate()
            .filter(|(idx, _)| in_degree[*idx] > 0)
            .map(|(_, stack)| stack.id().as_str())
            .collect();
        return Err(TopologyError::Cycle(remaining.join(", ")));
    }

    Ok(sorted)
}

/// Groups stacks into waves: every dependency of a stack lies in an
/// earlier wave, and stacks within a wave are independent of each other
pub fn waves(stacks: &[Stack]) -> Result<Vec<Vec<&Stack>>> {
    let order = deployment_order(stacks)?;
    let mut level: BTreeMap<&StackId, usize> = BTreeMap::new();
    let mut waves: Vec<Vec<&Stack>> = Vec::new();

    for stack in order {
        let wave = stack
            .dependencies()
            .iter()
            .filter_map(|dependency| level.get(dependency))
            .map(|l| l + 1)
            .max()
            .unwrap_or(0);

        level.insert(stack.id(), wave);
        if waves.len() <= wave {
            waves.resize_with(wave + 1, Vec::new);
        }
        waves[wave].push(stack);
    }

    // Keep declaration order inside each wave
    let positions = index(stacks)?;
    for wave in &mut waves {
        wave.sort_by_key(|stack| positions[stack.id()]);
    }

    Ok(waves)
}

/// Checks cross-stack wiring
///
/// Export names must be unique, and every imported export must belong to a
/// stack that is a declared dependency of the importer (and so deploys
/// before it).
pub fn verify(stacks: &[Stack]) -> Result<()> {
    deployment_order(stacks)?;

    let mut producers: BTreeMap<String, &StackId> = BTreeMap::new();
    for stack in stacks {
        for export in stack.template().exports() {
            if producers.insert(export.clone(), stack.id()).is_some() {
                return Err(CoreError::DuplicateExport(export).into());
            }
        }
    }

    for stack in stacks {
        for import in stack.template().imports()? {
            let declared = producers
                .get(&import)
                .is_some_and(|producer| stack.dependencies().contains(*producer));

            if !declared {
                return Err(TopologyError::UnresolvedImport {
                    stack: stack.id().clone(),
                    export: import,
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_core::Environment;
    use nimbus_core::resources::s3::Bucket;

    fn env() -> Environment {
        Environment::new("039612877479", "us-east-1").unwrap()
    }

    /// Producer with one export, consumers importing it
    fn chain() -> Vec<Stack> {
        let mut a = Stack::new("A", env(), "a");
        let bucket = a.add("Bucket", &Bucket::named("a", false)).unwrap();
        let handle = a.export("BucketName", bucket).unwrap();

        let mut b = Stack::new("B", env(), "b");
        let imported = b.import(&handle);
        let handle_b = b.export("Forwarded", imported).unwrap();

        let mut c = Stack::new("C", env(), "c");
        c.import(&handle_b);

        let d = Stack::new("D", env(), "d");

        // Declared out of dependency order on purpose
        vec![c, a, d, b]
    }

    fn ids<'a>(stacks: impl IntoIterator<Item = &'a Stack>) -> Vec<&'a str> {
        stacks.into_iter().map(|s| s.id().as_str()).collect()
    }

    #[test]
    fn test_order_respects_dependencies() {
        let stacks = chain();
        let order = deployment_order(&stacks).unwrap();
        assert_eq!(ids(order), vec!["A", "D", "B", "C"]);
    }

    #[test]
    fn test_waves() {
        let stacks = chain();
        let waves = waves(&stacks).unwrap();
        let names: Vec<Vec<&str>> = waves.into_iter().map(ids).collect();
        assert_eq!(names, vec![vec!["A", "D"], vec!["B"], vec!["C"]]);
    }

    #[test]
    fn test_cycle_detected() {
        let mut a = Stack::new("A", env(), "a");
        let ta = a.export("X", "x".into()).unwrap();
        let mut b = Stack::new("B", env(), "b");
        let tb = b.export("Y", "y".into()).unwrap();
        a.import(&tb);
        b.import(&ta);

        let stacks = [a, b];
        let result = deployment_order(&stacks);
        assert!(matches!(result, Err(TopologyError::Cycle(_))));
    }

    #[test]
    fn test_unknown_dependency() {
        let mut producer = Stack::new("A", env(), "a");
        let handle = producer.export("X", "x".into()).unwrap();
        let mut consumer = Stack::new("B", env(), "b");
        consumer.import(&handle);

        let stacks = [consumer];
        let result = deployment_order(&stacks);
        assert!(matches!(result, Err(TopologyError::UnknownDependency { .. })));
    }

    #[test]
    fn test_verify_accepts_chain() {
        assert!(verify(&chain()).is_ok());
    }

    #[test]
    fn test_verify_rejects_duplicate_exports() {
        // Same stack name declared twice exports the same names
        let mut a1 = Stack::new("A", env(), "a");
        a1.export("X", "x".into()).unwrap();
        let mut a2 = Stack::new("A", env(), "a");
        a2.export("X", "y".into()).unwrap();

        let result = verify(&[a1, a2]);
        assert!(matches!(
            result,
            Err(TopologyError::Core(CoreError::DuplicateExport(_)))
        ));
    }
}
