//! プランビルダー
//!
//! ResourceSpec の一覧を依存関係順（トポロジカル順）に並べた
//! ProvisioningPlan を構築します。外部呼び出しは一切行いません。

use crate::error::{FlowError, Result};
use crate::model::ResourceSpec;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// 検証済み・依存関係順のリソース一覧
///
/// 不変条件: どのリソースも、依存先より後ろに並ぶ。
#[derive(Debug, Clone, Serialize)]
pub struct ProvisioningPlan {
    name: String,
    resources: Vec<ResourceSpec>,
    #[serde(skip)]
    positions: HashMap<String, usize>,
}

impl ProvisioningPlan {
    /// 依存グラフを検証してプランを構築
    ///
    /// 互いに独立なリソースは宣言順を保つ（実行結果の差分を安定させるため）。
    pub fn build(name: impl Into<String>, specs: Vec<ResourceSpec>) -> Result<Self> {
        let mut declared: HashMap<&str, usize> = HashMap::with_capacity(specs.len());
        for (index, spec) in specs.iter().enumerate() {
            if declared.insert(spec.id.as_str(), index).is_some() {
                return Err(FlowError::DuplicateResource(spec.id.clone()));
            }
        }

        // dependents[i] = i に依存するリソース
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); specs.len()];
        let mut in_degree: Vec<usize> = vec![0; specs.len()];
        for (index, spec) in specs.iter().enumerate() {
            let mut seen = BTreeSet::new();
            for dependency in &spec.depends_on {
                let &dep_index = declared.get(dependency.as_str()).ok_or_else(|| {
                    FlowError::UnknownDependency {
                        resource: spec.id.clone(),
                        dependency: dependency.clone(),
                    }
                })?;
                if dep_index == index {
                    return Err(FlowError::CircularDependency(format!(
                        "{} -> {}",
                        spec.id, spec.id
                    )));
                }
                if seen.insert(dep_index) {
                    dependents[dep_index].push(index);
                    in_degree[index] += 1;
                }
            }
        }

        // Kahn法。準備済み集合は宣言順の最小値から取り出す
        let mut ready: BTreeSet<usize> = (0..specs.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(specs.len());
        while let Some(index) = ready.pop_first() {
            order.push(index);
            for &dependent in &dependents[index] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() < specs.len() {
            return Err(FlowError::CircularDependency(describe_cycle(&specs, &declared, &in_degree)));
        }

        let mut slots: Vec<Option<ResourceSpec>> = specs.into_iter().map(Some).collect();
        let resources: Vec<ResourceSpec> = order
            .into_iter()
            .filter_map(|index| slots[index].take())
            .collect();
        let positions = resources
            .iter()
            .enumerate()
            .map(|(position, spec)| (spec.id.clone(), position))
            .collect();

        Ok(Self {
            name: name.into(),
            resources,
            positions,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 依存関係順のリソース
    pub fn resources(&self) -> &[ResourceSpec] {
        &self.resources
    }

    /// 逆順（依存元が先、依存先が後）
    pub fn reverse_order(&self) -> impl Iterator<Item = &ResourceSpec> {
        self.resources.iter().rev()
    }

    /// プラン内での位置
    pub fn position(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }

    /// 指定リソースに直接依存しているリソースID
    pub fn dependents_of(&self, id: &str) -> Vec<&str> {
        self.resources
            .iter()
            .filter(|r| r.depends_on.iter().any(|d| d == id))
            .map(|r| r.id.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// 残った（入次数が0にならなかった）ノードから循環経路を1つ取り出す
fn describe_cycle(
    specs: &[ResourceSpec],
    declared: &HashMap<&str, usize>,
    in_degree: &[usize],
) -> String {
    let Some(start) = (0..specs.len()).find(|&i| in_degree[i] > 0) else {
        return String::new();
    };

    let mut path = vec![start];
    let mut current = start;
    loop {
        // 循環に残っている依存先をたどる
        let next = specs[current]
            .depends_on
            .iter()
            .filter_map(|d| declared.get(d.as_str()).copied())
            .find(|&d| in_degree[d] > 0);
        let Some(next) = next else {
            break;
        };
        if let Some(pos) = path.iter().position(|&p| p == next) {
            let mut cycle: Vec<&str> = path[pos..].iter().map(|&i| specs[i].id.as_str()).collect();
            cycle.push(specs[next].id.as_str());
            return cycle.join(" -> ");
        }
        path.push(next);
        current = next;
    }

    path.iter()
        .map(|&i| specs[i].id.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(id: &str, deps: &[&str]) -> ResourceSpec {
        deps.iter().fold(
            ResourceSpec::new(id, "network").with_lookup("name", id),
            |spec, dep| spec.with_dependency(*dep),
        )
    }

    fn ids(plan: &ProvisioningPlan) -> Vec<&str> {
        plan.resources().iter().map(|r| r.id.as_str()).collect()
    }

    fn assert_topological(plan: &ProvisioningPlan) {
        for (position, resource) in plan.resources().iter().enumerate() {
            for dependency in &resource.depends_on {
                let dep_position = plan.position(dependency).unwrap();
                assert!(
                    dep_position < position,
                    "{} must come after {}",
                    resource.id,
                    dependency
                );
            }
        }
    }

    #[test]
    fn test_scenario_stack_order() {
        let plan = ProvisioningPlan::build(
            "web",
            vec![
                spec("instance", &["subnet", "security-rule"]),
                spec("network", &[]),
                spec("subnet", &["network"]),
                spec("security-rule", &["network"]),
            ],
        )
        .unwrap();

        assert_eq!(ids(&plan), vec!["network", "subnet", "security-rule", "instance"]);
        assert_topological(&plan);
        assert_eq!(plan.dependents_of("network"), vec!["subnet", "security-rule"]);
    }

    #[test]
    fn test_independent_resources_keep_declaration_order() {
        let plan = ProvisioningPlan::build(
            "x",
            vec![spec("c", &[]), spec("a", &[]), spec("b", &[])],
        )
        .unwrap();
        assert_eq!(ids(&plan), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_topological_property_on_wide_graph() {
        // 各リソース i は i の約数に依存する
        let specs: Vec<ResourceSpec> = (1..=30)
            .rev()
            .map(|i| {
                let deps: Vec<String> = (1..i).filter(|d| i % d == 0).map(|d| format!("r{}", d)).collect();
                let deps: Vec<&str> = deps.iter().map(|s| s.as_str()).collect();
                spec(&format!("r{}", i), &deps)
            })
            .collect();
        let plan = ProvisioningPlan::build("wide", specs).unwrap();
        assert_eq!(plan.len(), 30);
        assert_topological(&plan);
        assert_eq!(plan.resources()[0].id, "r1");
    }

    #[test]
    fn test_cycle_is_configuration_error() {
        let result = ProvisioningPlan::build(
            "x",
            vec![spec("a", &["c"]), spec("b", &["a"]), spec("c", &["b"]), spec("d", &[])],
        );
        match result {
            Err(err @ FlowError::CircularDependency(_)) => {
                assert!(err.is_configuration());
                let message = err.to_string();
                assert!(message.contains("a"));
                assert!(message.contains("b"));
                assert!(message.contains("c"));
            }
            other => panic!("Expected CircularDependency, got {:?}", other),
        }
    }

    #[test]
    fn test_self_dependency_is_cycle() {
        let result = ProvisioningPlan::build("x", vec![spec("a", &["a"])]);
        assert!(matches!(result, Err(FlowError::CircularDependency(_))));
    }

    #[test]
    fn test_unknown_dependency() {
        let result = ProvisioningPlan::build("x", vec![spec("a", &["ghost"])]);
        match result {
            Err(FlowError::UnknownDependency {
                resource,
                dependency,
            }) => {
                assert_eq!(resource, "a");
                assert_eq!(dependency, "ghost");
            }
            other => panic!("Expected UnknownDependency, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_id() {
        let result = ProvisioningPlan::build("x", vec![spec("a", &[]), spec("a", &[])]);
        assert!(matches!(result, Err(FlowError::DuplicateResource(id)) if id == "a"));
    }

    #[test]
    fn test_reverse_order() {
        let plan =
            ProvisioningPlan::build("x", vec![spec("a", &[]), spec("b", &["a"])]).unwrap();
        let reversed: Vec<_> = plan.reverse_order().map(|r| r.id.as_str()).collect();
        assert_eq!(reversed, vec!["b", "a"]);
    }
}
