//! 查找：在懒加载树上按显示顺序做不区分大小写的子串匹配

use std::rc::Rc;

use crate::model::adapter::NodeAdapter;
use crate::model::graph::GraphProvider;

/// 遍历上限，防止在高度共享的对象图上无界展开
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchLimits {
    pub max_nodes: usize,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self { max_nodes: 50_000 }
    }
}

/// 命中项：从根开始的序号路径（第一项为根序号）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub path: Vec<usize>,
    pub label: String,
}

pub fn node_matches(provider: &dyn GraphProvider, node: &NodeAdapter, needle_lower: &str) -> bool {
    node.properties(provider)
        .iter()
        .any(|(_, v)| v.to_lowercase().contains(needle_lower))
}

/// 先序遍历全部根，返回命中项
pub fn search(
    provider: &dyn GraphProvider,
    roots: &[Rc<NodeAdapter>],
    term: &str,
    limits: SearchLimits,
) -> Vec<SearchHit> {
    let needle = term.to_lowercase();
    let mut hits = Vec::new();
    if needle.is_empty() {
        return hits;
    }

    let mut visited = 0usize;
    let mut stack: Vec<(Rc<NodeAdapter>, Vec<usize>)> = roots
        .iter()
        .enumerate()
        .rev()
        .map(|(i, r)| (r.clone(), vec![i]))
        .collect();

    while let Some((node, path)) = stack.pop() {
        visited += 1;
        if visited > limits.max_nodes {
            tracing::warn!("查找达到遍历上限 {}，结果可能不完整", limits.max_nodes);
            break;
        }
        if node_matches(provider, &node, &needle) {
            hits.push(SearchHit { path: path.clone(), label: node.label(provider) });
        }
        for (i, child) in node.children(provider).iter().enumerate().rev() {
            let mut child_path = path.clone();
            child_path.push(i);
            stack.push((child.clone(), child_path));
        }
    }
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::graph::{DecodeError, GraphBuilder, GraphObject, MobId, ObjectGraph, ObjectKey, PropertyValue, TypeTag};
    use serde_json::json;

    fn graph() -> ObjectGraph {
        let mut b = GraphBuilder::new();
        b.add(GraphObject::new("SourceMob", TypeTag::SourceMob)
            .with_identity(MobId::new("urn:tape"))
            .with_property("Name", PropertyValue::Text("Tape_001".into())));
        let clip = b.add(GraphObject::new("SourceClip", TypeTag::SourceClip)
            .with_property("SourceID", PropertyValue::Mob(MobId::new("urn:tape"))));
        b.add(GraphObject::new("Sequence", TypeTag::Segment)
            .with_property("Components", PropertyValue::List(vec![PropertyValue::Ref(clip)])));
        b.build().unwrap()
    }

    #[test]
    fn test_search_in_display_order() {
        let graph = graph();
        let roots = vec![
            NodeAdapter::root_object(&graph, ObjectKey(2)),
            NodeAdapter::root_object(&graph, ObjectKey(0)),
        ];
        let hits = search(&graph, &roots, "TAPE_", SearchLimits::default());
        let paths: Vec<Vec<usize>> = hits.iter().map(|h| h.path.clone()).collect();
        // Sequence -> SourceClip -> SourceMob，然后第二个根
        assert_eq!(paths, vec![vec![0, 0, 0], vec![1]]);
        assert_eq!(hits[1].label, "Tape_001");
    }

    #[test]
    fn test_search_matches_property_values() {
        let graph = graph();
        let roots = vec![NodeAdapter::root_object(&graph, ObjectKey(0))];
        assert_eq!(search(&graph, &roots, "urn:tape", SearchLimits::default()).len(), 1);
        assert!(search(&graph, &roots, "", SearchLimits::default()).is_empty());
        assert!(search(&graph, &roots, "nothing", SearchLimits::default()).is_empty());
    }

    #[test]
    fn test_search_respects_limit() {
        let graph = graph();
        let roots = vec![NodeAdapter::root_object(&graph, ObjectKey(2))];
        let hits = search(&graph, &roots, "source", SearchLimits { max_nodes: 1 });
        assert!(hits.is_empty());
    }

    #[test]
    fn test_strong_cycle_rejected_before_search() {
        let dump = json!({"objects": [
            {"class": "Sequence", "tag": "segment", "properties": [{"name": "Next", "value": {"ref": 1}}]},
            {"class": "Filler", "tag": "segment", "properties": [{"name": "Back", "value": {"ref": 0}}]}
        ]});
        assert!(matches!(
            ObjectGraph::decode(dump.to_string().as_bytes()),
            Err(DecodeError::StrongRefCycle(_))
        ));
    }

    #[test]
    fn test_search_deep_segment_chain() {
        let mut b = GraphBuilder::new();
        let mut prev = b.add(GraphObject::new("Filler", TypeTag::Segment)
            .with_property("Name", PropertyValue::Text("bottom".into())));
        for _ in 0..300 {
            prev = b.add(GraphObject::new("Sequence", TypeTag::Segment)
                .with_property("Components", PropertyValue::List(vec![PropertyValue::Ref(prev)])));
        }
        let graph = b.build().unwrap();
        let roots = vec![NodeAdapter::root_object(&graph, prev)];

        let hits = search(&graph, &roots, "bottom", SearchLimits::default());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path.len(), 301);
        assert!(search(&graph, &roots, "nomatch", SearchLimits::default()).is_empty());
    }
}
