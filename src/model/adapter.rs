//! 节点适配器：把对象图映射为可懒加载展开的统一树节点
//!
//! 适配器只是视图，不复制对象；子节点在第一次访问时计算并缓存，
//! 同一父节点上重复访问 `child(i)` 返回同一个 `Rc`。
//! 每个节点携带从根到自身路径上的 Mob 集合，用于嵌套合成的环检测。

use std::cell::OnceCell;
use std::rc::Rc;

use crate::model::format::{format_value, short_identity};
use crate::model::graph::{GraphProvider, GroupKind, MobId, ObjectKey, PropertyValue, TypeTag};
use crate::model::view_filter::referenced_mobs;

/// 分组节点的固定标签表
pub fn group_label(kind: GroupKind) -> &'static str {
    match kind {
        GroupKind::Mobs => "Mobs",
        GroupKind::Dictionary => "Dictionary",
        GroupKind::MetaDictionary => "MetaDictionary",
        GroupKind::EssenceData => "Essence Data",
        GroupKind::Header => "Header",
    }
}

/// 节点种类（封闭分派，遍历策略集中在本模块）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Object(ObjectKey),
    Group(GroupKind),
    /// 属性包中的属性，或序列属性中的元素（path 为元素下标链）
    Value { owner: ObjectKey, property: usize, path: Vec<usize> },
    /// 路径上已出现的 Mob：不可展开，只携带目标
    BackReference { target: ObjectKey },
    /// 标识在对象图中不存在
    Unresolved(MobId),
}

/// 路径上的 Mob 集合（持久链表，子节点共享父节点的前缀）
#[derive(Debug)]
struct MobPath {
    mob: ObjectKey,
    parent: Option<Rc<MobPath>>,
}

fn path_contains(path: &Option<Rc<MobPath>>, key: ObjectKey) -> bool {
    let mut cur = path.as_deref();
    while let Some(p) = cur {
        if p.mob == key {
            return true;
        }
        cur = p.parent.as_deref();
    }
    false
}

#[derive(Debug)]
pub struct NodeAdapter {
    kind: NodeKind,
    path: Option<Rc<MobPath>>,
    children: OnceCell<Vec<Rc<NodeAdapter>>>,
}

impl NodeAdapter {
    fn with_path(kind: NodeKind, path: Option<Rc<MobPath>>) -> Rc<Self> {
        Rc::new(Self { kind, path, children: OnceCell::new() })
    }

    /// 根节点：Mob 根把自身放入路径集合
    pub fn root_object(provider: &dyn GraphProvider, key: ObjectKey) -> Rc<Self> {
        Self::wrap_object(provider, key, &None)
    }

    pub fn root_group(kind: GroupKind) -> Rc<Self> {
        Self::with_path(NodeKind::Group(kind), None)
    }

    fn wrap_object(
        provider: &dyn GraphProvider,
        key: ObjectKey,
        parent_path: &Option<Rc<MobPath>>,
    ) -> Rc<Self> {
        let is_mob = provider.type_of(key).map(TypeTag::is_mob).unwrap_or(false);
        if !is_mob {
            return Self::with_path(NodeKind::Object(key), parent_path.clone());
        }
        if path_contains(parent_path, key) {
            return Self::with_path(NodeKind::BackReference { target: key }, parent_path.clone());
        }
        let path = Rc::new(MobPath { mob: key, parent: parent_path.clone() });
        Self::with_path(NodeKind::Object(key), Some(path))
    }

    fn wrap_identity(
        provider: &dyn GraphProvider,
        id: &MobId,
        parent_path: &Option<Rc<MobPath>>,
    ) -> Rc<Self> {
        match provider.lookup_identity(id) {
            Some(key) => Self::wrap_object(provider, key, parent_path),
            None => Self::with_path(NodeKind::Unresolved(id.clone()), parent_path.clone()),
        }
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn object_key(&self) -> Option<ObjectKey> {
        match self.kind {
            NodeKind::Object(key) => Some(key),
            _ => None,
        }
    }

    pub fn back_reference_target(&self) -> Option<ObjectKey> {
        match self.kind {
            NodeKind::BackReference { target } => Some(target),
            _ => None,
        }
    }

    pub fn is_back_reference(&self) -> bool {
        matches!(self.kind, NodeKind::BackReference { .. })
    }

    /// 子节点是否已计算（不触发解析）
    pub fn is_resolved(&self) -> bool {
        self.children.get().is_some()
    }

    /// 子节点列表：首次调用时解析并缓存
    pub fn children(&self, provider: &dyn GraphProvider) -> &[Rc<NodeAdapter>] {
        self.children.get_or_init(|| {
            let resolved = self.resolve_children(provider);
            tracing::debug!("解析子节点: {:?} -> {} 个", self.kind, resolved.len());
            resolved
        })
    }

    pub fn child_count(&self, provider: &dyn GraphProvider) -> usize {
        self.children(provider).len()
    }

    pub fn child(&self, provider: &dyn GraphProvider, i: usize) -> Option<Rc<NodeAdapter>> {
        self.children(provider).get(i).cloned()
    }

    /// 节点对应的原始属性值（仅属性/元素节点）
    pub fn raw_value<'g>(&self, provider: &'g dyn GraphProvider) -> Option<&'g PropertyValue> {
        let NodeKind::Value { owner, property, path } = &self.kind else {
            return None;
        };
        let mut cur = &provider.properties_of(*owner).get(*property)?.value;
        for idx in path {
            match cur {
                PropertyValue::List(items) => cur = items.get(*idx)?,
                _ => return None,
            }
        }
        Some(cur)
    }

    fn child_for_value(
        &self,
        provider: &dyn GraphProvider,
        owner: ObjectKey,
        property: usize,
        path: Vec<usize>,
        value: &PropertyValue,
    ) -> Rc<NodeAdapter> {
        match value {
            PropertyValue::Ref(target) => Self::wrap_object(provider, *target, &self.path),
            PropertyValue::Mob(id) => Self::wrap_identity(provider, id, &self.path),
            _ => Self::with_path(NodeKind::Value { owner, property, path }, self.path.clone()),
        }
    }

    fn resolve_children(&self, provider: &dyn GraphProvider) -> Vec<Rc<NodeAdapter>> {
        match &self.kind {
            NodeKind::Object(key) => self.object_children(provider, *key),
            NodeKind::Group(kind) => {
                let members: Vec<ObjectKey> = match (kind, provider.group(*kind)) {
                    (_, Some(members)) => members.to_vec(),
                    (GroupKind::Mobs, None) => provider
                        .objects()
                        .filter(|k| provider.type_of(*k).map(TypeTag::is_mob).unwrap_or(false))
                        .collect(),
                    (_, None) => Vec::new(),
                };
                members
                    .into_iter()
                    .map(|k| Self::wrap_object(provider, k, &self.path))
                    .collect()
            }
            NodeKind::Value { owner, property, path } => match self.raw_value(provider) {
                Some(PropertyValue::List(items)) => items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        let mut child_path = path.clone();
                        child_path.push(i);
                        self.child_for_value(provider, *owner, *property, child_path, item)
                    })
                    .collect(),
                _ => Vec::new(),
            },
            NodeKind::BackReference { .. } | NodeKind::Unresolved(_) => Vec::new(),
        }
    }

    fn object_children(&self, provider: &dyn GraphProvider, key: ObjectKey) -> Vec<Rc<NodeAdapter>> {
        let Some(obj) = provider.get(key) else {
            return Vec::new();
        };
        let wrap = |k: ObjectKey| Self::wrap_object(provider, k, &self.path);
        match obj.tag {
            TypeTag::CompositionMob | TypeTag::MasterMob | TypeTag::SourceMob => {
                let refs = obj.strong_refs();
                let (slots, others): (Vec<ObjectKey>, Vec<ObjectKey>) = refs
                    .into_iter()
                    .partition(|k| provider.type_of(*k) == Some(TypeTag::Slot));
                let mut out: Vec<Rc<NodeAdapter>> = slots.into_iter().map(wrap).collect();
                if obj.tag == TypeTag::CompositionMob {
                    out.extend(
                        referenced_mobs(provider, key)
                            .into_iter()
                            .filter(|k| provider.type_of(*k) == Some(TypeTag::CompositionMob))
                            .map(wrap),
                    );
                }
                out.extend(others.into_iter().map(wrap));
                out
            }
            TypeTag::Slot | TypeTag::Segment => obj.strong_refs().into_iter().map(wrap).collect(),
            TypeTag::SourceClip => {
                let mut out: Vec<Rc<NodeAdapter>> =
                    obj.strong_refs().into_iter().map(wrap).collect();
                let mut ids = Vec::new();
                for p in &obj.properties {
                    p.value.mob_refs(&mut ids);
                }
                out.extend(ids.into_iter().map(|id| Self::wrap_identity(provider, id, &self.path)));
                out
            }
            TypeTag::Object => obj
                .properties
                .iter()
                .enumerate()
                .map(|(i, p)| self.child_for_value(provider, key, i, Vec::new(), &p.value))
                .collect(),
        }
    }

    fn object_label(provider: &dyn GraphProvider, key: ObjectKey) -> String {
        let Some(obj) = provider.get(key) else {
            return format!("UnknownObject {}", key);
        };
        if let Some(name) = obj.display_name() {
            return name.to_string();
        }
        match &obj.identity {
            Some(id) => format!("{} {}", obj.class_name, short_identity(id)),
            None => obj.class_name.clone(),
        }
    }

    pub fn label(&self, provider: &dyn GraphProvider) -> String {
        match &self.kind {
            NodeKind::Object(key) => Self::object_label(provider, *key),
            NodeKind::Group(kind) => group_label(*kind).to_string(),
            NodeKind::Value { owner, property, path } => match path.last() {
                Some(i) => format!("[{}]", i),
                None => provider
                    .properties_of(*owner)
                    .get(*property)
                    .map(|p| p.name.clone())
                    .unwrap_or_default(),
            },
            NodeKind::BackReference { target } => {
                format!("{} [back reference]", Self::object_label(provider, *target))
            }
            NodeKind::Unresolved(id) => format!("Unresolved {}", short_identity(id)),
        }
    }

    /// 类名列（与原始导出格式的 class 字段一致）
    pub fn class_name(&self, provider: &dyn GraphProvider) -> String {
        match &self.kind {
            NodeKind::Object(key) => provider.class_name(*key).unwrap_or("UnknownObject").to_string(),
            NodeKind::Group(_) => "Group".to_string(),
            NodeKind::Value { .. } => "Property".to_string(),
            NodeKind::BackReference { .. } => "BackReference".to_string(),
            NodeKind::Unresolved(_) => "Unresolved".to_string(),
        }
    }

    /// 属性面板：有序 (名称, 格式化值)
    pub fn properties(&self, provider: &dyn GraphProvider) -> Vec<(String, String)> {
        let mut out = vec![
            ("Name".to_string(), self.label(provider)),
            ("Class".to_string(), self.class_name(provider)),
        ];
        match &self.kind {
            NodeKind::Object(key) => {
                if let Some(id) = provider.identity_of(*key) {
                    out.push(("Identity".to_string(), id.to_string()));
                }
                for p in provider.properties_of(*key) {
                    out.push((p.name.clone(), format_value(provider, &p.value)));
                }
            }
            NodeKind::Group(_) => {
                if let Some(children) = self.children.get() {
                    out.push(("Members".to_string(), children.len().to_string()));
                }
            }
            NodeKind::Value { .. } => {
                if let Some(v) = self.raw_value(provider) {
                    out.push(("Value".to_string(), format_value(provider, v)));
                }
            }
            NodeKind::BackReference { target } => {
                if let Some(id) = provider.identity_of(*target) {
                    out.push(("Target".to_string(), id.to_string()));
                }
            }
            NodeKind::Unresolved(id) => out.push(("Target".to_string(), id.to_string())),
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::graph::{GraphBuilder, GraphObject, ObjectGraph};

    fn mob_ref(id: &str) -> PropertyValue {
        PropertyValue::Mob(MobId::new(id))
    }

    /// 合成 A 的片段通过 SourceClip 引用合成 B，B 又引用回 A
    fn cyclic_graph() -> ObjectGraph {
        let mut b = GraphBuilder::new();
        let clip_a = b.add(GraphObject::new("SourceClip", TypeTag::SourceClip)
            .with_property("Length", PropertyValue::Int(10))
            .with_property("SourceID", mob_ref("urn:b")));
        let slot_a = b.add(GraphObject::new("TimelineMobSlot", TypeTag::Slot)
            .with_property("Segment", PropertyValue::Ref(clip_a)));
        b.add(GraphObject::new("CompositionMob", TypeTag::CompositionMob)
            .with_identity(MobId::new("urn:a"))
            .with_property("Name", PropertyValue::Text("A".into()))
            .with_property("Slots", PropertyValue::List(vec![PropertyValue::Ref(slot_a)])));

        let clip_b = b.add(GraphObject::new("SourceClip", TypeTag::SourceClip)
            .with_property("SourceID", mob_ref("urn:a")));
        let slot_b = b.add(GraphObject::new("TimelineMobSlot", TypeTag::Slot)
            .with_property("Segment", PropertyValue::Ref(clip_b)));
        b.add(GraphObject::new("CompositionMob", TypeTag::CompositionMob)
            .with_identity(MobId::new("urn:b"))
            .with_property("Slots", PropertyValue::List(vec![PropertyValue::Ref(slot_b)])));
        b.build().unwrap()
    }

    /// 深度优先展开全部节点，返回访问节点数
    fn expand_fully(graph: &ObjectGraph, node: &Rc<NodeAdapter>, guard: &mut usize) {
        *guard += 1;
        assert!(*guard < 10_000, "展开未终止");
        for child in node.children(graph) {
            expand_fully(graph, child, guard);
        }
    }

    #[test]
    fn test_children_are_memoized() {
        let graph = cyclic_graph();
        let root = NodeAdapter::root_object(&graph, ObjectKey(2));
        assert!(!root.is_resolved());

        let first = root.child(&graph, 0).unwrap();
        let again = root.child(&graph, 0).unwrap();
        assert!(root.is_resolved());
        assert!(Rc::ptr_eq(&first, &again));
        assert!(root.child(&graph, 99).is_none());
    }

    #[test]
    fn test_cycle_becomes_back_reference() {
        let graph = cyclic_graph();
        let root = NodeAdapter::root_object(&graph, ObjectKey(2));

        let mut visited = 0;
        expand_fully(&graph, &root, &mut visited);

        // A -> slot -> clip -> B -> slot -> clip -> A(back reference)
        let slot = root.child(&graph, 0).unwrap();
        let clip = slot.child(&graph, 0).unwrap();
        let mob_b = clip.child(&graph, 0).unwrap();
        assert_eq!(mob_b.object_key(), Some(ObjectKey(5)));
        let back = mob_b
            .child(&graph, 0)
            .and_then(|s| s.child(&graph, 0))
            .and_then(|c| c.child(&graph, 0))
            .unwrap();
        assert!(back.is_back_reference());
        assert_eq!(back.back_reference_target(), Some(ObjectKey(2)));
        assert_eq!(back.child_count(&graph), 0);
        assert_eq!(back.label(&graph), "A [back reference]");
    }

    #[test]
    fn test_composition_lists_nested_compositions_after_slots() {
        let graph = cyclic_graph();
        let root = NodeAdapter::root_object(&graph, ObjectKey(2));
        let labels: Vec<String> = root.children(&graph).iter().map(|c| c.label(&graph)).collect();
        assert_eq!(labels, vec!["TimelineMobSlot".to_string(), "CompositionMob urn:b".to_string()]);
    }

    #[test]
    fn test_direct_self_reference_terminates() {
        let mut b = GraphBuilder::new();
        let clip = b.add(GraphObject::new("SourceClip", TypeTag::SourceClip)
            .with_property("SourceID", mob_ref("urn:x")));
        let slot = b.add(GraphObject::new("TimelineMobSlot", TypeTag::Slot)
            .with_property("Segment", PropertyValue::Ref(clip)));
        let x = b.add(GraphObject::new("CompositionMob", TypeTag::CompositionMob)
            .with_identity(MobId::new("urn:x"))
            .with_property("Slots", PropertyValue::List(vec![PropertyValue::Ref(slot)])));
        let graph = b.build().unwrap();

        let root = NodeAdapter::root_object(&graph, x);
        let mut visited = 0;
        expand_fully(&graph, &root, &mut visited);
        // 根、slot、clip、clip 下的回指、嵌套合成列表中的回指
        assert_eq!(visited, 5);
        assert!(root.child(&graph, 1).unwrap().is_back_reference());
    }

    #[test]
    fn test_shared_mob_on_parallel_paths_is_expanded_twice() {
        let mut b = GraphBuilder::new();
        let src = b.add(GraphObject::new("SourceMob", TypeTag::SourceMob)
            .with_identity(MobId::new("urn:src")));
        let clip1 = b.add(GraphObject::new("SourceClip", TypeTag::SourceClip)
            .with_property("SourceID", mob_ref("urn:src")));
        let clip2 = b.add(GraphObject::new("SourceClip", TypeTag::SourceClip)
            .with_property("SourceID", mob_ref("urn:src")));
        let seq = b.add(GraphObject::new("Sequence", TypeTag::Segment)
            .with_property("Components", PropertyValue::List(vec![
                PropertyValue::Ref(clip1),
                PropertyValue::Ref(clip2),
            ])));
        let graph = b.build().unwrap();

        let root = NodeAdapter::root_object(&graph, seq);
        for clip in root.children(&graph) {
            let target = clip.child(&graph, 0).unwrap();
            assert_eq!(target.object_key(), Some(src));
            assert!(!target.is_back_reference());
        }
    }

    #[test]
    fn test_property_bag_children() {
        let mut b = GraphBuilder::new();
        let tag = b.add(GraphObject::new("TaggedValue", TypeTag::Object)
            .with_property("Name", PropertyValue::Text("Comment".into())));
        let bag = b.add(GraphObject::new("CDCIDescriptor", TypeTag::Object)
            .with_property("StoredWidth", PropertyValue::Int(1920))
            .with_property("Tags", PropertyValue::List(vec![
                PropertyValue::Ref(tag),
                PropertyValue::Text("loose".into()),
            ]))
            .with_property("Locator", mob_ref("urn:missing")));
        let graph = b.build().unwrap();

        let root = NodeAdapter::root_object(&graph, bag);
        let children = root.children(&graph);
        assert_eq!(children.len(), 3);

        assert_eq!(children[0].label(&graph), "StoredWidth");
        assert_eq!(children[0].child_count(&graph), 0);
        assert_eq!(children[0].properties(&graph)[2], ("Value".to_string(), "1920".to_string()));

        let tags = &children[1];
        assert_eq!(tags.label(&graph), "Tags");
        let elems = tags.children(&graph);
        assert_eq!(elems[0].label(&graph), "Comment");
        assert_eq!(elems[1].label(&graph), "[1]");
        assert_eq!(elems[1].raw_value(&graph), Some(&PropertyValue::Text("loose".into())));

        assert_eq!(children[2].kind(), &NodeKind::Unresolved(MobId::new("urn:missing")));
    }

    #[test]
    fn test_group_node() {
        let mut b = GraphBuilder::new();
        let def = b.add(GraphObject::new("DataDef", TypeTag::Object));
        b.add(GraphObject::new("MasterMob", TypeTag::MasterMob).with_identity(MobId::new("urn:m")));
        b.group(GroupKind::Dictionary, vec![def]);
        let graph = b.build().unwrap();

        let dict = NodeAdapter::root_group(GroupKind::Dictionary);
        assert_eq!(dict.label(&graph), "Dictionary");
        assert_eq!(dict.child_count(&graph), 1);

        let mobs = NodeAdapter::root_group(GroupKind::Mobs);
        assert_eq!(mobs.child_count(&graph), 1);
        assert_eq!(mobs.child(&graph, 0).unwrap().label(&graph), "MasterMob urn:m");

        let essence = NodeAdapter::root_group(GroupKind::EssenceData);
        assert_eq!(essence.child_count(&graph), 0);
    }

    #[test]
    fn test_object_properties_view() {
        let graph = cyclic_graph();
        let root = NodeAdapter::root_object(&graph, ObjectKey(2));
        let props = root.properties(&graph);
        assert_eq!(props[0], ("Name".to_string(), "A".to_string()));
        assert_eq!(props[1], ("Class".to_string(), "CompositionMob".to_string()));
        assert_eq!(props[2], ("Identity".to_string(), "urn:a".to_string()));
        assert_eq!(props[4], ("Slots".to_string(), "[1 items]".to_string()));
    }
}
