//! 视图过滤：按模式从对象图中选出根对象（纯函数，不修改提供者）

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::data_core::AppError;
use crate::model::graph::{GraphProvider, GroupKind, MobId, ObjectKey, TypeTag};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViewMode {
    #[serde(rename = "toplevel")]
    TopLevelCompositions,
    #[serde(rename = "compmobs")]
    AllCompositions,
    #[serde(rename = "mastermobs")]
    MasterMobs,
    #[serde(rename = "sourcemobs")]
    SourceMobs,
}

impl ViewMode {
    /// 多模式组合时的固定拼接顺序
    pub const ALL: [ViewMode; 4] = [
        Self::TopLevelCompositions,
        Self::AllCompositions,
        Self::MasterMobs,
        Self::SourceMobs,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Self::TopLevelCompositions => "toplevel",
            Self::AllCompositions => "compmobs",
            Self::MasterMobs => "mastermobs",
            Self::SourceMobs => "sourcemobs",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::TopLevelCompositions => "Top-Level Composition Mobs",
            Self::AllCompositions => "Composition Mobs",
            Self::MasterMobs => "Master Mobs",
            Self::SourceMobs => "Source Mobs",
        }
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ViewMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.key().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AppError::InvalidArgument(format!("未知视图模式: {}", s)))
    }
}

/// 解析分组名（与原始选项键一致）
pub fn parse_group(s: &str) -> Result<GroupKind, AppError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "mobs" => Ok(GroupKind::Mobs),
        "dictionary" => Ok(GroupKind::Dictionary),
        "metadict" => Ok(GroupKind::MetaDictionary),
        "essence" => Ok(GroupKind::EssenceData),
        "root" | "header" => Ok(GroupKind::Header),
        _ => Err(AppError::InvalidArgument(format!("未知分组: {}", s))),
    }
}

/// Mob 片段树中（不跨越其他 Mob）通过标识引用到的 Mob，按发现顺序去重
pub fn referenced_mobs(provider: &dyn GraphProvider, mob: ObjectKey) -> Vec<ObjectKey> {
    let mut seen_objects = HashSet::new();
    let mut seen_mobs = HashSet::new();
    let mut out = Vec::new();
    let mut stack = vec![mob];

    while let Some(key) = stack.pop() {
        if !seen_objects.insert(key) {
            continue;
        }
        let Some(obj) = provider.get(key) else {
            continue;
        };
        if key != mob && obj.tag.is_mob() {
            continue;
        }
        let mut ids: Vec<&MobId> = Vec::new();
        for p in &obj.properties {
            p.value.mob_refs(&mut ids);
        }
        for id in ids {
            if let Some(target) = provider.lookup_identity(id) {
                if seen_mobs.insert(target) {
                    out.push(target);
                }
            }
        }
        // 逆序入栈以保持声明顺序的先序遍历
        let refs = obj.strong_refs();
        stack.extend(refs.into_iter().rev());
    }
    out
}

fn mobs_of(provider: &dyn GraphProvider, tag: TypeTag) -> Vec<ObjectKey> {
    provider
        .objects()
        .filter(|k| provider.type_of(*k) == Some(tag))
        .collect()
}

/// 按模式选出根对象，保持声明顺序
pub fn select_roots(provider: &dyn GraphProvider, mode: ViewMode) -> Vec<ObjectKey> {
    match mode {
        ViewMode::AllCompositions => mobs_of(provider, TypeTag::CompositionMob),
        ViewMode::MasterMobs => mobs_of(provider, TypeTag::MasterMob),
        ViewMode::SourceMobs => mobs_of(provider, TypeTag::SourceMob),
        ViewMode::TopLevelCompositions => {
            let comps = mobs_of(provider, TypeTag::CompositionMob);
            let mut incoming: HashMap<ObjectKey, usize> = comps.iter().map(|k| (*k, 0)).collect();
            for comp in &comps {
                for target in referenced_mobs(provider, *comp) {
                    if target == *comp {
                        continue;
                    }
                    if let Some(count) = incoming.get_mut(&target) {
                        *count += 1;
                    }
                }
            }
            comps
                .into_iter()
                .filter(|k| incoming.get(k).copied() == Some(0))
                .collect()
        }
    }
}

/// 提供者实际暴露的分组（Mobs 分组总是可用）
pub fn select_groups(provider: &dyn GraphProvider, kinds: &[GroupKind]) -> Vec<GroupKind> {
    let mut out = Vec::new();
    for kind in kinds {
        if out.contains(kind) {
            continue;
        }
        if *kind == GroupKind::Mobs || provider.group(*kind).is_some() {
            out.push(*kind);
        } else {
            tracing::warn!("对象图中不存在分组: {:?}", kind);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::graph::{GraphBuilder, GraphObject, ObjectGraph, PropertyValue};

    fn comp(b: &mut GraphBuilder, id: &str, nested: &[&str]) -> ObjectKey {
        let clips: Vec<PropertyValue> = nested
            .iter()
            .map(|n| {
                PropertyValue::Ref(b.add(GraphObject::new("SourceClip", TypeTag::SourceClip)
                    .with_property("SourceID", PropertyValue::Mob(MobId::new(*n)))))
            })
            .collect();
        let seq = b.add(GraphObject::new("Sequence", TypeTag::Segment)
            .with_property("Components", PropertyValue::List(clips)));
        let slot = b.add(GraphObject::new("TimelineMobSlot", TypeTag::Slot)
            .with_property("Segment", PropertyValue::Ref(seq)));
        b.add(GraphObject::new("CompositionMob", TypeTag::CompositionMob)
            .with_identity(MobId::new(id))
            .with_property("Slots", PropertyValue::List(vec![PropertyValue::Ref(slot)])))
    }

    /// A 嵌套 B；C 独立；另有一个主 Mob 和源 Mob
    fn abc_graph() -> (ObjectGraph, [ObjectKey; 5]) {
        let mut b = GraphBuilder::new();
        let src = b.add(GraphObject::new("SourceMob", TypeTag::SourceMob).with_identity(MobId::new("s")));
        let a = comp(&mut b, "a", &["b", "s"]);
        let bb = comp(&mut b, "b", &["s"]);
        let c = comp(&mut b, "c", &[]);
        let master = b.add(GraphObject::new("MasterMob", TypeTag::MasterMob).with_identity(MobId::new("m")));
        (b.build().unwrap(), [src, a, bb, c, master])
    }

    #[test]
    fn test_top_level_excludes_nested() {
        let (graph, [_, a, _, c, _]) = abc_graph();
        assert_eq!(select_roots(&graph, ViewMode::TopLevelCompositions), vec![a, c]);
    }

    #[test]
    fn test_all_compositions_exact_in_declaration_order() {
        let (graph, [_, a, b, c, _]) = abc_graph();
        let roots = select_roots(&graph, ViewMode::AllCompositions);
        assert_eq!(roots, vec![a, b, c]);
        let unique: HashSet<_> = roots.iter().collect();
        assert_eq!(unique.len(), roots.len());
    }

    #[test]
    fn test_master_and_source_modes() {
        let (graph, [src, _, _, _, master]) = abc_graph();
        assert_eq!(select_roots(&graph, ViewMode::MasterMobs), vec![master]);
        assert_eq!(select_roots(&graph, ViewMode::SourceMobs), vec![src]);
    }

    #[test]
    fn test_self_nesting_is_still_top_level() {
        let mut b = GraphBuilder::new();
        let x = comp(&mut b, "x", &["x"]);
        let graph = b.build().unwrap();
        assert_eq!(select_roots(&graph, ViewMode::TopLevelCompositions), vec![x]);
    }

    #[test]
    fn test_mutual_nesting_has_no_top_level() {
        let mut b = GraphBuilder::new();
        comp(&mut b, "p", &["q"]);
        comp(&mut b, "q", &["p"]);
        let graph = b.build().unwrap();
        assert!(select_roots(&graph, ViewMode::TopLevelCompositions).is_empty());
    }

    #[test]
    fn test_referenced_mobs_in_declaration_order() {
        let (graph, [src, a, b, _, _]) = abc_graph();
        assert_eq!(referenced_mobs(&graph, a), vec![b, src]);
    }

    #[test]
    fn test_parse_mode_and_group() {
        assert_eq!("toplevel".parse::<ViewMode>().unwrap(), ViewMode::TopLevelCompositions);
        assert_eq!("SourceMobs".parse::<ViewMode>().unwrap(), ViewMode::SourceMobs);
        assert!(matches!("timeline".parse::<ViewMode>(), Err(AppError::InvalidArgument(_))));

        assert_eq!(parse_group("metadict").unwrap(), GroupKind::MetaDictionary);
        assert!(parse_group("nope").is_err());
    }

    #[test]
    fn test_select_groups_skips_missing() {
        let mut b = GraphBuilder::new();
        let def = b.add(GraphObject::new("DataDef", TypeTag::Object));
        b.group(GroupKind::Dictionary, vec![def]);
        let graph = b.build().unwrap();

        let groups = select_groups(
            &graph,
            &[GroupKind::Dictionary, GroupKind::MetaDictionary, GroupKind::Mobs, GroupKind::Dictionary],
        );
        assert_eq!(groups, vec![GroupKind::Dictionary, GroupKind::Mobs]);
    }
}
