//! 时间线提取：把合成 Mob 的 Components 序列整理为剪辑事件列表

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use serde_json::Value;

use crate::model::export::scalar_to_json;
use crate::model::graph::{GraphObject, GraphProvider, ObjectKey, PropertyValue, TypeTag};

pub const UNKNOWN_CLIP: &str = "Unknown Clip";
pub const UNKNOWN_EFFECT: &str = "Unknown Effect";
pub const UNKNOWN_PARAMETER: &str = "Unknown Parameter";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Keyframe {
    pub time_offset: Value,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Effect {
    pub name: String,
    pub animated_params: BTreeMap<String, Vec<Keyframe>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClipEvent {
    pub event_number: usize,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub name: String,
    pub start_time_frames: i64,
    pub duration_frames: i64,
    pub source_in_tc: Option<Value>,
    pub effects: Vec<Effect>,
}

fn refs_of(value: Option<&PropertyValue>) -> Vec<ObjectKey> {
    let mut out = Vec::new();
    if let Some(v) = value {
        v.strong_refs(&mut out);
    }
    out
}

/// 在片段树中先序查找第一个带 Components 序列的对象
fn find_components(provider: &dyn GraphProvider, start: ObjectKey) -> Option<Vec<ObjectKey>> {
    let mut seen = HashSet::new();
    let mut stack = vec![start];
    while let Some(key) = stack.pop() {
        if !seen.insert(key) {
            continue;
        }
        let obj = provider.get(key)?;
        if let Some(PropertyValue::List(items)) = obj.property("Components") {
            let mut out = Vec::new();
            items.iter().for_each(|v| v.strong_refs(&mut out));
            return Some(out);
        }
        stack.extend(obj.strong_refs().into_iter().rev());
    }
    None
}

fn clip_name(provider: &dyn GraphProvider, clip: &GraphObject) -> String {
    let mut ids = Vec::new();
    for p in &clip.properties {
        p.value.mob_refs(&mut ids);
    }
    ids.into_iter()
        .find_map(|id| provider.lookup_identity(id))
        .and_then(|k| provider.get(k))
        .and_then(GraphObject::display_name)
        .unwrap_or(UNKNOWN_CLIP)
        .to_string()
}

fn keyframes(provider: &dyn GraphProvider, varying: &GraphObject) -> Vec<Keyframe> {
    refs_of(varying.property("PointList").or_else(|| varying.property("ControlPoints")))
        .into_iter()
        .filter_map(|k| provider.get(k))
        .filter(|cp| cp.class_name == "ControlPoint")
        .filter_map(|cp| {
            let time = cp.property("Time").and_then(scalar_to_json)?;
            let value = cp.property("Value").and_then(scalar_to_json)?;
            Some(Keyframe { time_offset: time, value })
        })
        .collect()
}

fn parse_effect(provider: &dyn GraphProvider, group: &GraphObject) -> Effect {
    let mut animated_params = BTreeMap::new();
    for param in refs_of(group.property("Parameters")).into_iter().filter_map(|k| provider.get(k)) {
        if param.class_name != "VaryingValue" {
            continue;
        }
        let frames = keyframes(provider, param);
        if !frames.is_empty() {
            let name = param.display_name().unwrap_or(UNKNOWN_PARAMETER).to_string();
            animated_params.insert(name, frames);
        }
    }
    Effect {
        name: group.display_name().unwrap_or(UNKNOWN_EFFECT).to_string(),
        animated_params,
    }
}

fn parse_components(provider: &dyn GraphProvider, components: &[ObjectKey]) -> Vec<ClipEvent> {
    let mut timeline: Vec<ClipEvent> = Vec::new();
    let mut current = 0i64;
    for obj in components.iter().filter_map(|k| provider.get(*k)) {
        if obj.tag == TypeTag::SourceClip {
            let duration = obj.property("Length").and_then(PropertyValue::as_int).unwrap_or(0);
            timeline.push(ClipEvent {
                event_number: timeline.len() + 1,
                kind: "Clip",
                name: clip_name(provider, obj),
                start_time_frames: current,
                duration_frames: duration,
                source_in_tc: obj.property("StartTime").and_then(scalar_to_json),
                effects: Vec::new(),
            });
            current += duration;
        } else if obj.class_name == "OperationGroup" {
            let effect = parse_effect(provider, obj);
            if let Some(last) = timeline.last_mut() {
                if !effect.animated_params.is_empty() {
                    last.effects.push(effect);
                }
            }
        }
    }
    timeline
}

/// 合成 Mob 的时间线：取第一个能产出事件的 slot
pub fn composition_timeline(provider: &dyn GraphProvider, mob: ObjectKey) -> Vec<ClipEvent> {
    let Some(obj) = provider.get(mob) else {
        return Vec::new();
    };
    for slot in obj.strong_refs().into_iter().filter(|k| provider.type_of(*k) == Some(TypeTag::Slot)) {
        // 没有 Components 序列时，slot 直接引用的片段本身就是唯一组件
        let components = find_components(provider, slot)
            .unwrap_or_else(|| provider.get(slot).map(GraphObject::strong_refs).unwrap_or_default());
        let timeline = parse_components(provider, &components);
        if !timeline.is_empty() {
            return timeline;
        }
    }
    Vec::new()
}

/// 所有合成 Mob 中事件最多的有效时间线
///
/// 只有一个事件且名称未知的时间线视为无效。
pub fn best_timeline(provider: &dyn GraphProvider) -> Option<Vec<ClipEvent>> {
    let mut best: Option<Vec<ClipEvent>> = None;
    for key in provider.objects() {
        if provider.type_of(key) != Some(TypeTag::CompositionMob) {
            continue;
        }
        let timeline = composition_timeline(provider, key);
        let good = timeline.len() > 1 || (timeline.len() == 1 && timeline[0].name != UNKNOWN_CLIP);
        if good && best.as_ref().map_or(true, |b| timeline.len() > b.len()) {
            best = Some(timeline);
        }
    }
    best
}
