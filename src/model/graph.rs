//! 对象图（Object Graph）：容器解码后的只读对象集合与提供者边界
//!
//! 字节级解码由外部解码器完成，这里只接收其输出的对象图转储（JSON），
//! 校验后构建一个会话期间不可变的对象仓库。

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 对象在仓库中的位置（声明顺序下标）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectKey(pub usize);

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 全局唯一的 Mob 标识（例如 SMPTE UMID 的 URN 形式）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MobId(String);

impl MobId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 对象类型标签（封闭枚举）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeTag {
    CompositionMob,
    MasterMob,
    SourceMob,
    Slot,
    Segment,
    SourceClip,
    /// 通用属性包（描述符、字典定义、TaggedValue 等）
    Object,
}

impl TypeTag {
    pub fn is_mob(self) -> bool {
        matches!(self, Self::CompositionMob | Self::MasterMob | Self::SourceMob)
    }
}

/// 属性值：标量、强引用、弱标识引用或有序序列
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    /// 强引用：被引用对象归属于当前对象
    Ref(ObjectKey),
    /// 弱引用：通过标识查找另一个 Mob
    Mob(MobId),
    List(Vec<PropertyValue>),
}

impl PropertyValue {
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Self::Ref(_) | Self::Mob(_) | Self::List(_))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// 按声明顺序收集值内（含嵌套序列）的所有强引用
    pub fn strong_refs(&self, out: &mut Vec<ObjectKey>) {
        match self {
            Self::Ref(key) => out.push(*key),
            Self::List(items) => items.iter().for_each(|v| v.strong_refs(out)),
            _ => {}
        }
    }

    /// 按声明顺序收集值内的所有弱标识引用
    pub fn mob_refs<'a>(&'a self, out: &mut Vec<&'a MobId>) {
        match self {
            Self::Mob(id) => out.push(id),
            Self::List(items) => items.iter().for_each(|v| v.mob_refs(out)),
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub value: PropertyValue,
}

/// 解码后的容器实体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphObject {
    /// 容器中的类名（例如 Sequence、TimelineMobSlot）
    #[serde(rename = "class")]
    pub class_name: String,
    pub tag: TypeTag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<MobId>,
    #[serde(default)]
    pub properties: Vec<Property>,
}

impl GraphObject {
    pub fn new(class_name: impl Into<String>, tag: TypeTag) -> Self {
        Self {
            class_name: class_name.into(),
            tag,
            identity: None,
            properties: Vec::new(),
        }
    }

    pub fn with_identity(mut self, id: MobId) -> Self {
        self.identity = Some(id);
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: PropertyValue) -> Self {
        self.properties.push(Property { name: name.into(), value });
        self
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.iter().find(|p| p.name == name).map(|p| &p.value)
    }

    /// 人类可读名称（Name 属性，非空时）
    pub fn display_name(&self) -> Option<&str> {
        self.property("Name")
            .and_then(PropertyValue::as_text)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn strong_refs(&self) -> Vec<ObjectKey> {
        let mut out = Vec::new();
        for p in &self.properties {
            p.value.strong_refs(&mut out);
        }
        out
    }
}

/// 非 Mob 的顶层对象集合（字典、元字典等）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    Mobs,
    Dictionary,
    MetaDictionary,
    EssenceData,
    Header,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub kind: GroupKind,
    pub members: Vec<ObjectKey>,
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("对象图解析失败: {0}")]
    Json(#[from] serde_json::Error),
    #[error("对象 {owner} 的引用越界: {target}")]
    DanglingRef { owner: ObjectKey, target: ObjectKey },
    #[error("对象 {0} 强引用了自身")]
    SelfRef(ObjectKey),
    #[error("对象 {0} 处在强引用环上")]
    StrongRefCycle(ObjectKey),
    #[error("重复的 Mob 标识: {0}")]
    DuplicateIdentity(MobId),
    #[error("分组 {kind:?} 的成员越界: {member}")]
    DanglingGroupMember { kind: GroupKind, member: ObjectKey },
}

/// 提供者边界：核心只读，从不写回
pub trait GraphProvider {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, key: ObjectKey) -> Option<&GraphObject>;

    fn type_of(&self, key: ObjectKey) -> Option<TypeTag> {
        self.get(key).map(|o| o.tag)
    }

    fn class_name(&self, key: ObjectKey) -> Option<&str> {
        self.get(key).map(|o| o.class_name.as_str())
    }

    fn properties_of(&self, key: ObjectKey) -> &[Property] {
        self.get(key).map(|o| o.properties.as_slice()).unwrap_or(&[])
    }

    fn identity_of(&self, key: ObjectKey) -> Option<&MobId> {
        self.get(key).and_then(|o| o.identity.as_ref())
    }

    fn lookup_identity(&self, id: &MobId) -> Option<ObjectKey>;

    fn group(&self, kind: GroupKind) -> Option<&[ObjectKey]>;

    /// 声明顺序下的全部对象键
    fn objects(&self) -> Box<dyn Iterator<Item = ObjectKey> + '_> {
        Box::new((0..self.len()).map(ObjectKey))
    }
}

#[derive(Debug, Clone, Deserialize)]
struct GraphDump {
    objects: Vec<GraphObject>,
    #[serde(default)]
    groups: Vec<Group>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    New,
    OnStack,
    Done,
}

/// 强引用必须构成森林：迭代 DFS，回到栈上的对象即为环
fn check_strong_acyclic(objects: &[GraphObject]) -> Result<(), DecodeError> {
    let mut state = vec![Visit::New; objects.len()];
    for start in 0..objects.len() {
        if state[start] != Visit::New {
            continue;
        }
        state[start] = Visit::OnStack;
        let mut stack: Vec<(usize, Vec<ObjectKey>, usize)> = vec![(start, objects[start].strong_refs(), 0)];
        while let Some((key, refs, next)) = stack.last_mut() {
            let Some(target) = refs.get(*next).copied() else {
                state[*key] = Visit::Done;
                stack.pop();
                continue;
            };
            *next += 1;
            match state[target.0] {
                Visit::OnStack => return Err(DecodeError::StrongRefCycle(target)),
                Visit::Done => {}
                Visit::New => {
                    state[target.0] = Visit::OnStack;
                    stack.push((target.0, objects[target.0].strong_refs(), 0));
                }
            }
        }
    }
    Ok(())
}

/// 内存对象仓库（解码后不可变）
#[derive(Debug, Clone, Default)]
pub struct ObjectGraph {
    objects: Vec<GraphObject>,
    groups: Vec<Group>,
    by_identity: HashMap<MobId, ObjectKey>,
}

impl ObjectGraph {
    /// 解码外部解码器输出的对象图转储
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let dump: GraphDump = serde_json::from_slice(bytes)?;
        Self::from_parts(dump.objects, dump.groups)
    }

    fn from_parts(objects: Vec<GraphObject>, groups: Vec<Group>) -> Result<Self, DecodeError> {
        let mut by_identity = HashMap::new();
        for (idx, obj) in objects.iter().enumerate() {
            let owner = ObjectKey(idx);
            for target in obj.strong_refs() {
                if target.0 >= objects.len() {
                    return Err(DecodeError::DanglingRef { owner, target });
                }
                if target == owner {
                    return Err(DecodeError::SelfRef(owner));
                }
            }
            if let Some(id) = &obj.identity {
                if by_identity.insert(id.clone(), owner).is_some() {
                    return Err(DecodeError::DuplicateIdentity(id.clone()));
                }
            }
        }
        for group in &groups {
            if let Some(member) = group.members.iter().find(|m| m.0 >= objects.len()) {
                return Err(DecodeError::DanglingGroupMember { kind: group.kind, member: *member });
            }
        }
        check_strong_acyclic(&objects)?;
        Ok(Self { objects, groups, by_identity })
    }

    /// 序列化为与 decode 对称的转储格式
    pub fn to_dump_json(&self) -> serde_json::Value {
        serde_json::json!({
            "objects": self.objects,
            "groups": self.groups,
        })
    }
}

impl GraphProvider for ObjectGraph {
    fn len(&self) -> usize {
        self.objects.len()
    }

    fn get(&self, key: ObjectKey) -> Option<&GraphObject> {
        self.objects.get(key.0)
    }

    fn lookup_identity(&self, id: &MobId) -> Option<ObjectKey> {
        self.by_identity.get(id).copied()
    }

    fn group(&self, kind: GroupKind) -> Option<&[ObjectKey]> {
        self.groups
            .iter()
            .find(|g| g.kind == kind)
            .map(|g| g.members.as_slice())
    }
}

/// 以编程方式构建对象图（测试与性能基准使用）
#[derive(Debug, Default)]
pub struct GraphBuilder {
    objects: Vec<GraphObject>,
    groups: Vec<Group>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, obj: GraphObject) -> ObjectKey {
        self.objects.push(obj);
        ObjectKey(self.objects.len() - 1)
    }

    /// 预留一个位置，稍后用 `set` 填充（用于先分配子对象键的场景）
    pub fn reserve(&mut self, class_name: &str, tag: TypeTag) -> ObjectKey {
        self.add(GraphObject::new(class_name, tag))
    }

    pub fn set(&mut self, key: ObjectKey, obj: GraphObject) {
        if let Some(slot) = self.objects.get_mut(key.0) {
            *slot = obj;
        }
    }

    pub fn group(&mut self, kind: GroupKind, members: Vec<ObjectKey>) {
        self.groups.push(Group { kind, members });
    }

    pub fn build(self) -> Result<ObjectGraph, DecodeError> {
        ObjectGraph::from_parts(self.objects, self.groups)
    }
}
