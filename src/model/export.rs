//! JSON 导出：name/class/value/children 结构，以及整批容器的转换

use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Instant;

use serde_json::{Map, Value};

use crate::model::adapter::NodeAdapter;
use crate::model::data_core::AppError;
use crate::model::graph::{GraphProvider, GroupKind, PropertyValue};
use crate::utils::fs::{read_container_file, write_json_file};

/// 导出时跳过的音轨/数据轨 slot 名称（不区分大小写）
pub const EXCLUDED_SLOT_NAMES: [&str; 9] = ["a1", "a2", "a3", "a4", "a5", "a6", "a7", "a8", "data"];

const SLOT_CLASS: &str = "TimelineMobSlot";

pub fn is_excluded_slot(provider: &dyn GraphProvider, node: &NodeAdapter) -> bool {
    let name = node.label(provider).to_lowercase();
    node.class_name(provider) == SLOT_CLASS && EXCLUDED_SLOT_NAMES.contains(&name.as_str())
}

/// 标量属性值转为 JSON；引用与序列由子节点表达，返回 None
pub fn scalar_to_json(value: &PropertyValue) -> Option<Value> {
    match value {
        PropertyValue::Null => Some(Value::Null),
        PropertyValue::Bool(b) => Some(Value::Bool(*b)),
        PropertyValue::Int(v) => Some(Value::from(*v)),
        PropertyValue::Float(v) => Some(serde_json::Number::from_f64(*v).map(Value::Number).unwrap_or(Value::Null)),
        PropertyValue::Text(s) => Some(Value::String(s.clone())),
        PropertyValue::Bytes(b) => Some(Value::String(b.iter().map(|x| format!("{:02x}", x)).collect())),
        PropertyValue::Ref(_) | PropertyValue::Mob(_) | PropertyValue::List(_) => None,
    }
}

/// 导出节点及其全部子树
///
/// 回指节点作为叶子导出；强引用在解码时已保证无环，因此必然终止。
/// 子节点中名称属于 `EXCLUDED_SLOT_NAMES` 的 slot 被跳过。
pub fn export_node(provider: &dyn GraphProvider, node: &Rc<NodeAdapter>) -> Value {
    let mut data = Map::new();
    data.insert("name".into(), Value::String(node.label(provider)));
    data.insert("class".into(), Value::String(node.class_name(provider)));
    if let Some(v) = node.raw_value(provider).and_then(scalar_to_json) {
        data.insert("value".into(), v);
    }
    let children: Vec<Value> = node
        .children(provider)
        .iter()
        .filter(|child| !is_excluded_slot(provider, child))
        .map(|child| export_node(provider, child))
        .collect();
    if !children.is_empty() {
        data.insert("children".into(), Value::Array(children));
    }
    Value::Object(data)
}

/// 多个根包装在一个 Root 节点下
pub fn export_roots(provider: &dyn GraphProvider, roots: &[Rc<NodeAdapter>]) -> Value {
    let children: Vec<Value> = roots
        .iter()
        .filter(|r| !is_excluded_slot(provider, r))
        .map(|r| export_node(provider, r))
        .collect();
    serde_json::json!({
        "name": "Root",
        "class": "Root",
        "children": children,
    })
}

/// 批量转换结果
#[derive(Debug, Default)]
pub struct BatchReport {
    pub converted: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

/// 单个容器的整体导出：Header 分组（没有时退回 Mobs 分组）包装在 Root 下
pub fn export_container(provider: &dyn GraphProvider) -> Value {
    let kind = if provider.group(GroupKind::Header).is_some() {
        GroupKind::Header
    } else {
        GroupKind::Mobs
    };
    export_roots(provider, &[NodeAdapter::root_group(kind)])
}

fn convert_one(input: &Path, out_dir: &Path) -> Result<PathBuf, AppError> {
    let stem = input
        .file_stem()
        .ok_or_else(|| AppError::InvalidArgument(format!("无效的文件名: {}", input.display())))?;
    let graph = read_container_file(input)?;
    let out = out_dir.join(format!("{}.json", stem.to_string_lossy()));
    write_json_file(&out, &export_container(&graph))?;
    Ok(out)
}

/// 逐个转换容器文件，每个输入写出 `<stem>.json`；单个文件失败只记录，不中断
pub fn batch_export(inputs: &[PathBuf], out_dir: &Path) -> Result<BatchReport, AppError> {
    std::fs::create_dir_all(out_dir)?;
    let start = Instant::now();
    let mut report = BatchReport::default();
    for (i, input) in inputs.iter().enumerate() {
        tracing::info!("处理第 {}/{} 个文件: {}", i + 1, inputs.len(), input.display());
        match convert_one(input, out_dir) {
            Ok(out) => {
                tracing::info!("  -> 已保存: {}", out.display());
                report.converted.push(out);
            }
            Err(e) => {
                tracing::error!("  -> 转换失败 {}: {}", input.display(), e);
                report.failed.push((input.clone(), e.to_string()));
            }
        }
    }
    tracing::info!(
        "批量转换完成: 成功 {}，失败 {}，耗时: {:.1}ms",
        report.converted.len(),
        report.failed.len(),
        start.elapsed().as_secs_f64() * 1000.0
    );
    Ok(report)
}
