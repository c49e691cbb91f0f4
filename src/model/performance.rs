//! 性能基准测试模块
//!
//! 用于测试大容器的解码、懒加载展开、查找和导出的性能

use std::time::Instant;

use crate::model::data_core::{Session, SessionConfig};
use crate::model::graph::{GraphBuilder, GraphObject, GraphProvider, MobId, ObjectGraph, PropertyValue, TypeTag};
use crate::model::view_filter::ViewMode;

/// 性能测试结果
#[derive(Debug)]
pub struct PerformanceResult {
    pub operation: String,
    pub duration_ms: u128,
    pub success: bool,
    pub details: String,
}

impl PerformanceResult {
    pub fn new(operation: &str, duration_ms: u128, success: bool, details: &str) -> Self {
        Self {
            operation: operation.to_string(),
            duration_ms,
            success,
            details: details.to_string(),
        }
    }
}

/// 生成测试用对象图
///
/// `width` 个源 Mob，`depth` 层嵌套合成 Mob，每层一个 slot，
/// slot 下的 Sequence 依次引用全部源 Mob，并引用下一层合成。
pub fn generate_large_graph(depth: usize, width: usize) -> ObjectGraph {
    let mut b = GraphBuilder::new();
    let sources: Vec<MobId> = (0..width)
        .map(|i| {
            let id = MobId::new(format!("urn:smpte:umid:source-{:08}", i));
            b.add(GraphObject::new("SourceMob", TypeTag::SourceMob)
                .with_identity(id.clone())
                .with_property("Name", PropertyValue::Text(format!("素材_{}", i))));
            id
        })
        .collect();

    let mut inner: Option<MobId> = None;
    for level in (0..depth).rev() {
        let mut components: Vec<PropertyValue> = sources
            .iter()
            .map(|id| {
                PropertyValue::Ref(b.add(GraphObject::new("SourceClip", TypeTag::SourceClip)
                    .with_property("Length", PropertyValue::Int(25))
                    .with_property("SourceID", PropertyValue::Mob(id.clone()))))
            })
            .collect();
        if let Some(id) = inner.take() {
            components.push(PropertyValue::Ref(b.add(GraphObject::new("SourceClip", TypeTag::SourceClip)
                .with_property("Length", PropertyValue::Int(25))
                .with_property("SourceID", PropertyValue::Mob(id)))));
        }
        let seq = b.add(GraphObject::new("Sequence", TypeTag::Segment)
            .with_property("Components", PropertyValue::List(components)));
        let slot = b.add(GraphObject::new("TimelineMobSlot", TypeTag::Slot)
            .with_property("Segment", PropertyValue::Ref(seq)));
        let id = MobId::new(format!("urn:smpte:umid:comp-{:08}", level));
        b.add(GraphObject::new("CompositionMob", TypeTag::CompositionMob)
            .with_identity(id.clone())
            .with_property("Name", PropertyValue::Text(format!("合成_{}", level)))
            .with_property("Slots", PropertyValue::List(vec![PropertyValue::Ref(slot)])));
        inner = Some(id);
    }

    // 生成的数据引用全部在范围内，build 不会失败；失败时退回空图
    b.build().unwrap_or_else(|e| {
        tracing::error!("生成测试对象图失败: {}", e);
        ObjectGraph::default()
    })
}

/// 测试容器解码性能
pub fn benchmark_decode(dump: &str) -> PerformanceResult {
    let start = Instant::now();
    let result = ObjectGraph::decode(dump.as_bytes());
    let duration = start.elapsed();

    match result {
        Ok(graph) => PerformanceResult::new(
            "容器解码",
            duration.as_millis(),
            true,
            &format!("解码了 {} 字节，{} 个对象", dump.len(), graph.len()),
        ),
        Err(e) => PerformanceResult::new("容器解码", duration.as_millis(), false, &format!("解码失败: {}", e)),
    }
}

/// 测试全部展开性能
pub fn benchmark_expand_all(session: &mut Session, max_depth: usize) -> PerformanceResult {
    let start = Instant::now();
    let mut expanded = 0;
    let mut failure = None;
    for root in session.roots().to_vec() {
        match session.expand_all(root, max_depth) {
            Ok(n) => expanded += n,
            Err(e) => {
                failure = Some(e.to_string());
                break;
            }
        }
    }
    let duration = start.elapsed();

    match failure {
        None => PerformanceResult::new(
            &format!("全部展开(深度{})", max_depth),
            duration.as_millis(),
            true,
            &format!("展开了 {} 行", expanded),
        ),
        Some(e) => PerformanceResult::new("全部展开", duration.as_millis(), false, &format!("展开失败: {}", e)),
    }
}

/// 测试查找性能
pub fn benchmark_search(session: &mut Session, term: &str) -> PerformanceResult {
    let start = Instant::now();
    let result = session.find_next(term);
    let duration = start.elapsed();

    match result {
        Ok(hit) => {
            let total = session.search_position().map(|(_, n)| n).unwrap_or(0);
            PerformanceResult::new(
                &format!("查找: {}", term),
                duration.as_millis(),
                hit.is_some(),
                &format!("{} 个匹配", total),
            )
        }
        Err(e) => PerformanceResult::new(&format!("查找: {}", term), duration.as_millis(), false, &format!("查找失败: {}", e)),
    }
}

/// 测试导出性能
pub fn benchmark_export(session: &Session) -> PerformanceResult {
    let start = Instant::now();
    let result = session.export_all().and_then(|v| Ok(serde_json::to_string(&v)?));
    let duration = start.elapsed();

    match result {
        Ok(s) => PerformanceResult::new("JSON导出", duration.as_millis(), true, &format!("导出了 {} 字节", s.len())),
        Err(e) => PerformanceResult::new("JSON导出", duration.as_millis(), false, &format!("导出失败: {}", e)),
    }
}

/// 运行综合性能测试
pub fn run_performance_suite() -> Vec<PerformanceResult> {
    let mut results = Vec::new();

    // 测试不同规模的数据
    let test_cases = [
        (3, 10),   // 小型：嵌套3层，10个源
        (5, 50),   // 中型：嵌套5层，50个源
        (6, 200),  // 大型：嵌套6层，200个源
    ];

    for (depth, width) in test_cases {
        tracing::info!("测试规模：深度{}，宽度{}", depth, width);

        let start = Instant::now();
        let graph = generate_large_graph(depth, width);
        results.push(PerformanceResult::new(
            &format!("数据生成({}x{})", depth, width),
            start.elapsed().as_millis(),
            true,
            &format!("生成了 {} 个对象", graph.len()),
        ));

        let dump = graph.to_dump_json().to_string();
        results.push(benchmark_decode(&dump));

        let config = SessionConfig::new("memory.json").with_modes(vec![ViewMode::TopLevelCompositions]);
        let mut session = match Session::from_graph(graph, config) {
            Ok(s) => s,
            Err(e) => {
                results.push(PerformanceResult::new("会话建立", 0, false, &e.to_string()));
                continue;
            }
        };
        results.push(benchmark_expand_all(&mut session, depth * 4));
        results.push(benchmark_search(&mut session, &format!("素材_{}", width - 1)));
        results.push(benchmark_export(&session));
    }

    results
}
