//! Session：检查会话的核心状态，对展示层暴露树索引契约与属性查询

use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::model::adapter::NodeAdapter;
use crate::model::export::{export_node, export_roots};
use crate::model::graph::{DecodeError, GraphProvider, GroupKind, ObjectGraph, TypeTag};
use crate::model::search::{search, SearchHit, SearchLimits};
use crate::model::timeline::{best_timeline, composition_timeline, ClipEvent};
use crate::model::tree_index::{Parent, RowId, TreeIndex};
use crate::model::view_filter::{select_groups, select_roots, ViewMode};
use crate::utils::fs::{read_container_file, read_json_file, write_json_file};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO失败: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON解析失败: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("容器解码失败: {0}")]
    Decode(#[from] DecodeError),
    #[error("无效的行号: {0}")]
    InvalidHandle(RowId),
    #[error("无效参数: {0}")]
    InvalidArgument(String),
    #[error("状态错误: {0}")]
    State(String),
}

fn default_modes() -> Vec<ViewMode> {
    vec![ViewMode::TopLevelCompositions]
}

/// 会话配置：容器路径与显示选项，在会话开始前一次性确定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub path: PathBuf,
    #[serde(default = "default_modes")]
    pub modes: Vec<ViewMode>,
    #[serde(default)]
    pub groups: Vec<GroupKind>,
}

impl SessionConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), modes: default_modes(), groups: Vec::new() }
    }

    pub fn with_modes(mut self, modes: Vec<ViewMode>) -> Self {
        self.modes = modes;
        self
    }

    pub fn with_groups(mut self, groups: Vec<GroupKind>) -> Self {
        self.groups = groups;
        self
    }

    /// 从 JSON 配置文件读取
    pub fn from_json_file(p: &Path) -> Result<Self, AppError> {
        let v = read_json_file(p)?;
        Ok(serde_json::from_value(v)?)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.modes.is_empty() && self.groups.is_empty() {
            return Err(AppError::InvalidArgument("没有选择任何显示选项".into()));
        }
        Ok(())
    }
}

/// 查找游标（与上一次查找词绑定）
#[derive(Debug, Default)]
struct SearchState {
    term: String,
    hits: Vec<SearchHit>,
    cursor: Option<usize>,
}

#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    graph: ObjectGraph,
    index: TreeIndex,
    search: SearchState,
    limits: SearchLimits,
}

impl Session {
    /// 读取并解码容器文件，按配置建立根行
    pub fn open(config: SessionConfig) -> Result<Self, AppError> {
        config.validate()?;
        let start = Instant::now();
        let graph = read_container_file(&config.path)?;
        tracing::info!(
            "容器解码完成: {}，{} 个对象，耗时: {:.1}ms",
            config.path.display(),
            graph.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        Self::from_graph(graph, config)
    }

    /// 使用已解码的对象图建立会话
    pub fn from_graph(graph: ObjectGraph, config: SessionConfig) -> Result<Self, AppError> {
        config.validate()?;
        let index = Self::build_index(&graph, &config);
        Ok(Self {
            config,
            graph,
            index,
            search: SearchState::default(),
            limits: SearchLimits::default(),
        })
    }

    fn build_index(graph: &ObjectGraph, config: &SessionConfig) -> TreeIndex {
        let mut index = TreeIndex::new();
        for mode in ViewMode::ALL.into_iter().filter(|m| config.modes.contains(m)) {
            let roots = select_roots(graph, mode);
            tracing::info!("添加视图 {}: {} 个根", mode.title(), roots.len());
            for key in roots {
                index.register_root(NodeAdapter::root_object(graph, key));
            }
        }
        for kind in select_groups(graph, &config.groups) {
            index.register_root(NodeAdapter::root_group(kind));
        }
        if index.roots().is_empty() {
            tracing::warn!("没有选择显示选项或所选视图下没有数据");
        }
        index
    }

    /// 以相同配置重新加载文件；解码失败时保留当前状态
    pub fn reload(&mut self) -> Result<(), AppError> {
        let graph = read_container_file(&self.config.path)?;
        self.index = Self::build_index(&graph, &self.config);
        self.graph = graph;
        self.search = SearchState::default();
        tracing::info!("重新加载完成: {}", self.config.path.display());
        Ok(())
    }

    /// 更换遍历上限；已有的查找结果作废
    pub fn set_search_limits(&mut self, limits: SearchLimits) {
        self.limits = limits;
        self.search = SearchState::default();
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn provider(&self) -> &dyn GraphProvider {
        &self.graph
    }

    pub fn roots(&self) -> &[RowId] {
        self.index.roots()
    }

    pub fn expand(&mut self, row: RowId) -> Result<Vec<RowId>, AppError> {
        self.index.expand(&self.graph, row)
    }

    pub fn collapse(&mut self, row: RowId) -> Result<(), AppError> {
        self.index.collapse(row)
    }

    pub fn parent_of(&self, row: RowId) -> Result<Parent, AppError> {
        self.index.parent_of(row)
    }

    pub fn resolve(&self, row: RowId) -> Result<&Rc<NodeAdapter>, AppError> {
        self.index.resolve(row)
    }

    pub fn is_expanded(&self, row: RowId) -> Result<bool, AppError> {
        self.index.is_expanded(row)
    }

    pub fn children_of(&self, row: RowId) -> Result<Option<&[RowId]>, AppError> {
        self.index.children_of(row)
    }

    pub fn label(&self, row: RowId) -> Result<String, AppError> {
        Ok(self.resolve(row)?.label(&self.graph))
    }

    pub fn child_count(&self, row: RowId) -> Result<usize, AppError> {
        Ok(self.resolve(row)?.child_count(&self.graph))
    }

    pub fn properties(&self, row: RowId) -> Result<Vec<(String, String)>, AppError> {
        Ok(self.resolve(row)?.properties(&self.graph))
    }

    /// 回指节点的跳转：返回当前路径上包装目标 Mob 的祖先行
    pub fn navigate_back_reference(&self, row: RowId) -> Result<RowId, AppError> {
        let node = self.resolve(row)?;
        let target = node
            .back_reference_target()
            .ok_or_else(|| AppError::InvalidArgument(format!("行 {} 不是回指节点", row)))?;
        for ancestor in self.index.ancestors(row)? {
            if self.index.resolve(ancestor)?.object_key() == Some(target) {
                return Ok(ancestor);
            }
        }
        Err(AppError::State(format!("行 {} 的回指目标不在当前路径上", row)))
    }

    fn root_adapters(&self) -> Result<Vec<Rc<NodeAdapter>>, AppError> {
        self.index
            .roots()
            .iter()
            .map(|r| self.index.resolve(*r).cloned())
            .collect()
    }

    fn run_search(&mut self, term: &str) -> Result<(), AppError> {
        let start = Instant::now();
        let roots = self.root_adapters()?;
        self.search = SearchState {
            term: term.to_lowercase(),
            hits: search(&self.graph, &roots, term, self.limits),
            cursor: None,
        };
        tracing::info!(
            "查找 '{}': {} 个匹配，耗时: {:.1}ms",
            term,
            self.search.hits.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(())
    }

    fn step_search(&mut self, term: &str, forward: bool) -> Result<Option<RowId>, AppError> {
        if term.is_empty() {
            return Ok(None);
        }
        if term.to_lowercase() != self.search.term {
            self.run_search(term)?;
        }
        let len = self.search.hits.len();
        if len == 0 {
            return Ok(None);
        }
        let next = match (self.search.cursor, forward) {
            (None, true) => 0,
            (None, false) => len - 1,
            (Some(i), true) => (i + 1) % len,
            (Some(i), false) => (i + len - 1) % len,
        };
        self.search.cursor = Some(next);
        let path = self.search.hits[next].path.clone();
        self.reveal(&path).map(Some)
    }

    /// 查找下一个匹配（到末尾时回到开头），并展开到该节点
    pub fn find_next(&mut self, term: &str) -> Result<Option<RowId>, AppError> {
        self.step_search(term, true)
    }

    pub fn find_previous(&mut self, term: &str) -> Result<Option<RowId>, AppError> {
        self.step_search(term, false)
    }

    /// 当前匹配的位置与总数（1 起始）
    pub fn search_position(&self) -> Option<(usize, usize)> {
        self.search.cursor.map(|c| (c + 1, self.search.hits.len()))
    }

    /// 沿序号路径逐级展开，返回目标行
    pub fn reveal(&mut self, path: &[usize]) -> Result<RowId, AppError> {
        let (first, rest) = path
            .split_first()
            .ok_or_else(|| AppError::InvalidArgument("空路径".into()))?;
        let mut row = *self
            .index
            .roots()
            .get(*first)
            .ok_or_else(|| AppError::State(format!("根序号不存在: {}", first)))?;
        for ordinal in rest {
            let kids = self.expand(row)?;
            row = *kids
                .get(*ordinal)
                .ok_or_else(|| AppError::State(format!("子序号不存在: {}", ordinal)))?;
        }
        Ok(row)
    }

    /// 广度优先展开到指定深度，返回展开的行数
    pub fn expand_all(&mut self, row: RowId, max_depth: usize) -> Result<usize, AppError> {
        let start = Instant::now();
        let mut queue = std::collections::VecDeque::from([(row, 0usize)]);
        let mut expanded = 0;
        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            let kids = self.expand(current)?;
            if !kids.is_empty() {
                expanded += 1;
            }
            queue.extend(kids.into_iter().map(|k| (k, depth + 1)));
        }
        tracing::info!(
            "全部展开: 行 {}，深度 {}，{} 行，耗时: {:.1}ms",
            row,
            max_depth,
            expanded,
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(expanded)
    }

    pub fn collapse_all(&mut self) -> Result<(), AppError> {
        let roots = self.index.roots().to_vec();
        for r in roots {
            self.index.collapse(r)?;
        }
        Ok(())
    }

    pub fn export_row(&self, row: RowId) -> Result<Value, AppError> {
        Ok(export_node(&self.graph, self.resolve(row)?))
    }

    pub fn export_all(&self) -> Result<Value, AppError> {
        Ok(export_roots(&self.graph, &self.root_adapters()?))
    }

    /// 导出到文件；row 为 None 时导出全部根
    pub fn export_to_file(&self, path: &Path, row: Option<RowId>) -> Result<(), AppError> {
        let start = Instant::now();
        let value = match row {
            Some(r) => self.export_row(r)?,
            None => self.export_all()?,
        };
        write_json_file(path, &value)?;
        tracing::info!(
            "导出完成: {}，耗时: {:.1}ms",
            path.display(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(())
    }

    /// 合成 Mob 行的剪辑时间线
    pub fn timeline(&self, row: RowId) -> Result<Vec<ClipEvent>, AppError> {
        let node = self.resolve(row)?;
        match node.object_key() {
            Some(key) if self.graph.type_of(key) == Some(TypeTag::CompositionMob) => {
                Ok(composition_timeline(&self.graph, key))
            }
            _ => Err(AppError::InvalidArgument(format!("行 {} 不是合成 Mob", row))),
        }
    }

    /// 全部合成 Mob 中事件最多的有效时间线
    pub fn best_timeline(&self) -> Option<Vec<ClipEvent>> {
        best_timeline(&self.graph)
    }
}
