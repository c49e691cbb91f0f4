//! 树索引：给适配器节点分配稳定的行号，维护 行 -> 父行 的查找关系
//!
//! 行号在存活期间不会被复用；折叠后释放的行号进入空闲表，
//! 之后的分配可以复用。适配器的子节点缓存不受折叠影响。

use std::fmt;
use std::rc::Rc;

use crate::model::adapter::NodeAdapter;
use crate::model::data_core::AppError;
use crate::model::graph::GraphProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowId(u32);

impl RowId {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u32 {
        self.0
    }

    fn slot(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 父行：根哨兵或另一条存活的行
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parent {
    Root,
    Row(RowId),
}

#[derive(Debug)]
struct Entry {
    node: Rc<NodeAdapter>,
    parent: Parent,
    ordinal: usize,
    /// 已展开时的子行（按序）
    children: Option<Vec<RowId>>,
}

#[derive(Debug, Default)]
pub struct TreeIndex {
    entries: Vec<Option<Entry>>,
    free: Vec<u32>,
    roots: Vec<RowId>,
}

impl TreeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self, entry: Entry) -> RowId {
        if let Some(raw) = self.free.pop() {
            self.entries[raw as usize] = Some(entry);
            return RowId(raw);
        }
        self.entries.push(Some(entry));
        RowId((self.entries.len() - 1) as u32)
    }

    fn entry(&self, row: RowId) -> Result<&Entry, AppError> {
        self.entries
            .get(row.slot())
            .and_then(Option::as_ref)
            .ok_or(AppError::InvalidHandle(row))
    }

    fn entry_mut(&mut self, row: RowId) -> Result<&mut Entry, AppError> {
        self.entries
            .get_mut(row.slot())
            .and_then(Option::as_mut)
            .ok_or(AppError::InvalidHandle(row))
    }

    pub fn register_root(&mut self, node: Rc<NodeAdapter>) -> RowId {
        let ordinal = self.roots.len();
        let row = self.allocate(Entry { node, parent: Parent::Root, ordinal, children: None });
        self.roots.push(row);
        row
    }

    pub fn roots(&self) -> &[RowId] {
        &self.roots
    }

    pub fn resolve(&self, row: RowId) -> Result<&Rc<NodeAdapter>, AppError> {
        self.entry(row).map(|e| &e.node)
    }

    pub fn parent_of(&self, row: RowId) -> Result<Parent, AppError> {
        self.entry(row).map(|e| e.parent)
    }

    pub fn ordinal_of(&self, row: RowId) -> Result<usize, AppError> {
        self.entry(row).map(|e| e.ordinal)
    }

    pub fn is_expanded(&self, row: RowId) -> Result<bool, AppError> {
        self.entry(row).map(|e| e.children.is_some())
    }

    /// 已展开的子行；未展开时为 None
    pub fn children_of(&self, row: RowId) -> Result<Option<&[RowId]>, AppError> {
        self.entry(row).map(|e| e.children.as_deref())
    }

    /// 展开：委托适配器解析子节点，并为每个子节点分配新行号
    ///
    /// 对已展开的行重复调用返回现有的子行。
    pub fn expand(&mut self, provider: &dyn GraphProvider, row: RowId) -> Result<Vec<RowId>, AppError> {
        let entry = self.entry(row)?;
        if let Some(existing) = &entry.children {
            return Ok(existing.clone());
        }
        let node = entry.node.clone();
        let kids: Vec<Rc<NodeAdapter>> = node.children(provider).to_vec();

        let mut ids = Vec::with_capacity(kids.len());
        for (ordinal, child) in kids.into_iter().enumerate() {
            ids.push(self.allocate(Entry {
                node: child,
                parent: Parent::Row(row),
                ordinal,
                children: None,
            }));
        }
        self.entry_mut(row)?.children = Some(ids.clone());
        Ok(ids)
    }

    /// 折叠：释放所有后代行，行本身保持存活
    pub fn collapse(&mut self, row: RowId) -> Result<(), AppError> {
        let Some(children) = self.entry_mut(row)?.children.take() else {
            return Ok(());
        };
        let mut stack = children;
        while let Some(id) = stack.pop() {
            if let Some(entry) = self.entries.get_mut(id.slot()).and_then(Option::take) {
                if let Some(grand) = entry.children {
                    stack.extend(grand);
                }
                self.free.push(id.get());
            }
        }
        Ok(())
    }

    /// 从该行向上直到根的祖先链（不含自身，近者在前）
    pub fn ancestors(&self, row: RowId) -> Result<Vec<RowId>, AppError> {
        let mut out = Vec::new();
        let mut cur = self.parent_of(row)?;
        while let Parent::Row(p) = cur {
            out.push(p);
            cur = self.parent_of(p)?;
        }
        Ok(out)
    }

    pub fn live_rows(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }
}
