//! AAF 容器检查工具库
//!
//! 把解码后的对象图包装为懒加载的树：子节点在首次访问时解析并缓存，
//! Mob 之间的循环引用显示为回指叶子。提供视图过滤、树索引、查找、
//! JSON 导出和剪辑时间线提取

pub mod model;
pub mod utils;
pub mod vm;

// 重新导出主要类型
pub use model::adapter::{NodeAdapter, NodeKind};
pub use model::data_core::{AppError, Session, SessionConfig};
pub use model::graph::{GraphProvider, ObjectGraph};
pub use model::tree_index::{Parent, RowId, TreeIndex};
pub use model::view_filter::{select_roots, ViewMode};
