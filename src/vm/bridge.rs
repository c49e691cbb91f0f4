//! VM桥接层：把终端输入解析为命令，并把 Session 的行信息整理为可显示文本
//!
//! 具体的命令执行在 main.rs 中，这里只提供常量、命令解析和行格式化

use std::path::PathBuf;
use std::str::FromStr;

use crate::model::data_core::{AppError, Session};
use crate::model::tree_index::RowId;

// === 常量定义（消除魔法值） ===
pub const STATUS_READY: &str = "就绪";
pub const STATUS_LOADING: &str = "正在加载文件...";
pub const STATUS_LOADED: &str = "文件加载完成";
pub const STATUS_COPIED: &str = "已复制到剪贴板";
pub const STATUS_EXPORTED: &str = "导出成功";
pub const STATUS_RELOADED: &str = "重新加载完成";
pub const STATUS_NOT_FOUND: &str = "未找到匹配项";
pub const STATUS_NO_TIMELINE: &str = "没有有效的时间线";
pub const STATUS_ERROR_PREFIX: &str = "错误: ";

/// 全部展开的默认深度
pub const DEFAULT_EXPAND_DEPTH: usize = 10;

pub const HELP_TEXT: &str = "\
命令:
  roots                     列出根行
  ls <row>                  展开并列出子行
  expand <row>              展开行
  collapse <row>            折叠行
  props <row>               显示属性面板
  parent <row>              显示父行
  find <term>               查找（从头开始）
  next | prev               下一个/上一个匹配
  export <row|all> [file]   导出为 JSON（无文件时输出到终端）
  copy <row>                复制属性面板到剪贴板
  timeline <row|best>       合成 Mob 的剪辑时间线（best: 事件最多的合成）
  expandall <row> [depth]   全部展开
  collapseall               全部折叠
  goto <row>                回指节点跳转到目标 Mob
  reload                    重新加载文件
  help                      显示帮助
  quit                      退出";

/// 时间线来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineTarget {
    Best,
    Row(RowId),
}

/// 导出目标
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportTarget {
    All,
    Row(RowId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Roots,
    List(RowId),
    Expand(RowId),
    Collapse(RowId),
    Props(RowId),
    Parent(RowId),
    Find(String),
    Next,
    Prev,
    Export { target: ExportTarget, file: Option<PathBuf> },
    Copy(RowId),
    Timeline(TimelineTarget),
    ExpandAll { row: RowId, depth: usize },
    CollapseAll,
    Goto(RowId),
    Reload,
    Help,
    Quit,
}

fn parse_row(arg: Option<&str>) -> Result<RowId, AppError> {
    let raw = arg.ok_or_else(|| AppError::InvalidArgument("缺少行号".into()))?;
    raw.parse::<u32>()
        .map(RowId::new)
        .map_err(|_| AppError::InvalidArgument(format!("无效的行号: {}", raw)))
}

impl FromStr for Command {
    type Err = AppError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (name, rest) = match line.split_once(char::is_whitespace) {
            Some((n, r)) => (n, r.trim()),
            None => (line, ""),
        };
        let mut args = rest.split_whitespace();

        let cmd = match name.to_ascii_lowercase().as_str() {
            "roots" => Command::Roots,
            "ls" => Command::List(parse_row(args.next())?),
            "expand" => Command::Expand(parse_row(args.next())?),
            "collapse" => Command::Collapse(parse_row(args.next())?),
            "props" => Command::Props(parse_row(args.next())?),
            "parent" => Command::Parent(parse_row(args.next())?),
            // 查找词保留内部空格
            "find" if !rest.is_empty() => Command::Find(rest.to_string()),
            "find" => return Err(AppError::InvalidArgument("缺少查找词".into())),
            "next" => Command::Next,
            "prev" => Command::Prev,
            "export" => {
                let target = match args.next() {
                    Some("all") | None => ExportTarget::All,
                    Some(raw) => ExportTarget::Row(parse_row(Some(raw))?),
                };
                Command::Export { target, file: args.next().map(PathBuf::from) }
            }
            "copy" => Command::Copy(parse_row(args.next())?),
            "timeline" => match args.next() {
                Some("best") => Command::Timeline(TimelineTarget::Best),
                raw => Command::Timeline(TimelineTarget::Row(parse_row(raw)?)),
            },
            "expandall" => {
                let row = parse_row(args.next())?;
                let depth = match args.next() {
                    Some(raw) => raw
                        .parse()
                        .map_err(|_| AppError::InvalidArgument(format!("无效的深度: {}", raw)))?,
                    None => DEFAULT_EXPAND_DEPTH,
                };
                Command::ExpandAll { row, depth }
            }
            "collapseall" => Command::CollapseAll,
            "goto" => Command::Goto(parse_row(args.next())?),
            "reload" => Command::Reload,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => return Err(AppError::InvalidArgument(format!("未知命令: {}", other))),
        };
        Ok(cmd)
    }
}

/// 一行的显示文本：行号、展开标记、标签与子节点数
pub fn format_row(session: &Session, row: RowId) -> Result<String, AppError> {
    let count = session.child_count(row)?;
    let marker = if count == 0 {
        " "
    } else if session.is_expanded(row)? {
        "-"
    } else {
        "+"
    };
    let node = session.resolve(row)?;
    Ok(format!(
        "[{}] {} {} ({}, {})",
        row,
        marker,
        session.label(row)?,
        node.class_name(session.provider()),
        count
    ))
}

pub fn format_rows(session: &Session, rows: &[RowId]) -> Result<String, AppError> {
    let lines = rows
        .iter()
        .map(|r| format_row(session, *r))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(lines.join("\n"))
}

/// 属性面板：名称列左对齐
pub fn format_properties(props: &[(String, String)]) -> String {
    let width = props.iter().map(|(k, _)| k.chars().count()).max().unwrap_or(0);
    props
        .iter()
        .map(|(k, v)| format!("{:width$}  {}", k, v, width = width))
        .collect::<Vec<_>>()
        .join("\n")
}
