//! 程序入口：解析命令行、初始化日志、打开检查会话，并在终端上运行命令循环

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use tracing_subscriber::fmt::SubscriberBuilder;

use aaf_inspector_r::model::export::batch_export;
use aaf_inspector_r::model::graph::GroupKind;
use aaf_inspector_r::model::search::SearchLimits;
use aaf_inspector_r::model::view_filter::parse_group;
use aaf_inspector_r::utils::clipboard::{copy_to_clipboard, properties_to_text};
use aaf_inspector_r::utils::fs::collect_container_files;
use aaf_inspector_r::vm::bridge::*;
use aaf_inspector_r::{AppError, Parent, RowId, Session, SessionConfig, ViewMode};

fn print_usage(program: &str) {
    eprintln!(
        "用法:\n  {program} <file> [--mode <m>]... [--group <g>]... [--search-limit <n>]\n  {program} --config <config.json> [--mode <m>]... [--group <g>]... [--search-limit <n>]\n  {program} --batch <file|dir> --out <dir>\n\n\
         --mode: toplevel | compmobs | mastermobs | sourcemobs（默认 toplevel）\n\
         --group: mobs | dictionary | metadict | essence | root\n\
         --search-limit: 查找时最多遍历的节点数\n\
         --batch: 把单个容器或目录下的全部容器转换为 JSON，写入 --out 目录\n\
         命令行指定的 mode/group 覆盖配置文件中的值。"
    );
}

#[derive(Debug, Default, Clone, PartialEq)]
struct CliOptions {
    path: Option<PathBuf>,
    config: Option<PathBuf>,
    modes: Vec<ViewMode>,
    groups: Vec<GroupKind>,
    search_limit: Option<usize>,
    batch: Option<PathBuf>,
    out: Option<PathBuf>,
}

fn parse_options(mut args: impl Iterator<Item = String>) -> Result<CliOptions, ()> {
    let mut options = CliOptions::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--mode" => {
                let raw = args.next().ok_or(())?;
                let mode: ViewMode = raw.parse().map_err(|_| ())?;
                if !options.modes.contains(&mode) {
                    options.modes.push(mode);
                }
            }
            "--group" => {
                let raw = args.next().ok_or(())?;
                options.groups.push(parse_group(&raw).map_err(|_| ())?);
            }
            "--config" => {
                if options.config.is_some() {
                    return Err(());
                }
                options.config = Some(PathBuf::from(args.next().ok_or(())?));
            }
            "--search-limit" => {
                if options.search_limit.is_some() {
                    return Err(());
                }
                let raw = args.next().ok_or(())?;
                let limit: usize = raw.parse().map_err(|_| ())?;
                if limit == 0 {
                    return Err(());
                }
                options.search_limit = Some(limit);
            }
            "--batch" => {
                if options.batch.is_some() {
                    return Err(());
                }
                options.batch = Some(PathBuf::from(args.next().ok_or(())?));
            }
            "--out" => {
                if options.out.is_some() {
                    return Err(());
                }
                options.out = Some(PathBuf::from(args.next().ok_or(())?));
            }
            _ if arg.starts_with('-') => return Err(()),
            _ => {
                if options.path.is_some() {
                    return Err(());
                }
                options.path = Some(PathBuf::from(arg));
            }
        }
    }

    // 批量模式不打开交互会话，二者的选项不能混用
    if options.batch.is_some() {
        let interactive = options.path.is_some()
            || options.config.is_some()
            || !options.modes.is_empty()
            || !options.groups.is_empty()
            || options.search_limit.is_some();
        if interactive || options.out.is_none() {
            return Err(());
        }
        return Ok(options);
    }
    if options.out.is_some() {
        return Err(());
    }

    if options.path.is_none() && options.config.is_none() {
        return Err(());
    }

    Ok(options)
}

/// 合并配置文件与命令行选项
fn build_config(options: CliOptions) -> anyhow::Result<SessionConfig> {
    let mut config = match &options.config {
        Some(p) => SessionConfig::from_json_file(p)
            .with_context(|| format!("读取配置文件失败: {}", p.display()))?,
        None => SessionConfig::new(PathBuf::new()),
    };
    if let Some(path) = options.path {
        config.path = path;
    }
    if !options.modes.is_empty() {
        config.modes = options.modes;
    }
    if !options.groups.is_empty() {
        config.groups = options.groups;
    }
    Ok(config)
}

/// VM桥接器：管理终端与 Session 之间的交互
struct ViewModelBridge {
    session: Session,
    last_term: Option<String>,
}

impl ViewModelBridge {
    fn new(session: Session) -> Self {
        Self { session, last_term: None }
    }

    /// 执行一条命令，返回要显示的文本；None 表示退出
    fn dispatch(&mut self, cmd: Command) -> Result<Option<String>, AppError> {
        let out = match cmd {
            Command::Roots => format_rows(&self.session, self.session.roots())?,
            Command::List(row) => self.handle_list(row)?,
            Command::Expand(row) => {
                let kids = self.session.expand(row)?;
                format!("{} ({} 个子行)", format_row(&self.session, row)?, kids.len())
            }
            Command::Collapse(row) => {
                self.session.collapse(row)?;
                format_row(&self.session, row)?
            }
            Command::Props(row) => format_properties(&self.session.properties(row)?),
            Command::Parent(row) => match self.session.parent_of(row)? {
                Parent::Root => "<根>".to_string(),
                Parent::Row(p) => format_row(&self.session, p)?,
            },
            Command::Find(term) => {
                // 记住查找词，供 next/prev 使用
                self.last_term = Some(term.clone());
                self.handle_find(&term, true)?
            }
            Command::Next => self.handle_step(true)?,
            Command::Prev => self.handle_step(false)?,
            Command::Export { target, file } => self.handle_export(target, file)?,
            Command::Copy(row) => self.handle_copy(row)?,
            Command::Timeline(TimelineTarget::Row(row)) => {
                let events = self.session.timeline(row)?;
                serde_json::to_string_pretty(&events)?
            }
            Command::Timeline(TimelineTarget::Best) => match self.session.best_timeline() {
                Some(events) => serde_json::to_string_pretty(&events)?,
                None => STATUS_NO_TIMELINE.to_string(),
            },
            Command::ExpandAll { row, depth } => {
                let n = self.session.expand_all(row, depth)?;
                format!("已展开 {} 行", n)
            }
            Command::CollapseAll => {
                self.session.collapse_all()?;
                format_rows(&self.session, self.session.roots())?
            }
            Command::Goto(row) => {
                let target = self.session.navigate_back_reference(row)?;
                format_row(&self.session, target)?
            }
            Command::Reload => {
                let start = Instant::now();
                self.session.reload()?;
                self.last_term = None;
                tracing::info!("重新加载耗时: {:.1}ms", start.elapsed().as_secs_f64() * 1000.0);
                format!("{}\n{}", STATUS_RELOADED, format_rows(&self.session, self.session.roots())?)
            }
            Command::Help => HELP_TEXT.to_string(),
            Command::Quit => return Ok(None),
        };
        Ok(Some(out))
    }

    /// 处理列出子行操作（未展开时先展开）
    fn handle_list(&mut self, row: RowId) -> Result<String, AppError> {
        let kids = self.session.expand(row)?;
        if kids.is_empty() {
            return Ok("（无子节点）".to_string());
        }
        format_rows(&self.session, &kids)
    }

    fn handle_find(&mut self, term: &str, forward: bool) -> Result<String, AppError> {
        let hit = if forward {
            self.session.find_next(term)?
        } else {
            self.session.find_previous(term)?
        };
        match (hit, self.session.search_position()) {
            (Some(row), Some((pos, total))) => {
                Ok(format!("{}/{}  {}", pos, total, format_row(&self.session, row)?))
            }
            _ => Ok(STATUS_NOT_FOUND.to_string()),
        }
    }

    fn handle_step(&mut self, forward: bool) -> Result<String, AppError> {
        let term = self
            .last_term
            .clone()
            .ok_or_else(|| AppError::State("还没有查找词，请先使用 find".into()))?;
        self.handle_find(&term, forward)
    }

    /// 处理导出操作：指定文件时写入文件，否则直接输出
    fn handle_export(&self, target: ExportTarget, file: Option<PathBuf>) -> Result<String, AppError> {
        let row = match target {
            ExportTarget::All => None,
            ExportTarget::Row(r) => Some(r),
        };
        match file {
            Some(path) => {
                self.session.export_to_file(&path, row)?;
                Ok(format!("{}: {}", STATUS_EXPORTED, path.display()))
            }
            None => {
                let value = match row {
                    Some(r) => self.session.export_row(r)?,
                    None => self.session.export_all()?,
                };
                Ok(serde_json::to_string_pretty(&value)?)
            }
        }
    }

    /// 处理复制操作：复制属性面板文本
    fn handle_copy(&self, row: RowId) -> Result<String, AppError> {
        let text = properties_to_text(&self.session.properties(row)?);
        match copy_to_clipboard(&text) {
            Ok(()) => {
                tracing::info!("内容已复制到剪贴板，长度: {} 字符", text.len());
                Ok(STATUS_COPIED.to_string())
            }
            Err(e) => {
                // 剪贴板不可用时回退为直接输出
                tracing::warn!("复制失败: {}", e);
                Ok(text)
            }
        }
    }

    /// 命令循环：逐行读取标准输入直到 quit 或 EOF
    fn run(&mut self, input: impl BufRead, mut output: impl Write) -> io::Result<()> {
        writeln!(output, "{}", STATUS_READY)?;
        write!(output, "> ")?;
        output.flush()?;
        for line in input.lines() {
            let line = line?;
            if !line.trim().is_empty() {
                let result = line.parse::<Command>().and_then(|cmd| self.dispatch(cmd));
                match result {
                    Ok(Some(text)) => writeln!(output, "{}", text)?,
                    Ok(None) => return Ok(()),
                    Err(e) => {
                        tracing::error!("命令失败: {}", e);
                        writeln!(output, "{}{}", STATUS_ERROR_PREFIX, e)?;
                    }
                }
            }
            write!(output, "> ")?;
            output.flush()?;
        }
        Ok(())
    }
}

/// 批量转换模式：全部失败时以错误退出
fn run_batch(input: &Path, out: &Path) -> anyhow::Result<()> {
    let inputs = collect_container_files(input)
        .with_context(|| format!("读取输入失败: {}", input.display()))?;
    if inputs.is_empty() {
        anyhow::bail!("没有找到容器文件: {}", input.display());
    }
    let report = batch_export(&inputs, out)
        .with_context(|| format!("无法写入输出目录: {}", out.display()))?;
    eprintln!("批量转换完成: 成功 {}，失败 {}", report.converted.len(), report.failed.len());
    for (path, err) in &report.failed {
        eprintln!("  {}: {}", path.display(), err);
    }
    if report.converted.is_empty() {
        anyhow::bail!("所有文件都转换失败");
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    // 初始化日志输出（写到 stderr，不干扰命令输出）
    let _ = SubscriberBuilder::default()
        .with_max_level(tracing::Level::INFO)
        .with_writer(io::stderr)
        .try_init();

    let mut args = std::env::args();
    let program = args.next().unwrap_or_else(|| "aaf_inspector_r".to_owned());
    let options = match parse_options(args) {
        Ok(options) => options,
        Err(()) => {
            print_usage(&program);
            std::process::exit(2);
        }
    };

    if let (Some(input), Some(out)) = (&options.batch, &options.out) {
        return run_batch(input, out);
    }

    let search_limit = options.search_limit;
    let config = build_config(options)?;
    eprintln!("{}", STATUS_LOADING);
    let path = config.path.clone();
    let mut session = Session::open(config)
        .with_context(|| format!("打开容器失败: {}", path.display()))?;
    if let Some(max_nodes) = search_limit {
        session.set_search_limits(SearchLimits { max_nodes });
    }
    eprintln!("{}: {} 个根", STATUS_LOADED, session.roots().len());

    let mut bridge = ViewModelBridge::new(session);
    let stdin = io::stdin();
    bridge.run(stdin.lock(), io::stdout())?;
    tracing::info!("会话结束");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aaf_inspector_r::model::graph::{GraphBuilder, GraphObject, MobId, PropertyValue, TypeTag};

    fn parse(args: &[&str]) -> Result<CliOptions, ()> {
        parse_options(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn parses_path_and_modes() {
        let options = parse(&["edit.json", "--mode", "sourcemobs", "--mode", "toplevel", "--mode", "sourcemobs"]).unwrap();
        assert_eq!(options.path, Some(PathBuf::from("edit.json")));
        assert_eq!(options.modes, vec![ViewMode::SourceMobs, ViewMode::TopLevelCompositions]);
    }

    #[test]
    fn parses_groups_and_config() {
        let options = parse(&["--config", "c.json", "--group", "dictionary", "--group", "root"]).unwrap();
        assert_eq!(options.config, Some(PathBuf::from("c.json")));
        assert_eq!(options.groups, vec![GroupKind::Dictionary, GroupKind::Header]);
        assert!(options.path.is_none());
    }

    #[test]
    fn rejects_bad_args() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["a.json", "b.json"]).is_err());
        assert!(parse(&["a.json", "--mode"]).is_err());
        assert!(parse(&["a.json", "--mode", "bogus"]).is_err());
        assert!(parse(&["a.json", "--verbose"]).is_err());
        assert!(parse(&["a.json", "--search-limit", "0"]).is_err());
        assert!(parse(&["a.json", "--out", "dir"]).is_err());
    }

    #[test]
    fn parses_search_limit() {
        let options = parse(&["a.json", "--search-limit", "500"]).unwrap();
        assert_eq!(options.search_limit, Some(500));
    }

    #[test]
    fn parses_batch_mode() {
        let options = parse(&["--batch", "in", "--out", "out"]).unwrap();
        assert_eq!(options.batch, Some(PathBuf::from("in")));
        assert_eq!(options.out, Some(PathBuf::from("out")));

        assert!(parse(&["--batch", "in"]).is_err());
        assert!(parse(&["a.json", "--batch", "in", "--out", "out"]).is_err());
        assert!(parse(&["--batch", "in", "--out", "out", "--mode", "toplevel"]).is_err());
    }

    #[test]
    fn batch_converts_folder_and_skips_broken_file() {
        let input = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let mut b = GraphBuilder::new();
        b.add(GraphObject::new("CompositionMob", TypeTag::CompositionMob)
            .with_identity(MobId::new("urn:edit")));
        std::fs::write(input.path().join("edit.json"), b.build().unwrap().to_dump_json().to_string()).unwrap();
        std::fs::write(input.path().join("broken.json"), "not json").unwrap();

        run_batch(input.path(), out.path()).unwrap();
        assert!(out.path().join("edit.json").exists());
        assert!(!out.path().join("broken.json").exists());

        let empty = tempfile::tempdir().unwrap();
        assert!(run_batch(empty.path(), out.path()).is_err());
    }

    #[test]
    fn cli_overrides_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"path": "from_config.json", "modes": ["mastermobs"]}}"#).unwrap();
        let options = parse(&["--config", file.path().to_str().unwrap(), "--mode", "compmobs"]).unwrap();
        let config = build_config(options).unwrap();
        assert_eq!(config.path, PathBuf::from("from_config.json"));
        assert_eq!(config.modes, vec![ViewMode::AllCompositions]);
    }

    #[test]
    fn runs_command_loop() {
        let mut b = GraphBuilder::new();
        b.add(GraphObject::new("SourceMob", TypeTag::SourceMob)
            .with_identity(MobId::new("urn:tape"))
            .with_property("Name", PropertyValue::Text("Tape".into())));
        let graph = b.build().unwrap();
        let config = SessionConfig::new("memory.json").with_modes(vec![ViewMode::SourceMobs]);
        let mut bridge = ViewModelBridge::new(Session::from_graph(graph, config).unwrap());

        let input = "roots\nbogus\nnext\nfind tape\nquit\nroots\n";
        let mut out = Vec::new();
        bridge.run(input.as_bytes(), &mut out).unwrap();
        let out = String::from_utf8(out).unwrap();

        assert!(out.contains("[0]   Tape (SourceMob, 0)"));
        assert!(out.contains("未知命令: bogus"));
        assert!(out.contains("还没有查找词"));
        assert!(out.contains("1/1"));
        // quit 之后的命令不再执行
        assert_eq!(out.matches("Tape (SourceMob").count(), 2);
    }
}
