//! IO helper: container dump loading and JSON file read/write

use std::{fs::File, io::BufReader, path::{Path, PathBuf}};

use serde_json::Value;
use crate::model::data_core::AppError;
use crate::model::graph::ObjectGraph;

pub const CONTAINER_EXTENSION: &str = "json";

/// 读取容器转储并解码为对象图（只读，解码失败原样上报）
pub fn read_container_file(p: &Path) -> Result<ObjectGraph, AppError> {
    let bytes = std::fs::read(p)?;
    Ok(ObjectGraph::decode(&bytes)?)
}

/// 批量转换的输入：单个文件原样返回，目录下取全部 `.json` 文件（按文件名排序，不递归）
pub fn collect_container_files(p: &Path) -> Result<Vec<PathBuf>, AppError> {
    if !p.is_dir() {
        return Ok(vec![p.to_path_buf()]);
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(p)? {
        let path = entry?.path();
        let is_json = path
            .extension()
            .map_or(false, |e| e.eq_ignore_ascii_case(CONTAINER_EXTENSION));
        if path.is_file() && is_json {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// 从文件读取JSON数据
pub fn read_json_file(p: &Path) -> Result<Value, AppError> {
    let f = File::open(p)?;
    let rdr = BufReader::new(f);
    let v: Value = serde_json::from_reader(rdr)?;
    Ok(v)
}

/// 将JSON数据保存到文件（格式化输出）
pub fn write_json_file(p: &Path, value: &Value) -> Result<(), AppError> {
    let f = File::create(p)?;
    serde_json::to_writer_pretty(f, value)?;
    Ok(())
}
