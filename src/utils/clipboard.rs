//! Clipboard  cross-platform clipboard helpers

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClipboardError {
    #[error("clipboard error: {0}")]
    Clip(String),
}

/// 将文本复制到系统剪贴板
pub fn copy_to_clipboard(text: &str) -> Result<(), ClipboardError> {
    use copypasta::{ClipboardContext, ClipboardProvider};
    let mut ctx = ClipboardContext::new().map_err(|e| ClipboardError::Clip(e.to_string()))?;
    ctx.set_contents(text.to_string())
        .map_err(|e| ClipboardError::Clip(e.to_string()))
}

/// 把属性面板整理为可复制的制表符分隔文本
pub fn properties_to_text(props: &[(String, String)]) -> String {
    props
        .iter()
        .map(|(k, v)| format!("{}\t{}", k, v))
        .collect::<Vec<_>>()
        .join("\n")
}
