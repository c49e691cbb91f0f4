//! 标签与属性值的展示格式化

use crate::model::graph::{GraphProvider, MobId, PropertyValue};

/// 超过该长度的值会被截断
pub const MAX_VALUE_CHARS: usize = 100;
pub const TRUNCATED_SUFFIX: &str = "... (truncated)";
const SHORT_ID_CHARS: usize = 8;
const BYTES_PREVIEW: usize = 16;

/// 标识的短形式：取末尾 8 个字符
pub fn short_identity(id: &MobId) -> String {
    let chars: Vec<char> = id.as_str().chars().collect();
    if chars.len() <= SHORT_ID_CHARS {
        return id.as_str().to_string();
    }
    chars[chars.len() - SHORT_ID_CHARS..].iter().collect()
}

pub fn truncate(s: &str) -> String {
    if s.chars().count() > MAX_VALUE_CHARS {
        let head: String = s.chars().take(MAX_VALUE_CHARS).collect();
        format!("{}{}", head, TRUNCATED_SUFFIX)
    } else {
        s.to_string()
    }
}

fn hex_preview(bytes: &[u8]) -> String {
    let mut out: String = bytes
        .iter()
        .take(BYTES_PREVIEW)
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ");
    if bytes.len() > BYTES_PREVIEW {
        out.push_str(&format!(" ... ({} bytes)", bytes.len()));
    }
    out
}

/// 格式化单个属性值（供属性面板与搜索使用）
pub fn format_value(provider: &dyn GraphProvider, value: &PropertyValue) -> String {
    let raw = match value {
        PropertyValue::Null => "null".to_string(),
        PropertyValue::Bool(b) => b.to_string(),
        PropertyValue::Int(v) => v.to_string(),
        PropertyValue::Float(v) => v.to_string(),
        PropertyValue::Text(s) => s.clone(),
        PropertyValue::Bytes(b) => hex_preview(b),
        PropertyValue::Ref(key) => {
            format!("-> {}", provider.class_name(*key).unwrap_or("UnknownObject"))
        }
        PropertyValue::Mob(id) => id.to_string(),
        PropertyValue::List(items) => format!("[{} items]", items.len()),
    };
    truncate(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::graph::{GraphBuilder, GraphObject, ObjectKey, TypeTag};

    #[test]
    fn test_short_identity() {
        assert_eq!(short_identity(&MobId::new("abc")), "abc");
        assert_eq!(short_identity(&MobId::new("urn:smpte:umid:060a2b34.0101")), "34.0101");
        assert_eq!(short_identity(&MobId::new("0123456789")), "23456789");
    }

    #[test]
    fn test_format_values() {
        let mut b = GraphBuilder::new();
        b.add(GraphObject::new("Sequence", TypeTag::Segment));
        let graph = b.build().unwrap();

        assert_eq!(format_value(&graph, &PropertyValue::Int(42)), "42");
        assert_eq!(format_value(&graph, &PropertyValue::Bool(true)), "true");
        assert_eq!(format_value(&graph, &PropertyValue::Null), "null");
        assert_eq!(format_value(&graph, &PropertyValue::Ref(ObjectKey(0))), "-> Sequence");
        assert_eq!(format_value(&graph, &PropertyValue::Ref(ObjectKey(9))), "-> UnknownObject");
        assert_eq!(
            format_value(&graph, &PropertyValue::List(vec![PropertyValue::Null; 3])),
            "[3 items]"
        );
        assert_eq!(format_value(&graph, &PropertyValue::Bytes(vec![0xde, 0xad])), "de ad");
    }

    #[test]
    fn test_long_text_is_truncated() {
        let graph = GraphBuilder::new().build().unwrap();
        let long = "x".repeat(150);
        let shown = format_value(&graph, &PropertyValue::Text(long));
        assert!(shown.ends_with(TRUNCATED_SUFFIX));
        assert_eq!(shown.chars().count(), MAX_VALUE_CHARS + TRUNCATED_SUFFIX.len());
    }
}
