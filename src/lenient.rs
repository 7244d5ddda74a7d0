//! 宽松的反序列化辅助。
//!
//! 后端的可选字段可能是 null、类型不符或数字 ID。单个字段异常只退化为缺省值，
//! 不让整条记录（进而整个列表）解析失败。

use log::warn;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// 必填 ID：字符串或数字
pub fn id_as_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match Value::deserialize(d)? {
        Value::String(s) if !s.trim().is_empty() => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("invalid id: {}", other))),
    }
}

/// 可选文本：数字转字符串，null / 空串 / 其他类型为 None
pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) if !s.trim().is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// 任意可选字段：解析失败时为 None
pub fn opt<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let v = Value::deserialize(d)?;
    Ok(serde_json::from_value(v).ok())
}

/// null 视同缺省；其他值仍按目标类型严格解析
pub fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

/// 嵌套结构：null 或形状不对时取 Default
pub fn or_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let v = Value::deserialize(d)?;
    Ok(serde_json::from_value(v).unwrap_or_default())
}

/// 字符串列表。null 为空列表，逗号分隔的字符串也接受，数字元素转成字符串
pub fn string_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) if !s.trim().is_empty() => Some(s),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    })
}

/// 数值序列。非数字的点记为 NaN，保留下标位置（绘图时跳过）
pub fn number_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<f64>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Array(items) => items
            .into_iter()
            .map(|v| v.as_f64().unwrap_or(f64::NAN))
            .collect(),
        _ => Vec::new(),
    })
}

/// 记录列表：逐条解析，坏记录丢弃并记录日志
pub fn valid_items<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Value::deserialize(d)? {
        Value::Array(items) => decode_each(items),
        _ => Vec::new(),
    })
}

/// 列表接口可能直接返回数组，也可能包一层对象（`{"signals": [...]}` 之类）。
/// 形状无法识别时返回 None。
pub fn items_in<T: DeserializeOwned>(v: Value, keys: &[&str]) -> Option<Vec<T>> {
    match v {
        Value::Array(items) => Some(decode_each(items)),
        Value::Object(mut map) => keys.iter().find_map(|k| match map.remove(*k) {
            Some(Value::Array(items)) => Some(decode_each(items)),
            Some(Value::Null) => Some(Vec::new()),
            _ => None,
        }),
        Value::Null => Some(Vec::new()),
        _ => None,
    }
}

fn decode_each<T: DeserializeOwned>(items: Vec<Value>) -> Vec<T> {
    let total = items.len();
    let decoded: Vec<T> = items
        .into_iter()
        .filter_map(|v| match serde_json::from_value(v) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!("丢弃无法解析的记录: {}", e);
                None
            }
        })
        .collect();
    if decoded.len() < total {
        warn!("列表共 {} 条，解析成功 {} 条", total, decoded.len());
    }
    decoded
}
