//! Maps the search API's loosely shaped payload onto [`PatentRecord`].

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};

use crate::domain::{PatentRecord, SearchPage};

const CONTAINER_KEYS: [&str; 5] = ["data", "result", "rows", "list", "items"];
const TOTAL_KEYS: [&str; 4] = ["total", "totalCount", "total_count", "count"];
const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%Y%m%d"];

pub fn normalize_payload(payload: &Value) -> SearchPage {
    let items = payload_items(payload);
    let records: Vec<PatentRecord> = items.iter().filter_map(normalize_item).collect();
    let total_count = total_count(payload).unwrap_or(records.len() as u64);
    SearchPage {
        records,
        total_count,
    }
}

fn payload_items(payload: &Value) -> &[Value] {
    if let Some(Value::Array(docs)) = payload.get("documents") {
        return docs;
    }
    for key in CONTAINER_KEYS {
        match payload.get(key) {
            Some(Value::Array(items)) => return items,
            Some(Value::Object(inner)) => {
                if let Some(Value::Array(items)) = inner.get("list") {
                    return items;
                }
            }
            _ => {}
        }
    }
    &[]
}

fn total_count(payload: &Value) -> Option<u64> {
    let scopes = [Some(payload), payload.get("data")];
    scopes.into_iter().flatten().find_map(|scope| {
        TOTAL_KEYS.iter().find_map(|key| match scope.get(*key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
    })
}

pub fn normalize_item(item: &Value) -> Option<PatentRecord> {
    let outer = item.as_object()?;
    let src = match outer.get("field_values") {
        Some(Value::Object(inner)) => inner,
        _ => outer,
    };

    Some(PatentRecord {
        company_name: text_field(src, &["pa", "applicant_name", "申请人"]),
        patent_name: text_field(src, &["ti", "title", "专利名称"]),
        patent_type: map_type(first_present(src, &["type", "patent_type", "类型"])),
        patent_number: text_field(src, &["an", "application_number", "专利号"]),
        application_date: date_field(src, &["ad", "application_date", "申请日"]),
        grant_date: date_field(src, &["pd", "grant_date", "授权公告日"]),
        inventors: text_field(src, &["in", "inventor", "发明人"]),
        legal_status: text_field(src, &["lsn1", "legal_status", "当前法律状态"]),
        next_fee_due: date_field(src, &["annu_due", "年费截止日期"]),
    })
}

fn first_present<'a>(src: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| src.get(*key))
        .find(|value| is_truthy(value))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Bool(b) => *b,
        _ => true,
    }
}

fn text_field(src: &Map<String, Value>, keys: &[&str]) -> String {
    first_present(src, keys).map(value_text).unwrap_or_default()
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .filter(|v| is_truthy(v))
            .map(value_text)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn date_field(src: &Map<String, Value>, keys: &[&str]) -> String {
    let raw = text_field(src, keys);
    canonical_date(&raw).unwrap_or(raw)
}

/// Normalizes the date spellings seen in the wild to `YYYY-MM-DD`.
pub fn canonical_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
        .map(|date| date.format("%Y-%m-%d").to_string())
}

fn type_label(code: &str) -> Option<&'static str> {
    match code.to_ascii_lowercase().as_str() {
        "cn_in" => Some("发明"),
        "cn_um" => Some("实用新型"),
        "cn_dm" => Some("外观设计"),
        _ => None,
    }
}

fn map_type(value: Option<&Value>) -> String {
    match value {
        Some(Value::Array(codes)) => {
            let texts: Vec<String> = codes.iter().map(value_text).collect();
            texts
                .iter()
                .find_map(|code| type_label(code))
                .map(str::to_string)
                .unwrap_or_else(|| texts.join(","))
        }
        Some(Value::String(code)) => type_label(code)
            .map(str::to_string)
            .unwrap_or_else(|| code.clone()),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn flat_items_under_nested_list_container() {
        let payload = json!({
            "data": {"list": [{"title": "外观", "patent_type": "CN_DM", "application_number": "CN1"}]}
        });
        let page = normalize_payload(&payload);
        assert_eq!(page.total_count, 1);
        assert_eq!(page.records[0].patent_type, "外观设计");
        assert_eq!(page.records[0].patent_number, "CN1");
    }

    #[test]
    fn unknown_types_are_joined_and_bad_dates_kept() {
        let item = json!({"type": ["x1", "x2"], "pd": "soon", "ad": "2024.03.09"});
        let record = normalize_item(&item).unwrap();
        assert_eq!(record.patent_type, "x1,x2");
        assert_eq!(record.grant_date, "soon");
        assert_eq!(record.application_date, "2024-03-09");
    }

    #[test]
    fn canonical_date_accepts_timestamps() {
        assert_eq!(
            canonical_date("2025-06-30 08:00:00").as_deref(),
            Some("2025-06-30")
        );
        assert_eq!(canonical_date("  "), None);
    }

    #[test]
    fn empty_payload_yields_empty_page() {
        let page = normalize_payload(&json!({"code": "200"}));
        assert!(page.records.is_empty());
        assert_eq!(page.total_count, 0);
    }
}
