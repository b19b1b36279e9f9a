use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::FeeRecord;

/// `<fee phrase ending in 年费 or 年费滞纳金> <YYYY-MM-DD> <amount>`, whitespace separated.
static FEE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?P<type>[\x{4e00}-\x{9fa5}A-Za-z0-9（）()第\-·]+?(?:年费(?:滞纳金)?))\s+(?P<date>\d{4}-\d{2}-\d{2})\s+(?P<amt>\d+(?:\.\d{1,2})?)",
    )
    .expect("valid fee line regex")
});

pub fn normalize_spaces(text: &str) -> String {
    text.replace(['\u{a0}', '\u{3000}'], " ")
}

/// Scans free page text for fee triples, in order of appearance.
pub fn records_from_text(text: &str) -> Vec<FeeRecord> {
    let text = normalize_spaces(text);
    FEE_LINE
        .captures_iter(&text)
        .map(|caps| FeeRecord::new(caps["type"].trim(), &caps["date"], &caps["amt"]))
        .collect()
}
