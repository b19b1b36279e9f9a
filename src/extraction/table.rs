use crate::{browser::TableMatrix, domain::FeeRecord, search::normalize::canonical_date};

const HEADER_SCAN_ROWS: usize = 3;
const AMOUNT_KEYS: &[&str] = &["金额"];
const DATE_KEYS: &[&str] = &["缴费期限", "届满"];
const TYPE_KEYS: &[&str] = &["费用", "种类"];
const FEE_MARKERS: &[&str] = &["年费", "滞纳金"];

struct Columns {
    fee_type: usize,
    due_date: Option<usize>,
    amount: usize,
}

impl Columns {
    fn from_header(header: &[String]) -> Option<Self> {
        Some(Self {
            fee_type: find_column(header, TYPE_KEYS)?,
            due_date: find_column(header, DATE_KEYS),
            amount: find_column(header, AMOUNT_KEYS)?,
        })
    }

    fn widest(&self) -> usize {
        self.fee_type.max(self.due_date.unwrap_or(0)).max(self.amount)
    }
}

fn find_column(header: &[String], keys: &[&str]) -> Option<usize> {
    header
        .iter()
        .position(|cell| keys.iter().any(|key| cell.contains(key)))
}

fn is_header(row: &[String]) -> bool {
    let joined = row.join(" ");
    AMOUNT_KEYS.iter().any(|key| joined.contains(key))
        && DATE_KEYS.iter().any(|key| joined.contains(key))
}

/// Records from one table, or nothing when no header row shows up in the first rows.
pub fn records_from_table(rows: &[Vec<String>]) -> Vec<FeeRecord> {
    let Some(header_index) = rows.iter().take(HEADER_SCAN_ROWS).position(|row| is_header(row))
    else {
        return Vec::new();
    };
    let Some(columns) = Columns::from_header(&rows[header_index]) else {
        return Vec::new();
    };

    rows[header_index + 1..]
        .iter()
        .filter(|row| row.len() > columns.widest())
        .filter_map(|row| {
            let fee_type = row[columns.fee_type].trim();
            if !FEE_MARKERS.iter().any(|marker| fee_type.contains(marker)) {
                return None;
            }
            let raw_date = columns
                .due_date
                .map(|col| row[col].trim())
                .unwrap_or_default();
            let due_date = canonical_date(raw_date).unwrap_or_else(|| raw_date.to_string());
            Some(FeeRecord::new(fee_type, due_date, row[columns.amount].trim()))
        })
        .collect()
}

pub fn records_from_tables(tables: &[TableMatrix]) -> Vec<FeeRecord> {
    tables
        .iter()
        .flat_map(|rows| records_from_table(rows))
        .collect()
}
