use serde::{Deserialize, Serialize};

/// A normalized search hit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatentRecord {
    pub company_name: String,
    pub patent_name: String,
    pub patent_type: String,
    pub patent_number: String,
    pub application_date: String,
    pub grant_date: String,
    pub inventors: String,
    pub legal_status: String,
    pub next_fee_due: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    pub records: Vec<PatentRecord>,
    pub total_count: u64,
}
