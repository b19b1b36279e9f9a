use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One payable fee item as read off the fee-query portal.
///
/// Extraction fills `fee_type`, `due_date` and `amount`; the patent fields are attached by the
/// lookup that produced the record. Legacy watch-list files used the portal's Chinese column
/// names, which are accepted as aliases.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeRecord {
    #[serde(alias = "费用种类")]
    pub fee_type: String,
    /// Canonical `YYYY-MM-DD`, or empty when the portal did not show one.
    #[serde(default, alias = "缴费期限届满日")]
    pub due_date: String,
    #[serde(default, alias = "金额")]
    pub amount: String,
    #[serde(default, alias = "专利号")]
    pub patent_number: String,
    #[serde(default, alias = "专利名称")]
    pub patent_name: String,
    #[serde(default, alias = "公司名称")]
    pub company_name: String,
    #[serde(
        default,
        alias = "当前法律状态",
        skip_serializing_if = "Option::is_none"
    )]
    pub legal_status: Option<String>,
}

impl FeeRecord {
    pub fn new(
        fee_type: impl Into<String>,
        due_date: impl Into<String>,
        amount: impl Into<String>,
    ) -> Self {
        Self {
            fee_type: fee_type.into(),
            due_date: due_date.into(),
            amount: amount.into(),
            ..Self::default()
        }
    }

    /// Identity within one extraction pass.
    pub fn extraction_key(&self) -> (&str, &str, &str) {
        (&self.fee_type, &self.due_date, &self.amount)
    }

    /// Identity within the watch-list. A fee type recurring under a refreshed due date is
    /// still the same watched item.
    pub fn monitor_key(&self) -> (&str, &str) {
        (&self.patent_number, &self.fee_type)
    }

    pub fn due(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(self.due_date.trim(), "%Y-%m-%d").ok()
    }
}

/// Patent metadata carried onto fee records produced by a lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatentContext {
    pub patent_number: String,
    pub patent_name: String,
    pub company_name: String,
    pub legal_status: Option<String>,
}

impl PatentContext {
    pub fn from_number(number: impl Into<String>) -> Self {
        Self {
            patent_number: number.into(),
            ..Self::default()
        }
    }

    pub fn apply(&self, record: &mut FeeRecord) {
        record.patent_number = self.patent_number.clone();
        record.patent_name = self.patent_name.clone();
        record.company_name = self.company_name.clone();
        if record.legal_status.is_none() {
            record.legal_status = self.legal_status.clone();
        }
    }
}
