use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

/// Legal-status wording for a patent whose rights have terminated.
const NO_RIGHTS_MARKER: &str = "无权";
/// Legal-status wording for a patent that has already lapsed.
const LAPSED_MARKER: &str = "已失效";

/// Urgency tiers, declared in rank order: the derived `Ord` is the display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UrgencyTier {
    Invalid,
    Overdue,
    Critical,
    Urgent,
    Warning,
    Caution,
    Normal,
    Unknown,
}

impl UrgencyTier {
    pub const ALL: [UrgencyTier; 8] = [
        UrgencyTier::Invalid,
        UrgencyTier::Overdue,
        UrgencyTier::Critical,
        UrgencyTier::Urgent,
        UrgencyTier::Warning,
        UrgencyTier::Caution,
        UrgencyTier::Normal,
        UrgencyTier::Unknown,
    ];

    pub fn rank(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            UrgencyTier::Invalid => "已失效",
            UrgencyTier::Overdue => "已逾期",
            UrgencyTier::Critical => "紧急",
            UrgencyTier::Urgent => "急迫",
            UrgencyTier::Warning => "注意",
            UrgencyTier::Caution => "提醒",
            UrgencyTier::Normal => "正常",
            UrgencyTier::Unknown => "未知",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UrgencyTier::Invalid => "invalid",
            UrgencyTier::Overdue => "overdue",
            UrgencyTier::Critical => "critical",
            UrgencyTier::Urgent => "urgent",
            UrgencyTier::Warning => "warning",
            UrgencyTier::Caution => "caution",
            UrgencyTier::Normal => "normal",
            UrgencyTier::Unknown => "unknown",
        }
    }
}

impl fmt::Display for UrgencyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Urgency {
    pub tier: UrgencyTier,
    /// Calendar days until the due date; absent for status-driven or undated tiers.
    pub days_left: Option<i64>,
}

/// First matching rule wins: terminal status, lapsed status, missing date, then the countdown.
pub fn classify(due: Option<NaiveDate>, legal_status: Option<&str>, today: NaiveDate) -> Urgency {
    let status = legal_status.unwrap_or_default();
    if status.contains(NO_RIGHTS_MARKER) {
        return Urgency {
            tier: UrgencyTier::Invalid,
            days_left: None,
        };
    }
    if status.contains(LAPSED_MARKER) {
        return Urgency {
            tier: UrgencyTier::Overdue,
            days_left: None,
        };
    }
    let Some(due) = due else {
        return Urgency {
            tier: UrgencyTier::Unknown,
            days_left: None,
        };
    };

    let days_left = (due - today).num_days();
    let tier = match days_left {
        d if d < 0 => UrgencyTier::Overdue,
        d if d <= 1 => UrgencyTier::Critical,
        d if d <= 7 => UrgencyTier::Urgent,
        d if d <= 30 => UrgencyTier::Warning,
        d if d <= 90 => UrgencyTier::Caution,
        _ => UrgencyTier::Normal,
    };
    Urgency {
        tier,
        days_left: Some(days_left),
    }
}
