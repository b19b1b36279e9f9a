mod store;
mod urgency;

pub use store::{ClassifiedFee, MonitorEntry, MonitorStore, StoreError};
pub use urgency::{classify, Urgency, UrgencyTier};
