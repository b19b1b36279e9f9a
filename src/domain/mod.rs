pub mod fee;
pub mod patent;

pub use fee::{FeeRecord, PatentContext};
pub use patent::{PatentRecord, SearchPage};
