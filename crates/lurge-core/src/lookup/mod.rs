pub mod history;
pub mod identity;
pub mod quota;

pub use history::{HistoricalUsage, UsageHistory};
pub use identity::{GroupIdentity, IdentityResolver, IdentityTable};
pub use quota::{QuotaLookup, QuotaTable};
