pub mod filetype;
pub mod key;
pub mod merge;
pub mod usage;

pub use filetype::{FiletypeClassifier, FiletypeRule};
pub use key::{AggregateKey, ReportKind};
pub use merge::{AggregateMap, AggregateSet};
pub use usage::UsageAggregate;
