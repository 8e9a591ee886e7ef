pub mod locate;
pub mod reader;
pub mod record;

pub use locate::{CensusDirectory, CensusFile, CensusLocator};
pub use reader::{open_census, CensusLines};
pub use record::{CensusRecord, DecodeError, EntryKind};
