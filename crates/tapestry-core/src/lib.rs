//! Chore completion and points ledger.
//!
//! The crate holds the business rules of the chore system and nothing else:
//! no SQL, no HTTP. Storage is injected through [`ledger::Transactional`],
//! which hands the state machine a [`ledger::ChoreLedger`] scoped to a single
//! transaction.

pub mod chore;
pub mod completion;
pub mod error;
pub mod leaderboard;
pub mod ledger;

pub use chore::{Chore, Member, PointValue};
pub use completion::{GroupUncomplete, toggle_completion};
pub use error::CoreError;
pub use ledger::{AwardScope, ChoreLedger, NewAward, Transactional};
