use chrono::{DateTime, Utc};
use tapestry_types::models::AwardKind;
use tapestry_types::{ChoreId, UserId};

use crate::chore::{Chore, Member};
use crate::error::CoreError;

/// A ledger entry about to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAward {
    pub user_id: UserId,
    pub chore_id: Option<ChoreId>,
    pub points: i64,
    pub kind: AwardKind,
    pub awarded_at: DateTime<Utc>,
}

/// Which of a chore's ledger entries a bulk retraction removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwardScope {
    /// Every entry linked to the chore, manual awards included.
    All,
    /// Only entries created by completion toggles.
    CompletionOnly,
}

/// Storage operations the completion state machine needs, all executed inside
/// the transaction that produced this handle.
pub trait ChoreLedger {
    fn load_chore(&mut self, id: ChoreId) -> anyhow::Result<Option<Chore>>;

    fn load_member(&mut self, id: UserId) -> anyhow::Result<Option<Member>>;

    /// True if any ledger entry links `user` to `chore`.
    fn has_award(&mut self, chore: ChoreId, user: UserId) -> anyhow::Result<bool>;

    fn insert_award(&mut self, award: &NewAward) -> anyhow::Result<()>;

    /// Returns the number of entries removed.
    fn delete_chore_awards(&mut self, chore: ChoreId, scope: AwardScope) -> anyhow::Result<usize>;

    /// Returns the number of entries removed.
    fn delete_user_award(&mut self, chore: ChoreId, user: UserId) -> anyhow::Result<usize>;

    /// Writes `completed` and `completed_by_ids` back.
    fn save_completion(&mut self, chore: &Chore) -> anyhow::Result<()>;
}

/// A store able to run a closure against a [`ChoreLedger`] atomically: either
/// everything the closure wrote becomes visible, or nothing does.
pub trait Transactional {
    fn atomically<T, F>(&self, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(&mut dyn ChoreLedger) -> Result<T, CoreError>;
}
