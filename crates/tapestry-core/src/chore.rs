use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tapestry_types::{ChoreId, FamilyId, UserId};

use crate::error::CoreError;

/// Points a chore is worth. Always within `MIN..=MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct PointValue(u8);

impl PointValue {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;

    pub fn new(raw: i64) -> Result<Self, CoreError> {
        if raw < i64::from(Self::MIN) || raw > i64::from(Self::MAX) {
            return Err(CoreError::InvalidPointValue(raw));
        }
        Ok(Self(raw as u8))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn points(self) -> i64 {
        i64::from(self.0)
    }
}

impl TryFrom<i64> for PointValue {
    type Error = CoreError;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl From<PointValue> for i64 {
    fn from(value: PointValue) -> Self {
        value.points()
    }
}

/// A family member as seen by the authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Member {
    pub id: UserId,
    pub family_id: Option<FamilyId>,
}

/// The completion-relevant part of a chore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chore {
    pub id: ChoreId,
    pub family_id: FamilyId,
    pub point_value: PointValue,
    pub is_group_chore: bool,
    /// Legacy single assignee. Only consulted when `assignee_ids` is empty.
    pub assigned_to: Option<UserId>,
    pub assignee_ids: BTreeSet<UserId>,
    /// Shared state for group chores; derived for individual chores.
    pub completed: bool,
    /// Users who finished their share of an individual chore.
    pub completed_by_ids: BTreeSet<UserId>,
}

impl Chore {
    /// Effective assignees: the multi-assignee set, else the legacy single
    /// assignee, else nobody.
    pub fn assignees(&self) -> BTreeSet<UserId> {
        if !self.assignee_ids.is_empty() {
            return self.assignee_ids.clone();
        }
        self.assigned_to.into_iter().collect()
    }

    /// Derived completion of an individual chore. An unassigned chore counts
    /// as done once anyone has completed it.
    pub fn individual_completion(&self) -> bool {
        let assignees = self.assignees();
        if assignees.is_empty() {
            !self.completed_by_ids.is_empty()
        } else {
            assignees.is_subset(&self.completed_by_ids)
        }
    }

    /// Whether any completion state is recorded, shared or per-user.
    pub fn has_progress(&self) -> bool {
        self.completed || !self.completed_by_ids.is_empty()
    }
}
