use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use tapestry_types::models::AwardKind;
use tapestry_types::{ChoreId, UserId};
use tracing::debug;

use crate::chore::Chore;
use crate::error::CoreError;
use crate::ledger::{AwardScope, ChoreLedger, NewAward, Transactional};

/// What un-completing a group chore retracts.
///
/// `ClearAll` removes every ledger entry of the chore, whoever toggles and
/// whoever was awarded. That is asymmetric: one member un-checking a shared
/// chore takes points away from every assignee, and also drops manual awards
/// linked to the chore. `CompletionAwardsOnly` retracts only the entries the
/// completion toggle created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GroupUncomplete {
    #[default]
    ClearAll,
    CompletionAwardsOnly,
}

impl GroupUncomplete {
    fn scope(self) -> AwardScope {
        match self {
            Self::ClearAll => AwardScope::All,
            Self::CompletionAwardsOnly => AwardScope::CompletionOnly,
        }
    }
}

impl FromStr for GroupUncomplete {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clear-all" => Ok(Self::ClearAll),
            "completion-only" => Ok(Self::CompletionAwardsOnly),
            other => Err(format!(
                "unknown group un-complete policy '{other}' (expected clear-all or completion-only)"
            )),
        }
    }
}

impl fmt::Display for GroupUncomplete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ClearAll => "clear-all",
            Self::CompletionAwardsOnly => "completion-only",
        })
    }
}

/// Toggle completion of `chore_id` on behalf of `actor` and reconcile the
/// points ledger, all in one transaction.
///
/// Group chores flip their shared `completed` flag. Completing awards
/// `point_value` to every assignee (or to `actor` when nobody is assigned),
/// skipping users that already hold an entry for the chore. Un-completing
/// retracts according to `policy`.
///
/// Individual chores flip `actor`'s membership in `completed_by_ids`, award or
/// retract `actor`'s entry, and re-derive `completed`.
pub fn toggle_completion<S>(
    store: &S,
    chore_id: ChoreId,
    actor: UserId,
    policy: GroupUncomplete,
) -> Result<Chore, CoreError>
where
    S: Transactional,
{
    store.atomically(|ledger| {
        let mut chore = ledger
            .load_chore(chore_id)?
            .ok_or(CoreError::NotFound("chore"))?;
        let member = ledger
            .load_member(actor)?
            .ok_or(CoreError::NotFound("user"))?;
        if member.family_id != Some(chore.family_id) {
            return Err(CoreError::Forbidden);
        }

        let now = Utc::now();
        if chore.is_group_chore {
            toggle_group(ledger, &mut chore, actor, policy, now)?;
        } else {
            toggle_individual(ledger, &mut chore, actor, now)?;
        }

        ledger.save_completion(&chore)?;
        Ok(chore)
    })
}

fn toggle_group(
    ledger: &mut dyn ChoreLedger,
    chore: &mut Chore,
    actor: UserId,
    policy: GroupUncomplete,
    now: DateTime<Utc>,
) -> Result<(), CoreError> {
    chore.completed = !chore.completed;

    if chore.completed {
        let mut recipients = chore.assignees();
        if recipients.is_empty() {
            recipients.insert(actor);
        }
        for user in recipients {
            let awarded = award_once(ledger, chore, user, now)?;
            debug!(chore = %chore.id, user = %user, awarded, "group chore completed");
        }
    } else {
        let removed = ledger.delete_chore_awards(chore.id, policy.scope())?;
        debug!(chore = %chore.id, removed, %policy, "group chore reopened");
    }
    Ok(())
}

fn toggle_individual(
    ledger: &mut dyn ChoreLedger,
    chore: &mut Chore,
    actor: UserId,
    now: DateTime<Utc>,
) -> Result<(), CoreError> {
    if chore.completed_by_ids.remove(&actor) {
        let removed = ledger.delete_user_award(chore.id, actor)?;
        debug!(chore = %chore.id, user = %actor, removed, "individual share reopened");
    } else {
        chore.completed_by_ids.insert(actor);
        let awarded = award_once(ledger, chore, actor, now)?;
        debug!(chore = %chore.id, user = %actor, awarded, "individual share completed");
    }

    chore.completed = chore.individual_completion();
    Ok(())
}

/// Inserts a completion award unless `user` already holds an entry for the
/// chore. Returns whether an entry was written.
fn award_once(
    ledger: &mut dyn ChoreLedger,
    chore: &Chore,
    user: UserId,
    now: DateTime<Utc>,
) -> anyhow::Result<bool> {
    if ledger.has_award(chore.id, user)? {
        return Ok(false);
    }
    ledger.insert_award(&NewAward {
        user_id: user,
        chore_id: Some(chore.id),
        points: chore.point_value.points(),
        kind: AwardKind::Completion,
        awarded_at: now,
    })?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::{BTreeSet, HashMap};

    use tapestry_types::FamilyId;

    use super::*;
    use crate::chore::{Member, PointValue};

    #[derive(Clone, Default)]
    struct State {
        chores: HashMap<ChoreId, Chore>,
        members: HashMap<UserId, Member>,
        awards: Vec<NewAward>,
        fail_on_save: bool,
    }

    impl ChoreLedger for State {
        fn load_chore(&mut self, id: ChoreId) -> anyhow::Result<Option<Chore>> {
            Ok(self.chores.get(&id).cloned())
        }

        fn load_member(&mut self, id: UserId) -> anyhow::Result<Option<Member>> {
            Ok(self.members.get(&id).copied())
        }

        fn has_award(&mut self, chore: ChoreId, user: UserId) -> anyhow::Result<bool> {
            Ok(self
                .awards
                .iter()
                .any(|a| a.chore_id == Some(chore) && a.user_id == user))
        }

        fn insert_award(&mut self, award: &NewAward) -> anyhow::Result<()> {
            self.awards.push(award.clone());
            Ok(())
        }

        fn delete_chore_awards(&mut self, chore: ChoreId, scope: AwardScope) -> anyhow::Result<usize> {
            let before = self.awards.len();
            self.awards.retain(|a| {
                a.chore_id != Some(chore)
                    || (scope == AwardScope::CompletionOnly && a.kind != AwardKind::Completion)
            });
            Ok(before - self.awards.len())
        }

        fn delete_user_award(&mut self, chore: ChoreId, user: UserId) -> anyhow::Result<usize> {
            let before = self.awards.len();
            self.awards
                .retain(|a| !(a.chore_id == Some(chore) && a.user_id == user));
            Ok(before - self.awards.len())
        }

        fn save_completion(&mut self, chore: &Chore) -> anyhow::Result<()> {
            if self.fail_on_save {
                anyhow::bail!("disk full");
            }
            self.chores.insert(chore.id, chore.clone());
            Ok(())
        }
    }

    /// Copy-on-write store: the closure runs against a clone that replaces
    /// the committed state only on success.
    #[derive(Default)]
    struct MemoryStore {
        state: RefCell<State>,
    }

    impl Transactional for MemoryStore {
        fn atomically<T, F>(&self, f: F) -> Result<T, CoreError>
        where
            F: FnOnce(&mut dyn ChoreLedger) -> Result<T, CoreError>,
        {
            let mut working = self.state.borrow().clone();
            let out = f(&mut working)?;
            *self.state.borrow_mut() = working;
            Ok(out)
        }
    }

    const FAMILY: FamilyId = FamilyId(1);

    impl MemoryStore {
        fn with_members(ids: &[i64]) -> Self {
            let store = Self::default();
            for &id in ids {
                store.state.borrow_mut().members.insert(
                    UserId(id),
                    Member { id: UserId(id), family_id: Some(FAMILY) },
                );
            }
            store
        }

        fn add_chore(&self, id: i64, points: i64, group: bool, assignees: &[i64]) -> ChoreId {
            let chore = Chore {
                id: ChoreId(id),
                family_id: FAMILY,
                point_value: PointValue::new(points).unwrap(),
                is_group_chore: group,
                assigned_to: None,
                assignee_ids: assignees.iter().copied().map(UserId).collect(),
                completed: false,
                completed_by_ids: BTreeSet::new(),
            };
            self.state.borrow_mut().chores.insert(chore.id, chore);
            ChoreId(id)
        }

        fn awards_for(&self, chore: ChoreId) -> Vec<(i64, i64)> {
            let mut v: Vec<_> = self
                .state
                .borrow()
                .awards
                .iter()
                .filter(|a| a.chore_id == Some(chore))
                .map(|a| (a.user_id.0, a.points))
                .collect();
            v.sort();
            v
        }

        fn chore(&self, id: ChoreId) -> Chore {
            self.state.borrow().chores[&id].clone()
        }
    }

    fn ids(raw: &[i64]) -> BTreeSet<UserId> {
        raw.iter().copied().map(UserId).collect()
    }

    fn toggle(store: &MemoryStore, chore: ChoreId, actor: i64) -> Result<Chore, CoreError> {
        toggle_completion(store, chore, UserId(actor), GroupUncomplete::ClearAll)
    }

    #[test]
    fn group_chore_awards_every_assignee_then_clears() {
        let store = MemoryStore::with_members(&[3, 4]);
        let chore = store.add_chore(1, 5, true, &[3, 4]);

        let done = toggle(&store, chore, 3).unwrap();
        assert!(done.completed);
        assert_eq!(store.awards_for(chore), vec![(3, 5), (4, 5)]);

        let reopened = toggle(&store, chore, 3).unwrap();
        assert!(!reopened.completed);
        assert!(store.awards_for(chore).is_empty());
    }

    #[test]
    fn individual_chore_completes_when_all_assignees_are_done() {
        let store = MemoryStore::with_members(&[7, 8]);
        let chore = store.add_chore(2, 3, false, &[7, 8]);

        let after_seven = toggle(&store, chore, 7).unwrap();
        assert_eq!(after_seven.completed_by_ids, ids(&[7]));
        assert!(!after_seven.completed);
        assert_eq!(store.awards_for(chore), vec![(7, 3)]);

        let after_eight = toggle(&store, chore, 8).unwrap();
        assert_eq!(after_eight.completed_by_ids, ids(&[7, 8]));
        assert!(after_eight.completed);
        assert_eq!(store.awards_for(chore), vec![(7, 3), (8, 3)]);
    }

    #[test]
    fn individual_double_toggle_returns_to_start() {
        let store = MemoryStore::with_members(&[7, 8]);
        let chore = store.add_chore(2, 3, false, &[7, 8]);

        toggle(&store, chore, 7).unwrap();
        let back = toggle(&store, chore, 7).unwrap();

        assert!(back.completed_by_ids.is_empty());
        assert!(!back.completed);
        assert!(store.awards_for(chore).is_empty());
    }

    #[test]
    fn individual_reopen_drops_completed_flag() {
        let store = MemoryStore::with_members(&[7, 8]);
        let chore = store.add_chore(2, 3, false, &[7, 8]);
        toggle(&store, chore, 7).unwrap();
        toggle(&store, chore, 8).unwrap();

        let reopened = toggle(&store, chore, 8).unwrap();
        assert!(!reopened.completed);
        assert_eq!(store.awards_for(chore), vec![(7, 3)]);
    }

    #[test]
    fn existing_entry_is_not_awarded_twice() {
        let store = MemoryStore::with_members(&[3, 4]);
        let chore = store.add_chore(1, 5, true, &[3, 4]);
        store.state.borrow_mut().awards.push(NewAward {
            user_id: UserId(3),
            chore_id: Some(chore),
            points: 5,
            kind: AwardKind::Completion,
            awarded_at: Utc::now(),
        });

        toggle(&store, chore, 4).unwrap();

        assert_eq!(store.awards_for(chore), vec![(3, 5), (4, 5)]);
    }

    #[test]
    fn unassigned_group_chore_rewards_whoever_completes_it() {
        let store = MemoryStore::with_members(&[3, 4]);
        let chore = store.add_chore(1, 2, true, &[]);

        toggle(&store, chore, 4).unwrap();
        assert_eq!(store.awards_for(chore), vec![(4, 2)]);
    }

    #[test]
    fn legacy_single_assignee_is_rewarded() {
        let store = MemoryStore::with_members(&[3, 4]);
        let chore = store.add_chore(1, 6, true, &[]);
        store.state.borrow_mut().chores.get_mut(&chore).unwrap().assigned_to = Some(UserId(3));

        toggle(&store, chore, 4).unwrap();
        assert_eq!(store.awards_for(chore), vec![(3, 6)]);
    }

    #[test]
    fn reopening_group_chore_by_another_member_clears_everyone() {
        let store = MemoryStore::with_members(&[3, 4, 5]);
        let chore = store.add_chore(1, 5, true, &[3, 4]);
        toggle(&store, chore, 3).unwrap();

        toggle(&store, chore, 5).unwrap();
        assert!(store.awards_for(chore).is_empty());
    }

    #[test]
    fn completion_only_policy_keeps_manual_awards() {
        let store = MemoryStore::with_members(&[3, 4]);
        let chore = store.add_chore(1, 5, true, &[3]);
        store.state.borrow_mut().awards.push(NewAward {
            user_id: UserId(4),
            chore_id: Some(chore),
            points: 2,
            kind: AwardKind::Manual,
            awarded_at: Utc::now(),
        });

        let policy = GroupUncomplete::CompletionAwardsOnly;
        toggle_completion(&store, chore, UserId(3), policy).unwrap();
        assert_eq!(store.awards_for(chore), vec![(3, 5), (4, 2)]);

        toggle_completion(&store, chore, UserId(3), policy).unwrap();
        assert_eq!(store.awards_for(chore), vec![(4, 2)]);
    }

    #[test]
    fn member_of_another_family_is_forbidden() {
        let store = MemoryStore::with_members(&[3]);
        let chore = store.add_chore(1, 5, true, &[3]);
        store.state.borrow_mut().members.insert(
            UserId(99),
            Member { id: UserId(99), family_id: Some(FamilyId(2)) },
        );

        assert!(matches!(toggle(&store, chore, 99), Err(CoreError::Forbidden)));
        assert!(!store.chore(chore).completed);
        assert!(store.awards_for(chore).is_empty());
    }

    #[test]
    fn user_without_family_is_forbidden() {
        let store = MemoryStore::with_members(&[]);
        let chore = store.add_chore(1, 5, true, &[]);
        store
            .state
            .borrow_mut()
            .members
            .insert(UserId(8), Member { id: UserId(8), family_id: None });

        assert!(matches!(toggle(&store, chore, 8), Err(CoreError::Forbidden)));
    }

    #[test]
    fn missing_records_are_not_found() {
        let store = MemoryStore::with_members(&[3]);
        assert!(matches!(
            toggle(&store, ChoreId(404), 3),
            Err(CoreError::NotFound("chore"))
        ));

        let chore = store.add_chore(1, 5, true, &[3]);
        assert!(matches!(toggle(&store, chore, 77), Err(CoreError::NotFound("user"))));
    }

    #[test]
    fn failed_write_leaves_nothing_behind() {
        let store = MemoryStore::with_members(&[3, 4]);
        let chore = store.add_chore(1, 5, true, &[3, 4]);
        store.state.borrow_mut().fail_on_save = true;

        assert!(matches!(toggle(&store, chore, 3), Err(CoreError::Storage(_))));
        assert!(!store.chore(chore).completed);
        assert!(store.awards_for(chore).is_empty());
    }

    #[test]
    fn policy_parses_from_config_text() {
        assert_eq!("clear-all".parse::<GroupUncomplete>().unwrap(), GroupUncomplete::ClearAll);
        assert_eq!(
            "completion-only".parse::<GroupUncomplete>().unwrap(),
            GroupUncomplete::CompletionAwardsOnly
        );
        assert!("sometimes".parse::<GroupUncomplete>().is_err());
    }
}
