use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tapestry_types::api::{CompletedChore, LeaderboardEntry};
use tapestry_types::{ChoreId, UserId};

use crate::chore::PointValue;

/// A family member as shown on the leaderboard.
pub struct MemberProfile {
    pub id: UserId,
    pub name: String,
    pub icon_emoji: Option<String>,
}

/// One ledger entry, manual or completion award.
pub struct LedgerEntry {
    pub user_id: UserId,
    pub chore_id: Option<ChoreId>,
    pub points: i64,
    pub awarded_at: DateTime<Utc>,
}

/// Display fields of a chore that still exists.
pub struct ChoreSummary {
    pub title: String,
    pub emoji: Option<String>,
    pub point_value: PointValue,
}

/// Rank family members by total points.
///
/// Totals include every entry of the member, manual awards and entries whose
/// chore is gone. The completed-chore history only lists entries whose chore is
/// still in `chores`, newest first. Members with equal totals keep ascending
/// user id order.
pub fn compute(
    members: &[MemberProfile],
    entries: &[LedgerEntry],
    chores: &HashMap<ChoreId, ChoreSummary>,
) -> Vec<LeaderboardEntry> {
    let mut by_user: HashMap<UserId, Vec<&LedgerEntry>> = HashMap::new();
    for entry in entries {
        by_user.entry(entry.user_id).or_default().push(entry);
    }

    let mut ordered: Vec<&MemberProfile> = members.iter().collect();
    ordered.sort_by_key(|m| m.id);

    let mut board: Vec<LeaderboardEntry> = ordered
        .into_iter()
        .map(|member| {
            let own = by_user.remove(&member.id).unwrap_or_default();
            let total_points: i64 = own.iter().map(|e| e.points).sum();

            let mut completed_chores: Vec<CompletedChore> = own
                .iter()
                .filter_map(|e| {
                    let chore_id = e.chore_id?;
                    let chore = chores.get(&chore_id)?;
                    Some(CompletedChore {
                        id: chore_id,
                        title: chore.title.clone(),
                        emoji: chore.emoji.clone(),
                        point_value: chore.point_value.get(),
                        awarded_at: e.awarded_at,
                    })
                })
                .collect();
            completed_chores.sort_by(|a, b| b.awarded_at.cmp(&a.awarded_at));

            LeaderboardEntry {
                user_id: member.id,
                name: member.name.clone(),
                icon_emoji: member.icon_emoji.clone(),
                total_points,
                completed_chores,
            }
        })
        .collect();

    // Stable: ties stay in user id order.
    board.sort_by(|a, b| b.total_points.cmp(&a.total_points));
    board
}
