//! Types shared between the Tapestry crates: id newtypes, JWT claims and the
//! JSON request/response shapes of the HTTP API.

pub mod api;
pub mod ids;
pub mod models;

pub use ids::{ChoreId, EventId, FamilyId, GoalId, PointId, UserId};
