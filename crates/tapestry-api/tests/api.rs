use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use chrono::Duration;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use tapestry_api::{AppStateInner, Settings, router};
use tapestry_core::GroupUncomplete;
use tapestry_db::Database;

fn app() -> Router {
    let settings = Settings {
        jwt_secret: "test-secret-test-secret-test-secret".into(),
        token_ttl: Duration::minutes(30),
        reset_ttl: Duration::minutes(60),
        qr_ttl: Duration::seconds(300),
        qr_url_base: "tapestry://login".into(),
        expose_reset_tokens: true,
        group_uncomplete: GroupUncomplete::ClearAll,
    };
    let db = Database::open_in_memory().unwrap();
    router(Arc::new(AppStateInner { db, settings }))
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

/// A parent with a family, plus member tokens for `children`.
struct Household {
    parent: String,
    family_id: i64,
    members: Vec<(i64, String)>,
}

async fn household(app: &Router, tag: &str, children: usize) -> Household {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/auth/signup",
        None,
        Some(json!({
            "name": format!("Parent {tag}"),
            "email": format!("parent-{tag}@example.com"),
            "password": "parent-password",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let parent = body["access_token"].as_str().unwrap().to_string();

    let (status, body) = send(
        app,
        Method::POST,
        "/api/families",
        Some(&parent),
        Some(json!({ "name": format!("Family {tag}"), "admin_password": "admin-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let family_id = body["id"].as_i64().unwrap();

    let mut members = Vec::new();
    for i in 0..children {
        let email = format!("kid{i}-{tag}@example.com");
        let (status, body) = send(
            app,
            Method::POST,
            "/api/users",
            Some(&parent),
            Some(json!({
                "name": format!("Kid {i}"),
                "email": email,
                "password": "kid-password",
                "role": "child",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["id"].as_i64().unwrap();

        let (status, body) = send(
            app,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": email, "password": "kid-password" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        members.push((id, body["access_token"].as_str().unwrap().to_string()));
    }

    Household { parent, family_id, members }
}

async fn create_chore(app: &Router, token: &str, points: i64, group: bool, assignees: &[i64]) -> (StatusCode, Value) {
    send(
        app,
        Method::POST,
        "/api/chores",
        Some(token),
        Some(json!({
            "title": "Dishes",
            "emoji": "🍽️",
            "point_value": points,
            "assigned_to_ids": assignees,
            "is_group_chore": group,
            "week_start": "2024-03-04",
        })),
    )
    .await
}

#[tokio::test]
async fn health_probes_answer() {
    let app = app();
    let (status, _) = send(&app, Method::GET, "/healthz", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(&app, Method::GET, "/readyz", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn protected_routes_need_a_valid_token() {
    let app = app();
    let (status, body) = send(&app, Method::GET, "/api/chores", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["detail"].is_string());

    let (status, _) = send(&app, Method::GET, "/api/chores", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn group_chore_toggle_and_leaderboard() {
    let app = app();
    let home = household(&app, "a", 2).await;
    let (a, token_a) = home.members[0].clone();
    let (b, _) = home.members[1].clone();

    let (status, chore) = create_chore(&app, &home.parent, 5, true, &[a, b]).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(chore["family_id"].as_i64(), Some(home.family_id));
    let chore_id = chore["id"].as_i64().unwrap();

    let uri = format!("/api/chores/{chore_id}/complete");
    let (status, toggled) = send(&app, Method::POST, &uri, Some(&token_a), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(toggled["completed"], true);

    let (_, board) = send(&app, Method::GET, "/api/points/leaderboard", Some(&home.parent), None).await;
    let board = board.as_array().unwrap();
    assert_eq!(board.len(), 3);
    assert_eq!(board[0]["total_points"], 5);
    assert_eq!(board[1]["total_points"], 5);
    assert_eq!(board[2]["total_points"], 0);
    assert_eq!(board[0]["completed_chores"][0]["title"], "Dishes");

    let (_, completions) = send(
        &app,
        Method::GET,
        &format!("/api/chores/{chore_id}/completions"),
        Some(&home.parent),
        None,
    )
    .await;
    assert_eq!(completions.as_array().unwrap().len(), 2);

    // Un-completing retracts everything.
    let (_, toggled) = send(&app, Method::POST, &uri, Some(&token_a), None).await;
    assert_eq!(toggled["completed"], false);
    let (_, points) = send(&app, Method::GET, "/api/points", Some(&home.parent), None).await;
    assert!(points.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn individual_chore_tracks_each_assignee() {
    let app = app();
    let home = household(&app, "b", 2).await;
    let (a, token_a) = home.members[0].clone();
    let (b, token_b) = home.members[1].clone();

    let (_, chore) = create_chore(&app, &home.parent, 3, false, &[a, b]).await;
    let uri = format!("/api/chores/{}/complete", chore["id"]);

    let (_, first) = send(&app, Method::POST, &uri, Some(&token_a), None).await;
    assert_eq!(first["completed_by_ids"], json!([a]));
    assert_eq!(first["completed"], false);

    let (_, second) = send(&app, Method::POST, &uri, Some(&token_b), None).await;
    assert_eq!(second["completed_by_ids"], json!([a, b]));
    assert_eq!(second["completed"], true);

    let (_, points) = send(&app, Method::GET, "/api/points", Some(&home.parent), None).await;
    assert_eq!(points.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn point_values_outside_range_are_rejected() {
    let app = app();
    let home = household(&app, "c", 0).await;

    for points in [0, 11] {
        let (status, body) = create_chore(&app, &home.parent, points, true, &[]).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "point value {points}");
        assert!(body["detail"].as_str().unwrap().contains("point_value"));
    }
    let (status, _) = create_chore(&app, &home.parent, 10, true, &[]).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn assignees_must_belong_to_the_family() {
    let app = app();
    let ours = household(&app, "d", 0).await;
    let theirs = household(&app, "e", 1).await;
    let stranger = theirs.members[0].0;

    let (status, _) = create_chore(&app, &ours.parent, 2, true, &[stranger]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cross_family_and_family_token_toggles_are_forbidden() {
    let app = app();
    let home = household(&app, "f", 1).await;
    let other = household(&app, "g", 1).await;

    let (_, chore) = create_chore(&app, &home.parent, 4, true, &[]).await;
    let uri = format!("/api/chores/{}/complete", chore["id"]);

    let (status, _) = send(&app, Method::POST, &uri, Some(&other.members[0].1), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/admin-login",
        None,
        Some(json!({ "family_id": home.family_id, "admin_password": "admin-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let family_token = body["access_token"].as_str().unwrap().to_string();

    // The family token can read family data but cannot act as a member.
    let (status, _) = send(&app, Method::GET, "/api/chores", Some(&family_token), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::POST, &uri, Some(&family_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, Method::POST, "/api/chores/9999/complete", Some(&home.members[0].1), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn changing_chore_type_with_progress_conflicts() {
    let app = app();
    let home = household(&app, "h", 1).await;
    let (kid, token) = home.members[0].clone();

    let (_, chore) = create_chore(&app, &home.parent, 2, false, &[kid]).await;
    let id = chore["id"].as_i64().unwrap();
    send(&app, Method::POST, &format!("/api/chores/{id}/complete"), Some(&token), None).await;

    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/api/chores/{id}"),
        Some(&home.parent),
        Some(json!({ "is_group_chore": true })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, updated) = send(
        &app,
        Method::PUT,
        &format!("/api/chores/{id}"),
        Some(&home.parent),
        Some(json!({ "title": "Dry dishes", "point_value": 7 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["title"], "Dry dishes");
    assert_eq!(updated["point_value"], 7);
    assert_eq!(updated["completed"], true);
}

#[tokio::test]
async fn reassigning_a_completed_group_chore_conflicts() {
    let app = app();
    let home = household(&app, "r", 3).await;
    let (a, token) = home.members[0].clone();
    let (b, c) = (home.members[1].0, home.members[2].0);

    let (_, chore) = create_chore(&app, &home.parent, 5, true, &[a, b]).await;
    let id = chore["id"].as_i64().unwrap();
    send(&app, Method::POST, &format!("/api/chores/{id}/complete"), Some(&token), None).await;

    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/api/chores/{id}"),
        Some(&home.parent),
        Some(json!({ "assigned_to_ids": [a, b, c] })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, stored) = send(&app, Method::GET, "/api/chores", Some(&home.parent), None).await;
    assert_eq!(stored[0]["assigned_to_ids"], json!([a, b]));

    // Same set in another order is not a change.
    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/api/chores/{id}"),
        Some(&home.parent),
        Some(json!({ "assigned_to_ids": [b, a] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Once reopened the chore can be reassigned.
    send(&app, Method::POST, &format!("/api/chores/{id}/complete"), Some(&token), None).await;
    let (status, updated) = send(
        &app,
        Method::PUT,
        &format!("/api/chores/{id}"),
        Some(&home.parent),
        Some(json!({ "assigned_to_ids": [a, b, c] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["assigned_to_ids"], json!([a, b, c]));
}

#[tokio::test]
async fn recurrence_days_outside_the_week_are_rejected() {
    let app = app();
    let home = household(&app, "w", 0).await;

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/chores",
        Some(&home.parent),
        Some(json!({
            "title": "Laundry",
            "point_value": 3,
            "week_start": "2024-03-04",
            "is_recurring": true,
            "recurrence_type": "weekly",
            "recurrence_days": [1, 9],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, chore) = create_chore(&app, &home.parent, 3, true, &[]).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = chore["id"].as_i64().unwrap();

    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/api/chores/{id}"),
        Some(&home.parent),
        Some(json!({ "recurrence": { "is_recurring": true, "recurrence_days": [7] } })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn duplicate_signup_conflicts_and_bad_login_is_unauthorized() {
    let app = app();
    let signup = json!({ "name": "Ada", "email": "ada@example.com", "password": "long-password" });
    let (status, _) = send(&app, Method::POST, "/api/auth/signup", None, Some(signup.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = send(&app, Method::POST, "/api/auth/signup", None, Some(signup)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "email": "ada@example.com", "password": "wrong-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/auth/signup",
        None,
        Some(json!({ "name": "Bo", "email": "bo@example.com", "password": "short" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn password_reset_token_works_once() {
    let app = app();
    let signup = json!({ "name": "Ada", "email": "ada@example.com", "password": "first-password" });
    send(&app, Method::POST, "/api/auth/signup", None, Some(signup)).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/forgot-password",
        None,
        Some(json!({ "email": "ada@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["reset_token"].as_str().unwrap().to_string();

    let reset = json!({ "token": token, "new_password": "second-password" });
    let (status, _) = send(&app, Method::POST, "/api/auth/reset-password", None, Some(reset.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::POST, "/api/auth/reset-password", None, Some(reset)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "email": "ada@example.com", "password": "second-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Unknown emails get the same answer and no token.
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/forgot-password",
        None,
        Some(json!({ "email": "nobody@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("reset_token").is_none());
}

#[tokio::test]
async fn qr_login_hands_out_a_token_once() {
    let app = app();
    let home = household(&app, "q", 1).await;
    let member = home.members[0].1.clone();

    let (status, session) = send(&app, Method::POST, "/api/auth/qr", None, None).await;
    assert_eq!(status, StatusCode::CREATED);
    let token = session["session_token"].as_str().unwrap().to_string();
    assert!(session["qr_code_url"].as_str().unwrap().ends_with(&token));

    let poll_uri = format!("/api/auth/qr/{token}");
    let (_, pending) = send(&app, Method::GET, &poll_uri, None, None).await;
    assert_eq!(pending["status"], "pending");

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/auth/qr/scan",
        Some(&member),
        Some(json!({ "session_token": token })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, scanned) = send(&app, Method::GET, &poll_uri, None, None).await;
    assert_eq!(scanned["status"], "scanned");
    let issued = scanned["access_token"].as_str().unwrap().to_string();

    let (status, me) = send(&app, Method::GET, "/api/auth/me", Some(&issued), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["id"].as_i64(), Some(home.members[0].0));

    let (status, _) = send(&app, Method::GET, &poll_uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn calendar_lists_events_in_the_requested_week() {
    let app = app();
    let home = household(&app, "cal", 1).await;
    let kid = home.members[0].0;

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/calendars",
        Some(&home.parent),
        Some(json!({
            "title": "Swim practice",
            "start_time": "2024-03-05T16:00:00Z",
            "end_time": "2024-03-05T17:00:00Z",
            "participant_ids": [kid],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/calendars",
        Some(&home.parent),
        Some(json!({
            "title": "Backwards",
            "start_time": "2024-03-05T17:00:00Z",
            "end_time": "2024-03-05T16:00:00Z",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, week) = send(
        &app,
        Method::GET,
        "/api/calendars?week_start=2024-03-04T00:00:00Z",
        Some(&home.parent),
        None,
    )
    .await;
    let week = week.as_array().unwrap();
    assert_eq!(week.len(), 1);
    assert_eq!(week[0]["participant_ids"], json!([kid]));

    let (_, next_week) = send(
        &app,
        Method::GET,
        "/api/calendars?week_start=2024-03-11T00:00:00Z",
        Some(&home.parent),
        None,
    )
    .await;
    assert!(next_week.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn goals_crud() {
    let app = app();
    let home = household(&app, "goal", 0).await;

    let (status, goal) = send(
        &app,
        Method::POST,
        "/api/goals",
        Some(&home.parent),
        Some(json!({ "name": "Zoo trip", "point_requirement": 100 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let uri = format!("/api/goals/{}", goal["id"]);

    let (_, updated) = send(&app, Method::PUT, &uri, Some(&home.parent), Some(json!({ "prize": "Ice cream" }))).await;
    assert_eq!(updated["prize"], "Ice cream");
    assert_eq!(updated["point_requirement"], 100);

    let (status, _) = send(&app, Method::DELETE, &uri, Some(&home.parent), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, goals) = send(&app, Method::GET, "/api/goals", Some(&home.parent), None).await;
    assert!(goals.as_array().unwrap().is_empty());
}
