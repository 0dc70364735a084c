mod common;

use common::{TestApp, CLIENT_TOKEN, USER, USER_TOKEN};
use reqwest::StatusCode;
use serde_json::Value;

const APACHECON: &str = "urn:collab:group:surfteams.nl:nl:surfnet:diensten:apachecon";
const MATH: &str = "urn:collab:group:example.org:course:math";

fn find<'a>(groups: &'a [Value], id: &str) -> &'a Value {
    groups
        .iter()
        .find(|g| g["id"] == id)
        .unwrap_or_else(|| panic!("group {id} missing from {groups:?}"))
}

#[tokio::test]
async fn my_groups_merges_all_eligible_providers() {
    let app = TestApp::spawn().await;

    let response = app.get("/me/groups", Some(USER_TOKEN)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let groups: Vec<Value> = response.json().await.expect("Failed to parse JSON");
    assert_eq!(groups.len(), 3);

    let apachecon = find(&groups, APACHECON);
    assert_eq!(apachecon["displayName"], "ApacheCon");
    assert_eq!(apachecon["membership"]["basic"], "admin");
    assert_eq!(apachecon["schacHomeOrganization"], "surfteams.nl");

    let math = find(&groups, MATH);
    assert_eq!(math["schacHomeOrganization"], "example.org");
    assert_eq!(math["membership"]["basic"], "member");
}

#[tokio::test]
async fn my_group_by_id() {
    let app = TestApp::spawn().await;

    let response = app
        .get(&format!("/me/groups/{}", MATH), Some(USER_TOKEN))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let group: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(group["displayName"], "Math");

    let response = app
        .get("/me/groups/urn:collab:group:example.org:unknown", Some(USER_TOKEN))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_group_urn_is_bad_request() {
    let app = TestApp::spawn().await;

    let response = app
        .get("/me/groups/urn:collab:group:example.org", Some(USER_TOKEN))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: Value = response.json().await.expect("Failed to parse JSON");
    let message = body["error"].as_str().unwrap_or_default();
    assert!(message.contains("is not a valid group-urn"), "{message}");
}

#[tokio::test]
async fn internal_user_groups() {
    let app = TestApp::spawn().await;

    let response = app
        .get(&format!("/internal/groups/{}", USER), Some(CLIENT_TOKEN))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let groups: Vec<Value> = response.json().await.expect("Failed to parse JSON");
    assert_eq!(groups.len(), 3);

    let response = app
        .get(&format!("/internal/groups/{}/{}", USER, APACHECON), Some(CLIENT_TOKEN))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.get("/internal/groups/admin", Some(CLIENT_TOKEN)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn internal_external_groups_skip_the_registry() {
    let app = TestApp::spawn().await;

    let response = app
        .get(&format!("/internal/external-groups/{}", USER), Some(CLIENT_TOKEN))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let groups: Vec<Value> = response.json().await.expect("Failed to parse JSON");
    assert_eq!(groups.len(), 2);
    assert_eq!(find(&groups, APACHECON)["displayName"], "ApacheCon (partner copy)");
    assert!(app.grouper.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn all_groups_comes_from_the_registry() {
    let app = TestApp::spawn().await;

    let response = app.get("/internal/all-groups", Some(CLIENT_TOKEN)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let groups: Vec<Value> = response.json().await.expect("Failed to parse JSON");
    assert_eq!(groups.len(), 3);
    assert!(app.partner.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn members_are_listed_by_one_provider() {
    let app = TestApp::spawn().await;

    let response = app
        .get(&format!("/members/{}", MATH), Some(CLIENT_TOKEN))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let members: Vec<Value> = response.json().await.expect("Failed to parse JSON");
    assert_eq!(members.len(), 1);
    assert_eq!(members[0]["displayName"], "John Doe");
    assert!(app.grouper.received_requests().await.unwrap_or_default().is_empty());

    let response = app
        .get(&format!("/members/{}", APACHECON), Some(CLIENT_TOKEN))
        .await;
    let members: Vec<Value> = response.json().await.expect("Failed to parse JSON");
    assert_eq!(members[0]["id"], USER);
}

#[tokio::test]
async fn failing_provider_does_not_fail_the_aggregate() {
    let app = TestApp::spawn().await;
    app.partner.reset().await;
    wiremock::Mock::given(wiremock::matchers::any())
        .respond_with(wiremock::ResponseTemplate::new(500))
        .mount(&app.partner)
        .await;

    let response = app.get("/me/groups", Some(USER_TOKEN)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let groups: Vec<Value> = response.json().await.expect("Failed to parse JSON");
    assert_eq!(groups.len(), 2);
}
