//! The client against a real server with a two-second bearer lifetime.

mod common;

use std::time::Duration;

use common::{PASSWORD, test_config};
use tollgate::client::{ClientError, ReauthClient};
use tollgate::db::Database;
use tollgate::start_server;

const PAST_BEARER_EXPIRY: Duration = Duration::from_millis(3100);

async fn start() -> ReauthClient {
    let db = Database::open(":memory:").await.unwrap();
    let (_handle, addr) = start_server(test_config(db, 2, false), 0).await.unwrap();
    ReauthClient::new(&format!("http://{}/api/v1/user/", addr)).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_expired_bearer_is_refreshed_transparently() {
    let client = start().await;

    client
        .register("alice", "alice@example.com", PASSWORD)
        .await
        .unwrap();
    let user = client.login("alice@example.com", PASSWORD).await.unwrap();
    assert_eq!(client.session().user(), Some(&user));

    client.profile().await.unwrap();

    tokio::time::sleep(PAST_BEARER_EXPIRY).await;
    let before = client.refresh_count();
    let profile = client.profile().await.unwrap();
    assert_eq!(profile.email, "alice@example.com");
    assert_eq!(client.refresh_count(), before + 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_after_expiry_refresh_once() {
    let client = start().await;
    client
        .register("alice", "alice@example.com", PASSWORD)
        .await
        .unwrap();
    client.login("alice@example.com", PASSWORD).await.unwrap();

    tokio::time::sleep(PAST_BEARER_EXPIRY).await;
    let before = client.refresh_count();

    let calls = (0..6).map(|_| {
        let client = client.clone();
        async move { client.profile().await }
    });
    let results = futures::future::join_all(calls).await;

    for result in &results {
        assert!(result.is_ok(), "{result:?}");
    }
    assert_eq!(client.refresh_count(), before + 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_profile_update_and_logout() {
    let client = start().await;
    client
        .register("alice", "alice@example.com", PASSWORD)
        .await
        .unwrap();
    client.login("alice@example.com", PASSWORD).await.unwrap();

    let updated = client.update_profile("Alicia").await.unwrap();
    assert_eq!(updated.name, "Alicia");
    assert_eq!(client.session().user().map(|u| u.name.as_str()), Some("Alicia"));

    let previous = client.logout().await.unwrap();
    assert_eq!(previous.map(|u| u.name), Some("Alicia".to_string()));
    assert!(!client.session().is_authenticated());

    // Cookies are gone, so the refresh is rejected
    let err = client.profile().await.unwrap_err();
    assert!(matches!(err, ClientError::SessionEnded { .. }), "{err:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_login_failure_and_duplicate_registration() {
    let client = start().await;
    client
        .register("alice", "alice@example.com", PASSWORD)
        .await
        .unwrap();

    let err = client
        .register("alice", "alice@example.com", PASSWORD)
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(reqwest::StatusCode::CONFLICT));

    let err = client
        .login("alice@example.com", "wrong password")
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(reqwest::StatusCode::UNAUTHORIZED));
    assert!(!client.session().is_authenticated());
}
