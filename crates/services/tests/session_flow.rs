use std::sync::Arc;

use progress_core::model::{ChannelId, Credentials, FacilityId};
use progress_core::time::fixed_now;
use resources::{Collection, InMemoryResources, Operation};
use serde_json::json;
use services::{
    AppServices, CHANNEL_COOKIE, Clock, CookieJar, MemoryCookieJar, Redirect, SessionError,
    TrackerConfig,
};

struct Harness {
    backend: InMemoryResources,
    cookies: MemoryCookieJar,
    app: AppServices,
}

fn harness() -> Harness {
    let backend = InMemoryResources::new();
    backend.register_account(
        "ann",
        "secret",
        json!({"user_id": "u1", "username": "ann", "full_name": "Ann Lee", "kind": ["learner"]}),
    );
    backend.seed(Collection::Facility, json!({"id": "f1", "name": "Riverside"}));
    backend.seed(
        Collection::FacilityDataset,
        json!({"id": "d1", "facility_id": "f1", "learner_can_login_with_no_password": true}),
    );
    backend.seed(Collection::Channel, json!({"id": "math", "name": "Math"}));
    backend.seed(Collection::Channel, json!({"id": "art", "name": "Art"}));
    backend.seed(Collection::UserProgress, json!({"id": "u1", "progress": 1.5}));

    let cookies = MemoryCookieJar::new();
    let app = AppServices::new(
        Arc::new(backend.clone()),
        Arc::new(cookies.clone()),
        Clock::fixed(fixed_now()),
        TrackerConfig::default(),
    );
    Harness {
        backend,
        cookies,
        app,
    }
}

#[tokio::test]
async fn sign_in_bootstraps_learner_state() {
    let h = harness();
    let redirect = h
        .app
        .session()
        .login(&Credentials::new("ann", "secret"), false)
        .await
        .unwrap();
    assert_eq!(redirect, Redirect::Home);
    assert_eq!(redirect.path(), "/learn/");

    let session = h.app.session().get_current_session(true).await.unwrap();
    assert_eq!(session.facility_id, Some(FacilityId::new("f1")));

    let config = h.app.session().fetch_facility_config().await.unwrap();
    assert!(config.learner_can_login_with_no_password);

    assert_eq!(h.app.session().fetch_points().await.unwrap(), 750);

    h.cookies.set(CHANNEL_COOKIE, "art").unwrap();
    let current = h.app.channels().set_channel_info(None).await.unwrap();
    assert_eq!(current, Some(ChannelId::new("art")));

    let state = h.app.state();
    assert_eq!(state.session.full_name, "Ann Lee");
    assert_eq!(state.total_points(), 750);
    assert_eq!(state.channels.list.len(), 2);
}

#[tokio::test]
async fn wrong_password_is_a_login_error_not_an_api_error() {
    let h = harness();
    let err = h
        .app
        .session()
        .login(&Credentials::new("ann", "nope"), false)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::BadCredentials));

    let state = h.app.state();
    assert_eq!(state.status.login_error, Some(401));
    assert!(state.status.error.is_none());
    assert!(state.session.is_anonymous());
}

#[tokio::test]
async fn sign_out_drops_cache_and_reloads() {
    let h = harness();
    h.app
        .session()
        .login(&Credentials::new("ann", "secret"), false)
        .await
        .unwrap();

    let redirect = h.app.session().logout().await.unwrap();
    assert_eq!(redirect, Redirect::Reload);
    assert_eq!(h.backend.cache_clears(), 1);
    assert_eq!(h.backend.count(Operation::Delete, Collection::Session), 1);
    assert!(h.app.state().session.is_anonymous());
}

#[tokio::test]
async fn failed_sign_out_keeps_cache() {
    let h = harness();
    h.backend.fail_next(Collection::Session, 500);

    assert!(h.app.session().logout().await.is_err());
    assert_eq!(h.backend.cache_clears(), 0);
    assert!(h.app.state().status.error.is_some());
}
