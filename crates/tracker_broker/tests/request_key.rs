use http::Request;

use tracker_broker::model::request_key;
use tracker_broker::TrackerRequest;

fn get(uri: &str) -> Request<Vec<u8>> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header(http::header::USER_AGENT, "test-agent")
        .body(Vec::new())
        .unwrap()
}

#[test]
fn same_path_on_different_trackers_has_different_keys() {
    let a = TrackerRequest::new(get("https://pagure.io/api/0/fedora-infra/issues")).unwrap();
    let b = TrackerRequest::new(get("https://gitlab.com/api/0/fedora-infra/issues")).unwrap();
    assert_ne!(a.key(), b.key());
}

#[test]
fn query_string_is_part_of_the_key() {
    let a = get("https://api.github.com/repos/o/r/issues?labels=easyfix&state=open");
    let b = get("https://api.github.com/repos/o/r/issues?labels=bitesize&state=open");
    assert_ne!(request_key(&a), request_key(&b));
}

#[test]
fn get_requests_ignore_body_in_key() {
    let mut with_body = get("https://bugzilla.redhat.com/rest/bug?keywords=easyfix");
    *with_body.body_mut() = b"ignored".to_vec();
    let plain = get("https://bugzilla.redhat.com/rest/bug?keywords=easyfix");
    assert_eq!(request_key(&with_body), request_key(&plain));
}

#[test]
fn credentials_never_reach_the_key() {
    let mut authed = get("https://api.github.com/orgs/fedora-infra/repos?sort=full_name");
    authed.headers_mut().insert(
        http::header::AUTHORIZATION,
        http::HeaderValue::from_static("Basic dXNlcjpzZWNyZXQ="),
    );
    let key = request_key(&authed);
    assert!(!key.contains("dXNlcjpzZWNyZXQ"));
    assert_eq!(
        key,
        "GET https://api.github.com/orgs/fedora-infra/repos?sort=full_name"
    );
}

#[test]
fn user_agent_is_required() {
    let req = Request::builder()
        .method("GET")
        .uri("https://pagure.io/api/0/x/issues")
        .body(Vec::new())
        .unwrap();
    assert!(TrackerRequest::new(req).is_err());
}
