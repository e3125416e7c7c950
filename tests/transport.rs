//! End-to-end tests against a local HTTP server.

use std::time::{Duration, Instant};

use barrage::{
    BarrageError, Client, Diagnostic, DispatchConfig, Params, RequestDescriptor, StatusClass,
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> Client {
    Client::new(DispatchConfig::new(&server.uri()).unwrap()).unwrap()
}

#[test_log::test(tokio::test)]
async fn test_get_sends_query_params() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/anything"))
        .and(query_param("page", "3"))
        .and(query_param("q", "rust"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let params = Params::new().with("page", 3).with("q", "rust");
    let result = client_for(&mock_server)
        .submit_async(vec![RequestDescriptor::get("/anything", Some(params))])
        .await
        .unwrap();

    let response = result.as_single().unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.json::<Value>().unwrap(), json!({"ok": true}));
}

#[test_log::test(tokio::test)]
async fn test_post_sends_json_body_and_default_headers() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/items"))
        .and(header("X-Api-Key", "secret"))
        .and(body_json(json!({"name": "widget"})))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = DispatchConfig::new(&mock_server.uri())
        .unwrap()
        .with_header("X-Api-Key", "secret");
    let client = Client::new(config).unwrap();

    let result = client
        .submit_async(vec![RequestDescriptor::post(
            "items",
            Some(json!({"name": "widget"})),
        )])
        .await
        .unwrap();

    assert_eq!(result.as_single().map(|r| r.status), Some(201));
}

#[test_log::test(tokio::test)]
async fn test_many_requests_return_in_submission_order() {
    let mock_server = MockServer::start().await;

    for (i, delay_ms) in [(0, 300), (1, 0), (2, 150)] {
        Mock::given(method("GET"))
            .and(path(format!("/item/{}", i)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"item": i}))
                    .set_delay(Duration::from_millis(delay_ms)),
            )
            .mount(&mock_server)
            .await;
    }

    let result = client_for(&mock_server)
        .submit_async(
            (0..3)
                .map(|i| RequestDescriptor::get(format!("item/{}", i), None))
                .collect(),
        )
        .await
        .unwrap();

    let items: Vec<Value> = result
        .into_iter()
        .map(|r| r.json::<Value>().unwrap()["item"].clone())
        .collect();
    assert_eq!(items, vec![json!(0), json!(1), json!(2)]);
}

#[test_log::test(tokio::test)]
async fn test_client_error_is_classified() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/items/1"))
        .respond_with(
            ResponseTemplate::new(422)
                .insert_header("Link", r#"</items?page=2>; rel="next""#)
                .set_body_json(json!({"errors": {"name": ["required"]}})),
        )
        .mount(&mock_server)
        .await;

    let error = client_for(&mock_server)
        .submit_async(vec![RequestDescriptor::put("items/1", Some(json!({})))])
        .await
        .unwrap_err();

    let classified = error.classified().unwrap();
    assert_eq!(classified.status(), Some(422));
    assert_eq!(classified.kind(), Some(StatusClass::ClientError));
    let BarrageError::Classified(barrage::ClassifiedError::StatusFailure(failure)) = error else {
        panic!("expected a status failure");
    };
    assert_eq!(
        failure.diagnostic,
        Diagnostic::Json(json!({"name": ["required"]}))
    );
    assert_eq!(failure.links.as_deref(), Some(r#"</items?page=2>; rel="next""#));
    assert_eq!(
        failure.to_string(),
        r#"Client error 422 Unprocessable Entity {"name":["required"]}"#
    );
}

#[test_log::test(tokio::test)]
async fn test_error_status_passes_through_without_raise_on_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/items/1"))
        .respond_with(ResponseTemplate::new(503).set_body_string("down"))
        .mount(&mock_server)
        .await;

    let config = DispatchConfig::new(&mock_server.uri())
        .unwrap()
        .with_raise_on_error(false);
    let result = Client::new(config)
        .unwrap()
        .submit_async(vec![RequestDescriptor::delete("items/1", None)])
        .await
        .unwrap();

    let response = result.as_single().unwrap();
    assert_eq!(response.status, 503);
    assert_eq!(response.text(), "down");
}

#[test_log::test(tokio::test)]
async fn test_server_error_stops_slow_requests() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/fail"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&mock_server)
        .await;

    let mut batch: Vec<RequestDescriptor> =
        (0..10).map(|_| RequestDescriptor::get("slow", None)).collect();
    batch.push(RequestDescriptor::get("fail", None));

    let started = Instant::now();
    let error = client_for(&mock_server)
        .submit_async(batch)
        .await
        .unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(
        error.classified().and_then(|e| e.kind()),
        Some(StatusClass::ServerError)
    );
}

#[test_log::test(tokio::test)]
async fn test_timeout_is_a_communication_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&mock_server)
        .await;

    let config = DispatchConfig::new(&mock_server.uri())
        .unwrap()
        .with_timeout_secs(1);
    let error = Client::new(config)
        .unwrap()
        .submit_async(vec![RequestDescriptor::get("anything", None)])
        .await
        .unwrap_err();

    assert!(error.is_communication_failure());
    assert!(error.to_string().starts_with("CommunicationError, "));
}

#[test_log::test(tokio::test)]
async fn test_connection_refused_is_a_communication_failure() {
    let client = Client::new(DispatchConfig::new("http://127.0.0.1:1/").unwrap()).unwrap();

    let error = client
        .submit_async(vec![
            RequestDescriptor::get("anything", None),
            RequestDescriptor::get("anything", None),
        ])
        .await
        .unwrap_err();

    assert!(error.is_communication_failure());
}

#[test_log::test(tokio::test)]
async fn test_large_batch_completes() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/anything"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(50)))
        .expect(120)
        .mount(&mock_server)
        .await;

    let result = client_for(&mock_server)
        .submit_async(
            (0..120)
                .map(|_| RequestDescriptor::get("anything", None))
                .collect(),
        )
        .await
        .unwrap();

    assert_eq!(result.len(), 120);
    assert!(result.into_iter().all(|r| r.status == 200));
}

#[test_log::test(tokio::test)]
async fn test_anything_wrapper_against_server() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/anything"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&mock_server)
        .await;

    let bodies = (0..2)
        .map(|i| json!({"gday": {"mate": {"how": {"the": {"bloody": {"hell": ["are", "ya", i]}}}}}}))
        .collect();
    let client = client_for(&mock_server);
    let result = client.anything().get_anything_async(bodies).await.unwrap();

    assert_eq!(result.len(), 2);
}
