//! JSON source behaviour against a mocked upstream.

// std
use std::time::Duration;
// crates.io
use resilient_cache::{FetchError, ResilientCache, RetryPolicy, http::client::JsonSource};
use serde::{Deserialize, Serialize};
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{header, method, path},
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Habit {
	id: u32,
	name: String,
}

fn quick_cache() -> ResilientCache {
	ResilientCache::builder()
		.retry_policy(RetryPolicy { base_delay: Duration::from_millis(10), ..RetryPolicy::default() })
		.build()
		.expect("cache")
}

fn habits() -> Vec<Habit> {
	vec![Habit { id: 1, name: "run".into() }, Habit { id: 2, name: "read".into() }]
}

#[tokio::test]
async fn unavailable_upstream_is_retried_until_it_recovers() {
	let _ = tracing_subscriber::fmt::try_init();
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/habits"))
		.respond_with(ResponseTemplate::new(503))
		.up_to_n_times(1)
		.expect(1)
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path("/habits"))
		.respond_with(ResponseTemplate::new(200).set_body_json(habits()))
		.expect(1)
		.mount(&server)
		.await;

	let source = JsonSource::new(format!("{}/habits", server.uri())).expect("source");
	let cache = quick_cache();
	let result = cache.get("habits:list", || source.fetch::<Vec<Habit>>()).await;

	assert_eq!(result.data, Some(habits()));
	assert!(result.error.is_none());
	assert_eq!(cache.metrics().snapshot().retries, 1);
}

#[tokio::test]
async fn unauthorized_responses_are_not_retried() {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/habits"))
		.and(header("authorization", "Bearer expired"))
		.respond_with(ResponseTemplate::new(401))
		.expect(2)
		.mount(&server)
		.await;

	let source = JsonSource::new(format!("{}/habits", server.uri()))
		.expect("source")
		.bearer_token("expired");
	let cache = quick_cache();
	let result = cache.get("habits:list", || source.fetch::<Vec<Habit>>()).await;

	assert!(result.data.is_none());
	assert!(result.is_failed());
	assert!(result.error.as_deref().is_some_and(|message| message.contains("401")));

	let err = FetchError::from(source.fetch::<Vec<Habit>>().await.unwrap_err());

	assert!(!err.is_retryable());
}

#[tokio::test]
async fn oversized_bodies_are_rejected() {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/events"))
		.respond_with(ResponseTemplate::new(200).set_body_json(habits()))
		.mount(&server)
		.await;

	let source =
		JsonSource::new(format!("{}/events", server.uri())).expect("source").max_response_bytes(8);
	let err = source.fetch::<Vec<Habit>>().await.unwrap_err();

	assert!(matches!(err, resilient_cache::Error::Validation { field: "max_response_bytes", .. }));
}
