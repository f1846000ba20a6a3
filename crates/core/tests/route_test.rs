// Route actions and page route dispatch against a scripted driver.

mod common;

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::{Driver, PAGE};
use pw_net::{
	ContinueOptions, Error, FulfillOptions, HeaderEntry, Headers, NormalizeFuture, NormalizedContinue, NormalizedFulfill, Normalizer,
	ProxyOptions, Route, RouteState,
};
use serde_json::json;

async fn intercept(driver: &Driver, n: u32, url: &str) -> Route {
	let request = format!("request@{n}");
	let route = format!("route@{n}");
	driver.request(&request, url, json!({})).await;
	driver.create(PAGE, "Route", &route, json!({ "request": { "guid": request } }));
	driver.flush().await;
	driver.root.object::<Route>(&route).expect("route registered")
}

#[tokio::test]
async fn test_fulfill_then_continue_is_rejected_locally() {
	let (mut driver, _page) = Driver::start_with_page().await;
	let route = intercept(&driver, 1, "https://example.com/").await;
	assert_eq!(route.state(), RouteState::Pending);

	let (result, call) = tokio::join!(
		route.fulfill(FulfillOptions::builder().body("hi").build()),
		driver.answer("fulfill", json!({}))
	);
	result.expect("fulfill succeeds");
	assert_eq!(call["guid"], "route@1");
	assert_eq!(
		call["params"],
		json!({
			"status": 200,
			"headers": [{ "name": "content-length", "value": "2" }],
			"body": "aGk=",
			"isBase64": true,
		})
	);
	assert_eq!(route.state(), RouteState::Fulfilled);

	let err = route.continue_(None).await.unwrap_err();
	assert!(matches!(
		err,
		Error::RouteAlreadyHandled {
			handled: "fulfilled",
			attempted: "continue",
			..
		}
	));
	assert!(driver.pending_call().is_none());
}

#[tokio::test]
async fn test_every_second_action_is_rejected() {
	let (mut driver, _page) = Driver::start_with_page().await;
	let route = intercept(&driver, 1, "https://example.com/").await;

	let (result, _) = tokio::join!(route.continue_(None), driver.answer("continue", json!({})));
	result.expect("continue succeeds");

	assert!(matches!(route.abort(None).await, Err(Error::RouteAlreadyHandled { .. })));
	assert!(matches!(route.continue_(None).await, Err(Error::RouteAlreadyHandled { .. })));
	assert!(matches!(
		route.fulfill(FulfillOptions::default()).await,
		Err(Error::RouteAlreadyHandled { handled: "continued", .. })
	));
	assert!(driver.pending_call().is_none());
}

#[tokio::test]
async fn test_abort_error_codes() {
	let (mut driver, _page) = Driver::start_with_page().await;
	let first = intercept(&driver, 1, "https://example.com/a").await;
	let second = intercept(&driver, 2, "https://example.com/b").await;

	let (result, call) = tokio::join!(first.abort(None), driver.answer("abort", json!({})));
	result.unwrap();
	assert_eq!(call["params"], json!({ "errorCode": "failed" }));

	let (result, call) = tokio::join!(second.abort(Some("timedout")), driver.answer("abort", json!({})));
	result.unwrap();
	assert_eq!(call["params"], json!({ "errorCode": "timedout" }));
	assert_eq!(second.state(), RouteState::Aborted);
}

#[tokio::test]
async fn test_configured_default_abort_code() {
	let mut driver = Driver::start_with(ProxyOptions::builder().default_abort_error_code("blockedbyclient").build()).await;
	driver.open_page().await;
	let route = intercept(&driver, 1, "https://example.com/").await;

	let (result, call) = tokio::join!(route.abort(None), driver.answer("abort", json!({})));
	result.unwrap();
	assert_eq!(call["params"]["errorCode"], "blockedbyclient");
}

#[tokio::test]
async fn test_route_stays_handled_after_remote_rejection() {
	let (mut driver, _page) = Driver::start_with_page().await;
	let route = intercept(&driver, 1, "https://example.com/").await;

	let (result, _) = tokio::join!(route.abort(None), async {
		let call = driver.next_call().await;
		driver.fail(&call["id"], "Error", "Route is already handled!");
	});
	assert!(result.unwrap_err().is_remote());
	assert_eq!(route.state(), RouteState::Aborted);

	let err = route.fulfill(FulfillOptions::default()).await.unwrap_err();
	assert!(matches!(err, Error::RouteAlreadyHandled { handled: "aborted", .. }));
}

#[tokio::test]
async fn test_continue_overrides_wire_form() {
	let (mut driver, _page) = Driver::start_with_page().await;
	let route = intercept(&driver, 1, "https://example.com/").await;
	assert_eq!(route.request().expect("request resolves").url(), "https://example.com/");

	let overrides = ContinueOptions::builder().method("PUT").header("X-Test", "1").post_data("hello").build();
	let (result, call) = tokio::join!(route.continue_(Some(overrides)), driver.answer("continue", json!({})));
	result.unwrap();
	assert_eq!(
		call["params"],
		json!({
			"method": "PUT",
			"headers": [
				{ "name": "content-length", "value": "5" },
				{ "name": "x-test", "value": "1" },
			],
			"postData": "aGVsbG8=",
		})
	);
}

#[tokio::test]
async fn test_continue_post_data_recomputes_request_content_length() {
	let (mut driver, _page) = Driver::start_with_page().await;
	let headers = json!({ "headers": [
		{ "name": "Content-Type", "value": "text/plain" },
		{ "name": "Content-Length", "value": "2" },
	] });
	driver.request("request@1", "https://example.com/upload", headers).await;
	driver.create(PAGE, "Route", "route@1", json!({ "request": { "guid": "request@1" } }));
	driver.flush().await;
	let route = driver.root.object::<Route>("route@1").unwrap();

	let overrides = ContinueOptions::builder().post_data("hello world").build();
	let (result, call) = tokio::join!(route.continue_(Some(overrides)), driver.answer("continue", json!({})));
	result.unwrap();
	assert_eq!(
		call["params"],
		json!({
			"headers": [
				{ "name": "content-length", "value": "11" },
				{ "name": "content-type", "value": "text/plain" },
			],
			"postData": "aGVsbG8gd29ybGQ=",
		})
	);
}

#[tokio::test]
async fn test_fulfill_from_file() {
	let (mut driver, _page) = Driver::start_with_page().await;
	let route = intercept(&driver, 1, "https://example.com/data").await;

	let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
	file.write_all(br#"{"ok":true}"#).unwrap();

	let options = FulfillOptions::builder().status(201).path(file.path()).build();
	let (result, call) = tokio::join!(route.fulfill(options), driver.answer("fulfill", json!({})));
	result.unwrap();
	assert_eq!(call["params"]["status"], 201);
	assert_eq!(call["params"]["body"], "eyJvayI6dHJ1ZX0=");
	assert_eq!(
		call["params"]["headers"],
		json!([
			{ "name": "content-length", "value": "11" },
			{ "name": "content-type", "value": "application/json" },
		])
	);
}

#[tokio::test]
async fn test_invalid_fulfill_leaves_route_pending() {
	let (mut driver, _page) = Driver::start_with_page().await;
	let route = intercept(&driver, 1, "https://example.com/").await;

	let both = FulfillOptions::builder().body("inline").path("/tmp/also-a-file").build();
	assert!(matches!(route.fulfill(both).await, Err(Error::InvalidArgument(_))));

	let missing = FulfillOptions::builder().path("/definitely/not/here.html").build();
	assert!(matches!(route.fulfill(missing).await, Err(Error::Io(_))));
	assert_eq!(route.state(), RouteState::Pending);
	assert!(driver.pending_call().is_none());

	let (result, _) = tokio::join!(route.continue_(None), driver.answer("continue", json!({})));
	result.unwrap();
}

struct CountingNormalizer {
	calls: Arc<AtomicUsize>,
}

impl Normalizer for CountingNormalizer {
	fn normalize_continue(&self, options: ContinueOptions, _request_headers: Headers) -> NormalizeFuture<'_, NormalizedContinue> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		Box::pin(async move {
			Ok(NormalizedContinue {
				method: options.method,
				headers: Some(vec![HeaderEntry::new("x-normalized", "yes")]),
				post_data: None,
			})
		})
	}

	fn normalize_fulfill(&self, _options: FulfillOptions) -> NormalizeFuture<'_, NormalizedFulfill> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		Box::pin(async move {
			Ok(NormalizedFulfill {
				status: 418,
				headers: Vec::new(),
				body: b"teapot".to_vec(),
			})
		})
	}
}

#[tokio::test]
async fn test_actions_forward_normalizer_output() {
	let calls = Arc::new(AtomicUsize::new(0));
	let options = ProxyOptions::builder()
		.normalizer(CountingNormalizer { calls: Arc::clone(&calls) })
		.build();
	let mut driver = Driver::start_with(options).await;
	driver.open_page().await;

	let first = intercept(&driver, 1, "https://example.com/a").await;
	let (result, call) = tokio::join!(first.continue_(None), driver.answer("continue", json!({})));
	result.unwrap();
	assert_eq!(call["params"], json!({ "headers": [{ "name": "x-normalized", "value": "yes" }] }));

	let second = intercept(&driver, 2, "https://example.com/b").await;
	let (result, call) = tokio::join!(second.fulfill(FulfillOptions::default()), driver.answer("fulfill", json!({})));
	result.unwrap();
	assert_eq!(call["params"]["status"], 418);
	assert_eq!(call["params"]["body"], "dGVhcG90");

	assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_page_route_last_registered_handler_wins() {
	let (mut driver, page) = Driver::start_with_page().await;

	let (png, call) = tokio::join!(
		page.route("**/*.png", |route| async move { route.abort(None).await }),
		driver.answer("setNetworkInterceptionPatterns", json!({}))
	);
	let _png = png.unwrap();
	assert_eq!(call["guid"], PAGE);
	assert_eq!(call["params"], json!({ "patterns": [{ "glob": "**/*.png" }] }));

	let (all, call) = tokio::join!(
		page.route("**/api/**", |route| async move {
			route.fulfill(FulfillOptions::builder().body("[]").content_type("application/json").build()).await
		}),
		driver.answer("setNetworkInterceptionPatterns", json!({}))
	);
	let _all = all.unwrap();
	assert_eq!(call["params"]["patterns"], json!([{ "glob": "**/*.png" }, { "glob": "**/api/**" }]));

	intercept(&driver, 1, "https://example.com/img/logo.png").await;
	driver.event(PAGE, "route", json!({ "route": { "guid": "route@1" } }));
	let call = driver.answer("abort", json!({})).await;
	assert_eq!(call["guid"], "route@1");

	intercept(&driver, 2, "https://example.com/api/items").await;
	driver.event(PAGE, "route", json!({ "route": { "guid": "route@2" } }));
	let call = driver.answer("fulfill", json!({})).await;
	assert_eq!(call["guid"], "route@2");

	intercept(&driver, 3, "https://example.com/api/icon.png").await;
	driver.event(PAGE, "route", json!({ "route": { "guid": "route@3" } }));
	let call = driver.answer("fulfill", json!({})).await;
	assert_eq!(call["guid"], "route@3");
}

#[tokio::test]
async fn test_unmatched_route_is_continued() {
	let (mut driver, page) = Driver::start_with_page().await;

	let (sub, _) = tokio::join!(
		page.route("**/*.css", |route| async move { route.abort(None).await }),
		driver.answer("setNetworkInterceptionPatterns", json!({}))
	);
	let sub = sub.unwrap();

	let route = intercept(&driver, 1, "https://example.com/index.html").await;
	driver.event(PAGE, "route", json!({ "route": { "guid": "route@1" } }));
	let call = driver.answer("continue", json!({})).await;
	assert_eq!(call["guid"], "route@1");
	assert_eq!(call["params"], json!({}));
	driver.flush().await;
	assert_eq!(route.state(), RouteState::Continued);

	sub.unsubscribe();
	let call = driver.answer("setNetworkInterceptionPatterns", json!({})).await;
	assert_eq!(call["params"], json!({ "patterns": [] }));

	intercept(&driver, 2, "https://example.com/site.css").await;
	driver.event(PAGE, "route", json!({ "route": { "guid": "route@2" } }));
	driver.answer("continue", json!({})).await;
}

#[tokio::test]
async fn test_dropping_route_narrows_interception_patterns() {
	let (mut driver, page) = Driver::start_with_page().await;

	let (images, _) = tokio::join!(
		page.route("**/*.png", |route| async move { route.abort(None).await }),
		driver.answer("setNetworkInterceptionPatterns", json!({}))
	);
	let (api, _) = tokio::join!(
		page.route("**/api/**", |route| async move { route.continue_(None).await }),
		driver.answer("setNetworkInterceptionPatterns", json!({}))
	);
	let api = api.unwrap();

	drop(images.unwrap());
	let call = driver.answer("setNetworkInterceptionPatterns", json!({})).await;
	assert_eq!(call["guid"], PAGE);
	assert_eq!(call["params"], json!({ "patterns": [{ "glob": "**/api/**" }] }));

	api.unsubscribe();
	let call = driver.answer("setNetworkInterceptionPatterns", json!({})).await;
	assert_eq!(call["params"], json!({ "patterns": [] }));
	assert!(driver.pending_call().is_none());
}
