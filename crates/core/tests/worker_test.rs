// Worker lifecycle and evaluation against a scripted driver.

mod common;

use std::time::Duration;

use common::{CONTEXT, Driver, PAGE};
use pw_net::{BrowserContext, ChannelOwner, Error, JsHandle, Worker, WorkerClosed};
use serde::Deserialize;
use serde_json::{Value, json};

async fn spawn_worker(driver: &Driver, owner: &str, announce: &str, guid: &str, url: &str) -> Worker {
	driver.create(owner, "Worker", guid, json!({ "url": url }));
	driver.event(owner, announce, json!({ "worker": { "guid": guid } }));
	driver.flush().await;
	driver.root.object::<Worker>(guid).expect("worker registered")
}

#[tokio::test]
async fn test_duplicate_close_removes_and_emits_once() {
	let (driver, page) = Driver::start_with_page().await;
	let worker = spawn_worker(&driver, PAGE, "worker", "worker@1", "https://example.com/worker.js").await;

	assert_eq!(page.workers().len(), 1);
	assert_eq!(worker.page().map(|p| p.guid().to_string()).as_deref(), Some(PAGE));
	assert!(worker.context().is_none());

	let mut closes = worker.close_events();
	let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
	let _sub = worker.on_close(move |event| {
		let tx = tx.clone();
		async move {
			let _ = tx.send(event);
			Ok::<_, Error>(())
		}
	});

	driver.event("worker@1", "close", json!({}));
	driver.event("worker@1", "close", json!({}));
	driver.flush().await;

	assert!(worker.is_closed());
	assert!(page.workers().is_empty());
	assert!(!page.remove_worker("worker@1"));

	let expected = WorkerClosed {
		guid: "worker@1".into(),
		url: "https://example.com/worker.js".to_string(),
	};
	assert_eq!(closes.try_recv(), Some(expected.clone()));
	assert_eq!(closes.try_recv(), None);

	let handled = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
	assert_eq!(handled, Some(expected));
	tokio::time::sleep(Duration::from_millis(50)).await;
	assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_close_only_touches_own_collection() {
	let (driver, page) = Driver::start_with_page().await;
	let context = driver.root.object::<BrowserContext>(CONTEXT).unwrap();

	let web = spawn_worker(&driver, PAGE, "worker", "worker@web", "https://example.com/w.js").await;
	let service = spawn_worker(&driver, CONTEXT, "serviceWorker", "worker@sw", "https://example.com/sw.js").await;

	assert_eq!(service.context().map(|c| c.guid().to_string()).as_deref(), Some(CONTEXT));
	assert!(service.page().is_none());
	assert_eq!(context.service_workers().len(), 1);
	assert_eq!(context.pages().len(), 1);

	driver.event("worker@sw", "close", json!({}));
	driver.flush().await;

	assert!(context.service_workers().is_empty());
	assert_eq!(page.workers().len(), 1);
	assert_eq!(page.workers()[0].guid(), web.guid());
	assert!(!web.is_closed());
}

#[tokio::test]
async fn test_unannounced_worker_still_notifies_on_close() {
	let (driver, _page) = Driver::start_with_page().await;
	driver.create(PAGE, "Worker", "worker@1", json!({ "url": "blob:worker" }));
	driver.flush().await;
	let worker = driver.root.object::<Worker>("worker@1").unwrap();
	assert!(worker.page().is_none());

	let mut closes = worker.close_events();
	driver.event("worker@1", "close", json!({}));
	driver.flush().await;

	assert_eq!(closes.try_recv().map(|e| e.url), Some("blob:worker".to_string()));
}

#[tokio::test]
async fn test_worker_closed_before_announcement_is_not_listed() {
	let (driver, page) = Driver::start_with_page().await;
	let context = driver.root.object::<BrowserContext>(CONTEXT).unwrap();
	let mut spawned = page.worker_events();
	let mut registered = context.service_worker_events();

	driver.create(PAGE, "Worker", "worker@web", json!({ "url": "https://example.com/w.js" }));
	driver.create(CONTEXT, "Worker", "worker@sw", json!({ "url": "https://example.com/sw.js" }));
	driver.event("worker@web", "close", json!({}));
	driver.event("worker@sw", "close", json!({}));
	driver.event(PAGE, "worker", json!({ "worker": { "guid": "worker@web" } }));
	driver.event(CONTEXT, "serviceWorker", json!({ "worker": { "guid": "worker@sw" } }));
	driver.flush().await;

	assert!(page.workers().is_empty());
	assert!(context.service_workers().is_empty());
	assert!(spawned.try_recv().is_none());
	assert!(registered.try_recv().is_none());
}

#[tokio::test]
async fn test_evaluate_after_close_fails_locally() {
	let (mut driver, _page) = Driver::start_with_page().await;
	let worker = spawn_worker(&driver, PAGE, "worker", "worker@1", "https://example.com/w.js").await;

	driver.event("worker@1", "close", json!({}));
	driver.flush().await;

	let err = worker.evaluate_value("1 + 1", ()).await.unwrap_err();
	assert!(err.is_target_closed());
	assert!(matches!(err, Error::TargetClosed { target_type: "worker", .. }));

	let err = worker.evaluate_handle("() => self", ()).await.unwrap_err();
	assert!(matches!(err, Error::TargetClosed { operation: "evaluate_handle", .. }));
	assert!(driver.pending_call().is_none());
}

#[tokio::test]
async fn test_worker_spawn_notifications() {
	let (driver, page) = Driver::start_with_page().await;
	let mut spawned = page.worker_events();
	let waiter = page.expect_worker(|w| w.url().ends_with("second.js"), Duration::from_secs(1));

	spawn_worker(&driver, PAGE, "worker", "worker@1", "https://example.com/first.js").await;
	spawn_worker(&driver, PAGE, "worker", "worker@2", "https://example.com/second.js").await;

	assert_eq!(spawned.recv().await.map(|w| w.url().to_string()).as_deref(), Some("https://example.com/first.js"));
	assert_eq!(spawned.recv().await.map(|w| w.url().to_string()).as_deref(), Some("https://example.com/second.js"));
	assert_eq!(waiter.wait().await.unwrap().guid(), "worker@2");

	let urls: Vec<_> = page.workers().iter().map(|w| w.url().to_string()).collect();
	assert_eq!(urls, ["https://example.com/first.js", "https://example.com/second.js"]);
}

#[tokio::test]
async fn test_wait_for_close() {
	let (driver, _page) = Driver::start_with_page().await;
	let worker = spawn_worker(&driver, PAGE, "worker", "worker@1", "https://example.com/w.js").await;

	let err = worker.wait_for_close(Duration::from_millis(20)).await.unwrap_err();
	assert!(err.is_timeout());

	let (closed, _) = tokio::join!(worker.wait_for_close(Duration::from_secs(1)), async {
		driver.event("worker@1", "close", json!({}));
	});
	assert_eq!(&*closed.unwrap().guid, "worker@1");

	let again = worker.wait_for_close(Duration::from_millis(20)).await.unwrap();
	assert_eq!(again.url, "https://example.com/w.js");
}

#[tokio::test]
async fn test_evaluate_sends_expression_and_argument() {
	let (mut driver, _page) = Driver::start_with_page().await;
	let worker = spawn_worker(&driver, PAGE, "worker", "worker@1", "https://example.com/w.js").await;

	let (result, call) = tokio::join!(
		worker.evaluate::<i64>("x => x * 2", 21),
		driver.answer("evaluateExpression", json!({ "value": { "n": 42 } }))
	);
	assert_eq!(result.unwrap(), 42);
	assert_eq!(call["guid"], "worker@1");
	assert_eq!(
		call["params"],
		json!({
			"expression": "x => x * 2",
			"isFunction": true,
			"arg": { "value": { "n": 21 }, "handles": [] },
		})
	);

	let (result, call) = tokio::join!(
		worker.evaluate_value("self.location.href", ()),
		driver.answer("evaluateExpression", json!({ "value": { "s": "https://example.com/w.js" } }))
	);
	assert_eq!(result.unwrap(), json!("https://example.com/w.js"));
	assert_eq!(call["params"]["isFunction"], false);
}

#[tokio::test]
async fn test_evaluate_into_struct() {
	#[derive(Debug, Deserialize, PartialEq)]
	struct Stats {
		count: u32,
		ready: bool,
	}

	let (mut driver, _page) = Driver::start_with_page().await;
	let worker = spawn_worker(&driver, PAGE, "worker", "worker@1", "https://example.com/w.js").await;

	let tagged = json!({ "value": { "o": [
		{ "k": "count", "v": { "n": 3 } },
		{ "k": "ready", "v": { "b": true } },
	] } });
	let (result, _) = tokio::join!(
		worker.evaluate::<Stats>("() => ({ count: 3, ready: true })", ()),
		driver.answer("evaluateExpression", tagged)
	);
	assert_eq!(result.unwrap(), Stats { count: 3, ready: true });

	let (result, _) = tokio::join!(
		worker.evaluate::<Stats>("() => 'nope'", ()),
		driver.answer("evaluateExpression", json!({ "value": { "s": "nope" } }))
	);
	assert!(matches!(result, Err(Error::Evaluation(_))));
}

#[tokio::test]
async fn test_evaluate_surfaces_remote_exception() {
	let (mut driver, _page) = Driver::start_with_page().await;
	let worker = spawn_worker(&driver, PAGE, "worker", "worker@1", "https://example.com/w.js").await;

	let (result, _) = tokio::join!(worker.evaluate_value("() => { throw new Error('boom') }", ()), async {
		let call = driver.next_call().await;
		driver.fail(&call["id"], "Error", "boom");
	});
	let err = result.unwrap_err();
	assert!(err.is_remote());
	assert_eq!(err.to_string(), "Error: boom");
}

#[tokio::test]
async fn test_evaluate_handle_wraps_remote_value() {
	let (mut driver, _page) = Driver::start_with_page().await;
	let worker = spawn_worker(&driver, PAGE, "worker", "worker@1", "https://example.com/w.js").await;

	let (handle, call) = tokio::join!(worker.evaluate_handle("() => self", ()), async {
		let call = driver.next_call().await;
		driver.create("worker@1", "JSHandle", "handle@1", json!({ "preview": "DedicatedWorkerGlobalScope" }));
		driver.respond(&call["id"], json!({ "handle": { "guid": "handle@1" } }));
		call
	});
	assert_eq!(call["method"], "evaluateExpressionHandle");
	let handle: JsHandle = handle.unwrap();
	assert_eq!(handle.guid(), "handle@1");
	assert_eq!(handle.preview(), "DedicatedWorkerGlobalScope");

	driver.event("handle@1", "previewUpdated", json!({ "preview": "Object" }));
	driver.flush().await;
	assert_eq!(handle.preview(), "Object");

	let (value, _) = tokio::join!(
		handle.json_value::<Value>(),
		driver.answer("jsonValue", json!({ "value": { "o": [{ "k": "a", "v": { "n": 1 } }] } }))
	);
	assert_eq!(value.unwrap(), json!({ "a": 1 }));

	let (disposed, _) = tokio::join!(handle.dispose(), driver.answer("dispose", json!({})));
	disposed.unwrap();
}
