// Scripted stand-in for the remote driver.
//
// Tests create objects and push events through `Driver`, then answer the
// calls the proxies make. `flush()` waits until every message sent so far
// has been dispatched.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use pw_net::{Connection, Page, ProxyOptions, RemoteEnd, Request, Root, UnknownObject};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

pub const CONTEXT: &str = "browser-context@1";
pub const PAGE: &str = "page@1";
pub const FRAME: &str = "frame@1";

const CALL_TIMEOUT: Duration = Duration::from_secs(2);

pub struct Driver {
	pub connection: Arc<Connection>,
	pub root: Root,
	remote: RemoteEnd,
	barriers: AtomicU32,
}

fn init_logging() {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
	let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
}

impl Driver {
	pub async fn start() -> Self {
		Self::start_with(ProxyOptions::default()).await
	}

	pub async fn start_with(options: ProxyOptions) -> Self {
		init_logging();

		let (parts, remote) = pw_net::pipe();
		let connection = Arc::new(Connection::new(parts));
		let root = pw_net::attach(&connection, options).await;

		let runner = Arc::clone(&connection);
		tokio::spawn(async move { runner.run().await });

		Self {
			connection,
			root,
			remote,
			barriers: AtomicU32::new(0),
		}
	}

	/// Context, page and main frame, in the order the driver announces them.
	pub async fn start_with_page() -> (Self, Page) {
		let driver = Self::start().await;
		let page = driver.open_page().await;
		(driver, page)
	}

	pub async fn open_page(&self) -> Page {
		self.create("", "BrowserContext", CONTEXT, json!({}));
		self.create(CONTEXT, "Page", PAGE, json!({ "mainFrame": { "guid": FRAME } }));
		self.create(PAGE, "Frame", FRAME, json!({ "url": "about:blank", "name": "" }));
		self.flush().await;
		self.root.object::<Page>(PAGE).expect("page registered")
	}

	pub fn create(&self, parent: &str, type_name: &str, guid: &str, initializer: Value) {
		self.send(json!({
			"guid": parent,
			"method": "__create__",
			"params": { "type": type_name, "guid": guid, "initializer": initializer },
		}));
	}

	pub fn event(&self, guid: &str, method: &str, params: Value) {
		self.send(json!({ "guid": guid, "method": method, "params": params }));
	}

	pub fn dispose(&self, guid: &str) {
		self.send(json!({ "guid": guid, "method": "__dispose__", "params": {} }));
	}

	/// Creates a GET request issued by the main frame.
	pub async fn request(&self, guid: &str, url: &str, extra: Value) -> Request {
		let mut init = json!({
			"url": url,
			"method": "GET",
			"resourceType": "document",
			"headers": [],
			"frame": { "guid": FRAME },
			"isNavigationRequest": true,
		});
		if let (Some(init), Value::Object(extra)) = (init.as_object_mut(), extra) {
			init.extend(extra);
		}
		self.create(FRAME, "Request", guid, init);
		self.flush().await;
		self.root.object::<Request>(guid).expect("request registered")
	}

	/// Waits until everything sent so far has been dispatched.
	pub async fn flush(&self) {
		let guid = format!("barrier@{}", self.barriers.fetch_add(1, Ordering::SeqCst));
		self.create("", "Barrier", &guid, json!({}));
		self.root
			.wait_for::<UnknownObject>(&guid, CALL_TIMEOUT)
			.await
			.expect("barrier object created");
	}

	pub async fn next_call(&mut self) -> Value {
		tokio::time::timeout(CALL_TIMEOUT, self.remote.recv())
			.await
			.expect("timed out waiting for a call")
			.expect("connection dropped")
	}

	/// Returns a call if one is already queued.
	pub fn pending_call(&mut self) -> Option<Value> {
		self.remote.try_recv()
	}

	pub fn respond(&self, id: &Value, result: Value) {
		self.send(json!({ "id": id, "result": result }));
	}

	pub fn fail(&self, id: &Value, name: &str, message: &str) {
		self.send(json!({ "id": id, "error": { "error": { "name": name, "message": message } } }));
	}

	/// Takes the next call, checks its method and answers it. Returns the call.
	pub async fn answer(&mut self, method: &str, result: Value) -> Value {
		let call = self.next_call().await;
		assert_eq!(call["method"], method, "unexpected call: {call}");
		self.respond(&call["id"], result);
		call
	}

	/// Drops the remote end, which ends the connection's run loop.
	pub fn hang_up(self) -> Arc<Connection> {
		self.connection
	}

	fn send(&self, message: Value) {
		self.remote.send(message).expect("connection accepting messages");
	}
}
