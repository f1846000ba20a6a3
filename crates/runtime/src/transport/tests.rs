use serde_json::json;

use super::*;

#[tokio::test]
async fn test_messages_cross_the_pipe_in_order() {
	let (mut parts, mut remote) = pipe();

	parts.outbound.send(json!({"id": 0, "method": "body"})).unwrap();
	parts.outbound.send(json!({"id": 1, "method": "finished"})).unwrap();

	assert_eq!(remote.recv().await.unwrap()["id"], 0);
	assert_eq!(remote.recv().await.unwrap()["id"], 1);

	remote.send(json!({"id": 1, "result": {}})).unwrap();
	remote.send(json!({"id": 0, "result": {"binary": ""}})).unwrap();

	assert_eq!(parts.inbound.recv().await.unwrap()["id"], 1);
	assert_eq!(parts.inbound.recv().await.unwrap()["id"], 0);
}

#[tokio::test]
async fn test_dropping_remote_end_closes_inbound() {
	let (mut parts, remote) = pipe();
	drop(remote);

	assert!(parts.inbound.recv().await.is_none());
	assert!(parts.outbound.send(json!({})).is_err());
}

#[tokio::test]
async fn test_remote_send_fails_after_local_side_dropped() {
	let (parts, mut remote) = pipe();
	drop(parts);

	assert!(matches!(remote.send(json!({})), Err(Error::ChannelClosed)));
	assert!(remote.recv().await.is_none());
	assert!(remote.try_recv().is_none());
}
