//! Black-box causal-order delivery: a run of messages from one originator
//! must come out the other end in the order they were sent.

mod common;

use destinator::core::packet::MessageType;
use destinator::PeerBuilder;
use std::time::Duration;

#[tokio::test]
async fn messages_from_one_originator_are_delivered_in_the_order_sent() {
    let config = common::test_config(2);

    let leader = PeerBuilder::new(config.clone()).set_leader(true).start().await.unwrap();
    let mut follower = PeerBuilder::new(config).set_leader(false).start().await.unwrap();

    common::settle(1).await;

    for v in [1, 2, 3] {
        leader.send(MessageType::Temperature, serde_json::json!(v));
    }

    let mut seen = Vec::new();
    for _ in 0..3 {
        let delivered = tokio::time::timeout(Duration::from_secs(3), follower.deliver_channel().recv())
            .await
            .expect("timed out waiting for delivery")
            .expect("delivery channel closed");
        seen.push(delivered);
    }

    assert_eq!(seen, vec![serde_json::json!(1), serde_json::json!(2), serde_json::json!(3)]);
}
