use crate::*;

// ══════════════════════════════════════════════════════════════════════════════
//  Happy path
// ══════════════════════════════════════════════════════════════════════════════

/// The reference scenario: node 7, sequence 42, fresh receiver.
#[tokio::test]
async fn test_reference_frame_is_acked_and_stored() -> Result<()> {
    let receiver = Receiver::start().await?;
    let node = Node::new(7, receiver.addr).await?;

    let frame = TelemetryFrame {
        node_id: 7,
        msg_type: 1,
        sequence: 42,
        timestamp: 1_700_000_000,
        wind_avg_tenths: 125,
        wind_gust_tenths: 210,
        direction_degrees: 180,
        battery_millivolts: 3700,
        flags: 0,
    };
    node.send_raw(&frame.encode()).await?;

    let ack = node.expect_ack().await?;
    assert_eq!(
        ack,
        AckFrame {
            node_id: 7,
            last_sequence: 42
        }
    );

    wait_for(ACK_WAIT, || receiver.sink.len() == 1).await?;
    let record = &receiver.sink.records()[0];
    assert_eq!(record.node_id, 7);
    assert_eq!(record.sequence, 42);
    assert_eq!(record.timestamp, 1_700_000_000);
    assert_eq!(record.wind_avg(), 12.5);
    assert_eq!(record.wind_gust(), 21.0);
    assert_eq!(record.direction_degrees, 180);
    assert_eq!(record.battery_millivolts, 3700);
    assert_eq!(record.msg_type, 1);

    receiver.stop().await
}

/// The raw reply bytes match the documented 8-byte layout.
#[tokio::test]
async fn test_ack_wire_bytes() -> Result<()> {
    let receiver = Receiver::start().await?;
    let node = Node::new(7, receiver.addr).await?;

    node.send_raw(&node.sample(42).encode()).await?;
    let reply = node.recv_raw().await?;

    assert_eq!(reply, [0x07, 0x64, 0x00, 0x00, 0x00, 0x2a, 0xd3, 0xa3]);
    receiver.stop().await
}

/// A node reporting steadily gets each sequence acked in turn.
#[tokio::test]
async fn test_steady_reporting() -> Result<()> {
    let receiver = Receiver::start().await?;
    let node = Node::new(3, receiver.addr).await?;

    for seq in 1..=20 {
        let ack = node.report(seq).await?;
        assert_eq!(ack.node_id, 3);
        assert_eq!(ack.last_sequence, seq);
    }

    assert_eq!(receiver.tracker.last_sequence(3), Some(20));
    wait_for(ACK_WAIT, || receiver.sink.len() == 20).await?;
    let stats = receiver.stats.snapshot();
    assert_eq!(stats.accepted, 20);
    assert_eq!(stats.acks_sent, 20);

    receiver.stop().await
}

/// Several nodes share one receiver; acks go back to the right sender.
#[tokio::test]
async fn test_many_nodes_concurrently() -> Result<()> {
    let receiver = Receiver::start().await?;
    let addr = receiver.addr;

    let mut tasks = Vec::new();
    for id in 1..=8u8 {
        tasks.push(tokio::spawn(async move {
            let node = Node::new(id, addr).await?;
            for seq in 1..=10 {
                let ack = node.report(seq * u32::from(id)).await?;
                anyhow::ensure!(ack.node_id == id, "ack for wrong node");
                anyhow::ensure!(ack.last_sequence == seq * u32::from(id));
            }
            Ok::<_, anyhow::Error>(())
        }));
    }
    for task in tasks {
        task.await??;
    }

    let snapshot = receiver.tracker.snapshot();
    assert_eq!(snapshot.len(), 8);
    for id in 1..=8u8 {
        assert_eq!(snapshot[&id], 10 * u32::from(id));
    }

    receiver.stop().await
}

/// Sink failure does not stop the ack, and the loop keeps going afterwards.
#[tokio::test]
async fn test_sink_outage_still_acks() -> Result<()> {
    let receiver = Receiver::start().await?;
    let node = Node::new(9, receiver.addr).await?;

    receiver.sink.set_failing(true);
    assert_eq!(node.report(1).await?.last_sequence, 1);
    assert_eq!(node.report(2).await?.last_sequence, 2);
    assert!(receiver.sink.is_empty());

    receiver.sink.set_failing(false);
    assert_eq!(node.report(3).await?.last_sequence, 3);
    wait_for(ACK_WAIT, || receiver.sink.len() == 1).await?;
    assert_eq!(receiver.stats.snapshot().sink_failures, 2);

    receiver.stop().await
}
