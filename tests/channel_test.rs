//! Channel adapter: ordering, overflow policies, close propagation.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};

use carillon::{ChannelOptions, OverflowPolicy, chime_ch, times};

#[tokio::test(flavor = "multi_thread")]
async fn chimes_arrive_in_order_then_channel_closes() {
    let start = Utc::now();
    let expected = vec![
        start + Duration::milliseconds(100),
        start + Duration::milliseconds(200),
        start + Duration::milliseconds(300),
    ];

    let receiver = chime_ch(expected.clone(), ChannelOptions::default());

    let mut received = Vec::new();
    while let Some(t) = receiver.recv().await {
        received.push(t);
    }
    assert_eq!(received, expected);

    // The schedule exhausted, which closed the read end.
    assert!(receiver.handle().is_finished());
}

#[tokio::test(flavor = "multi_thread")]
async fn closing_receiver_closes_schedule() {
    let receiver = chime_ch(
        times::periodic(
            Utc::now() + Duration::milliseconds(100),
            Duration::milliseconds(100),
        ),
        ChannelOptions::default(),
    );

    let first = receiver.recv().await;
    assert!(first.is_some());

    receiver.close();
    assert!(
        receiver
            .handle()
            .wait_timeout(StdDuration::from_secs(5))
            .await
    );

    // Drains whatever was buffered, then reports closed.
    while receiver.recv().await.is_some() {}
}

#[tokio::test(flavor = "multi_thread")]
async fn block_policy_applies_backpressure() {
    let start = Utc::now();
    // All in the past: push-forward fires them back to back.
    let expected: Vec<DateTime<Utc>> = (1..=5)
        .map(|i| start - Duration::milliseconds(600 - i * 100))
        .collect();

    let receiver = chime_ch(
        expected.clone(),
        ChannelOptions {
            buffer: 1,
            policy: OverflowPolicy::Block,
            ..Default::default()
        },
    );

    // A slow consumer still sees every chime, in order.
    let mut received = Vec::new();
    while let Some(t) = receiver.recv().await {
        received.push(t);
        tokio::time::sleep(StdDuration::from_millis(50)).await;
    }
    assert_eq!(received, expected);
}

#[tokio::test(flavor = "multi_thread")]
async fn drop_newest_policy_keeps_earliest() {
    let start = Utc::now();
    let all: Vec<DateTime<Utc>> = (1..=5)
        .map(|i| start - Duration::milliseconds(600 - i * 100))
        .collect();

    let receiver = chime_ch(
        all.clone(),
        ChannelOptions {
            buffer: 1,
            policy: OverflowPolicy::DropNewest,
            ..Default::default()
        },
    );

    // Let the whole burst fire before consuming anything.
    assert!(
        receiver
            .handle()
            .wait_timeout(StdDuration::from_secs(5))
            .await
    );

    let mut received = Vec::new();
    while let Some(t) = receiver.recv().await {
        received.push(t);
    }
    assert_eq!(received, vec![all[0]]);
}

#[tokio::test(flavor = "multi_thread")]
async fn sliding_policy_keeps_latest() {
    let start = Utc::now();
    let all: Vec<DateTime<Utc>> = (1..=5)
        .map(|i| start - Duration::milliseconds(600 - i * 100))
        .collect();

    let receiver = chime_ch(
        all.clone(),
        ChannelOptions {
            buffer: 1,
            policy: OverflowPolicy::Sliding,
            ..Default::default()
        },
    );

    assert!(
        receiver
            .handle()
            .wait_timeout(StdDuration::from_secs(5))
            .await
    );

    let mut received = Vec::new();
    while let Some(t) = receiver.recv().await {
        received.push(t);
    }
    assert_eq!(received, vec![all[4]]);
}

#[tokio::test(flavor = "multi_thread")]
async fn on_finished_runs_before_read_end_closes() {
    let (flag_tx, flag_rx) = std::sync::mpsc::channel();

    let receiver = chime_ch(
        vec![Utc::now() + Duration::milliseconds(100)],
        ChannelOptions {
            on_finished: Some(Box::new(move || {
                let _ = flag_tx.send(());
            })),
            ..Default::default()
        },
    );

    assert!(receiver.recv().await.is_some());
    assert!(receiver.recv().await.is_none());
    flag_rx
        .recv_timeout(StdDuration::from_secs(1))
        .expect("on_finished should have run");
}

#[tokio::test(flavor = "multi_thread")]
async fn drop_overruns_passes_through() {
    let start = Utc::now();
    let times = vec![start - Duration::seconds(5), start + Duration::milliseconds(200)];

    let receiver = chime_ch(
        times.clone(),
        ChannelOptions {
            drop_overruns: true,
            ..Default::default()
        },
    );

    let mut received = Vec::new();
    while let Some(t) = receiver.recv().await {
        received.push(t);
    }
    assert_eq!(received, vec![times[1]]);
}
