use std::time::Instant;
use tickflow::stream::pipeline::{RingBuffer, DEFAULT_CAPACITY};
use tickflow::stream::types::Tick;
use tickflow::PipelineError;

fn tick(bid: f64) -> Tick {
    Tick::now(bid, bid + 0.02, 10)
}

#[test]
fn test_ring_creation() {
    let ring = RingBuffer::<Tick>::new();
    assert_eq!(ring.capacity(), DEFAULT_CAPACITY);

    let monitor = ring.monitor();
    assert_eq!(monitor.usable_capacity(), DEFAULT_CAPACITY - 1);
    assert_eq!(monitor.len(), 0);
    assert!(monitor.is_empty());
}

#[test]
fn test_capacity_below_two_is_rejected() {
    assert!(matches!(
        RingBuffer::<Tick>::with_capacity(0),
        Err(PipelineError::InvalidCapacity(0))
    ));
    assert!(matches!(
        RingBuffer::<Tick>::with_capacity(1),
        Err(PipelineError::InvalidCapacity(1))
    ));
    assert!(RingBuffer::<Tick>::with_capacity(2).is_ok());
}

#[test]
fn test_push_and_pop() {
    let (mut tx, mut rx) = RingBuffer::with_capacity(8).unwrap().split();
    let timestamp = Instant::now();
    let sent = Tick::new(99.99, 100.01, 7, timestamp);

    assert!(tx.push(sent));
    assert_eq!(tx.len(), 1);

    let received = rx.pop().unwrap();
    assert_eq!(received, sent);
    assert_eq!(received.timestamp, timestamp);
    assert!(rx.pop().is_none());
    assert!(rx.is_empty());
}

#[test]
fn test_capacity_four_holds_three() {
    let (mut tx, mut rx) = RingBuffer::with_capacity(4).unwrap().split();

    assert!(tx.push(tick(1.0)));
    assert!(tx.push(tick(2.0)));
    assert!(tx.push(tick(3.0)));
    assert!(tx.is_full());

    // Fourth push is refused and the ring is unchanged
    assert!(!tx.push(tick(4.0)));
    assert_eq!(tx.len(), 3);

    assert_eq!(rx.pop().unwrap().bid, 1.0);
    assert!(tx.push(tick(4.0)));

    let rest: Vec<f64> = std::iter::from_fn(|| rx.pop()).map(|t| t.bid).collect();
    assert_eq!(rest, vec![2.0, 3.0, 4.0]);
}

#[test]
fn test_capacity_two_alternates() {
    let (mut tx, mut rx) = RingBuffer::with_capacity(2).unwrap().split();

    for i in 0..100 {
        assert!(tx.push(tick(i as f64)));
        assert!(!tx.push(tick(-1.0)));
        assert_eq!(rx.pop().unwrap().bid, i as f64);
        assert!(rx.pop().is_none());
    }
}

#[test]
fn test_indices_wrap_many_times() {
    let (mut tx, mut rx) = RingBuffer::with_capacity(5).unwrap().split();

    for round in 0..1000u32 {
        for i in 0..3 {
            assert!(tx.push(tick(f64::from(round * 3 + i))));
        }
        for i in 0..3 {
            assert_eq!(rx.pop().unwrap().bid, f64::from(round * 3 + i));
        }
    }
    assert!(rx.is_empty());
}

#[test]
fn test_metrics() {
    let ring = RingBuffer::with_capacity(4).unwrap();
    let monitor = ring.monitor();
    let (mut tx, mut rx) = ring.split();

    for i in 0..5 {
        tx.push(tick(i as f64));
    }
    rx.pop();

    let metrics = monitor.metrics();
    assert_eq!(metrics.pushed, 3);
    assert_eq!(metrics.rejected, 2);
    assert_eq!(metrics.popped, 1);
    assert_eq!(metrics.depth, 2);
    assert_eq!(metrics.capacity, 4);
    assert!((metrics.reject_rate() - 40.0).abs() < 1e-9);
    assert!(metrics.is_backpressure());
}

#[test]
fn test_monitor_outlives_handles() {
    let ring = RingBuffer::with_capacity(8).unwrap();
    let monitor = ring.monitor();
    {
        let (mut tx, _rx) = ring.split();
        tx.push(tick(1.0));
        tx.push(tick(2.0));
    }
    assert_eq!(monitor.len(), 2);
    assert_eq!(monitor.metrics().pushed, 2);
}
