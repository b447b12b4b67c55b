/// Stress tests for the SPSC ring under real cross-thread contention.
///
/// Every test runs a producer and consumer on separate threads and checks
/// that each pushed tick is popped exactly once and in push order.

use std::thread;
use std::time::{Duration, Instant};
use tickflow::stream::pipeline::RingBuffer;
use tickflow::stream::types::Tick;

/// Encode a sequence number in the bid so order can be checked on the far side
fn numbered(seq: u64) -> Tick {
    Tick::now(seq as f64, seq as f64 + 0.02, 1)
}

fn run_transfer(capacity: usize, total: u64) -> Vec<u64> {
    let (mut tx, mut rx) = RingBuffer::with_capacity(capacity).unwrap().split();

    let producer = thread::spawn(move || {
        for seq in 0..total {
            while !tx.push(numbered(seq)) {
                std::hint::spin_loop();
            }
        }
    });

    let consumer = thread::spawn(move || {
        let mut received = Vec::with_capacity(total as usize);
        let deadline = Instant::now() + Duration::from_secs(30);
        while (received.len() as u64) < total {
            match rx.pop() {
                Some(tick) => received.push(tick.bid as u64),
                None => {
                    assert!(Instant::now() < deadline, "consumer starved");
                    std::hint::spin_loop();
                }
            }
        }
        assert!(rx.pop().is_none());
        received
    });

    producer.join().unwrap();
    consumer.join().unwrap()
}

#[test]
fn test_tiny_ring_preserves_order() {
    // Capacity 4 forces the producer to hit "full" constantly
    let total = 200_000;
    let received = run_transfer(4, total);
    assert_eq!(received.len() as u64, total);
    assert!(received.iter().enumerate().all(|(i, seq)| *seq == i as u64));
}

#[test]
fn test_minimum_ring_preserves_order() {
    let total = 50_000;
    let received = run_transfer(2, total);
    assert!(received.iter().copied().eq(0..total));
}

#[test]
fn test_default_ring_throughput() {
    let total = 1_000_000;
    let start = Instant::now();
    let received = run_transfer(2048, total);
    let elapsed = start.elapsed();

    assert!(received.iter().copied().eq(0..total));
    println!(
        "Transferred {} ticks in {:?} ({:.0} ticks/sec)",
        total,
        elapsed,
        total as f64 / elapsed.as_secs_f64()
    );
}

#[test]
fn test_payload_is_never_torn() {
    let (mut tx, mut rx) = RingBuffer::with_capacity(8).unwrap().split();
    let total = 100_000u32;

    let producer = thread::spawn(move || {
        for i in 0..total {
            let bid = f64::from(i);
            // ask and volume are derived from bid so a torn read is detectable
            let tick = Tick::now(bid, bid * 2.0 + 1.0, i);
            while !tx.push(tick) {
                std::hint::spin_loop();
            }
        }
    });

    let mut seen = 0u32;
    while seen < total {
        if let Some(tick) = rx.pop() {
            assert_eq!(tick.ask, tick.bid * 2.0 + 1.0);
            assert_eq!(tick.volume, tick.bid as u32);
            seen += 1;
        }
    }
    producer.join().unwrap();
}
