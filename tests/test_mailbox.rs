// tests/test_mailbox.rs — Integration tests for the single-slot frame mailbox.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use common::frame;
use lumaview::{Frame, Mailbox};

// ===== Single-threaded contract =====

#[test]
fn publish_then_take_returns_frame_once() {
    let mailbox = Mailbox::new();
    mailbox.publish(frame(640, 480, 1));

    let taken = mailbox.take().expect("published frame must be taken");
    assert_eq!(taken.size(), (640, 480));
    assert_eq!(taken.data()[0], 1);

    assert!(mailbox.take().is_none());
    assert!(mailbox.is_empty());
}

#[test]
fn newest_publish_wins() {
    let mailbox = Mailbox::new();
    mailbox.publish(frame(4, 4, 0xA));
    mailbox.publish(frame(4, 4, 0xB));

    assert_eq!(mailbox.take().unwrap().data()[0], 0xB);
    assert!(mailbox.take().is_none(), "A must never be observed");
}

#[test]
fn take_after_n_publishes_returns_the_last() {
    let mailbox = Mailbox::new();
    for i in 0..=100u8 {
        mailbox.publish(frame(2, 2, i));
    }

    assert_eq!(mailbox.take().unwrap().data()[0], 100);
    assert!(mailbox.take().is_none());

    let stats = mailbox.stats();
    assert_eq!(stats.published, 101);
    assert_eq!(stats.overwritten, 100);
    assert_eq!(stats.taken, 1);
}

#[test]
fn empty_take_is_a_normal_value() {
    let mailbox = Mailbox::new();
    for _ in 0..1_000 {
        assert!(mailbox.take().is_none());
    }
    assert_eq!(mailbox.stats().taken, 0);
}

#[test]
fn publish_never_waits_for_a_consumer() {
    // Nobody ever takes; every publish must still return.
    let mailbox = Mailbox::new();
    for i in 0..10_000u32 {
        mailbox.publish(frame(2, 2, i as u8));
    }
    assert!(!mailbox.is_empty());
}

#[test]
fn mailbox_stays_empty_until_next_publish() {
    let mailbox = Mailbox::new();
    mailbox.publish(frame(2, 2, 1));
    mailbox.take();

    assert!(mailbox.is_empty());
    mailbox.publish(frame(2, 2, 2));
    assert!(!mailbox.is_empty());
}

// ===== Concurrent producer / consumer =====

fn numbered(seq: u32) -> Frame {
    Frame::new(seq.to_le_bytes().to_vec(), 2, 2).unwrap()
}

fn number_of(frame: &Frame) -> u32 {
    u32::from_le_bytes(frame.data().try_into().unwrap())
}

#[test]
fn concurrent_publish_take_never_reorders_or_duplicates() {
    const OPS: u32 = 10_000;

    let mailbox = Arc::new(Mailbox::new());
    let done = Arc::new(AtomicBool::new(false));

    let producer = {
        let mailbox = mailbox.clone();
        let done = done.clone();
        thread::spawn(move || {
            for seq in 1..=OPS {
                mailbox.publish(numbered(seq));
            }
            done.store(true, Ordering::Release);
        })
    };

    let consumer = {
        let mailbox = mailbox.clone();
        let done = done.clone();
        thread::spawn(move || {
            let mut seen = Vec::new();
            loop {
                let finished = done.load(Ordering::Acquire);
                if let Some(frame) = mailbox.take() {
                    seen.push(number_of(&frame));
                } else if finished {
                    break;
                }
            }
            seen
        })
    };

    producer.join().unwrap();
    let seen = consumer.join().unwrap();

    // Each take yields a strictly newer frame than the last one taken.
    assert!(seen.windows(2).all(|w| w[0] < w[1]), "frames went backwards");
    // The final frame is never lost.
    assert_eq!(seen.last().copied(), Some(OPS));

    // Every published frame was either taken once or displaced once.
    let stats = mailbox.stats();
    assert_eq!(stats.published, OPS as u64);
    assert_eq!(stats.taken, seen.len() as u64);
    assert_eq!(stats.taken + stats.overwritten, stats.published);
    assert!(mailbox.is_empty());
}

#[test]
fn interleaved_publishers_leave_at_most_one_frame() {
    let mailbox = Arc::new(Mailbox::new());

    let handles: Vec<_> = (0..4u8)
        .map(|id| {
            let mailbox = mailbox.clone();
            thread::spawn(move || {
                for _ in 0..2_500 {
                    mailbox.publish(frame(2, 2, id));
                    mailbox.take();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let stats = mailbox.stats();
    assert_eq!(stats.published, 10_000);
    let pending = u64::from(!mailbox.is_empty());
    assert_eq!(stats.taken + stats.overwritten + pending, stats.published);
    assert!(pending <= 1);
}
