//! Bounded FIFO hand-off between the chat reader and the speaker.
//!
//! Overflow policy is drop-newest: when the queue stays full for the whole
//! offer timeout, the incoming utterance is discarded and the caller is told
//! so. Accepted utterances are never replaced or reordered.

use crate::utterance::Utterance;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError};
use std::num::NonZeroUsize;
use std::time::Duration;

/// Capacity-limited utterance queue. Clones share the same queue.
#[derive(Debug, Clone)]
pub struct BoundedMessageChannel {
    sender: Sender<Utterance>,
    receiver: Receiver<Utterance>,
    capacity: NonZeroUsize,
}

impl BoundedMessageChannel {
    pub fn new(capacity: NonZeroUsize) -> Self {
        let (sender, receiver) = bounded(capacity.get());
        Self {
            sender,
            receiver,
            capacity,
        }
    }

    /// Append `utterance`, waiting at most `timeout` for room.
    ///
    /// Returns `false` if the queue was still full and the utterance was dropped.
    /// A zero timeout drops immediately when full.
    #[must_use]
    pub fn offer(&self, utterance: Utterance, timeout: Duration) -> bool {
        // Both ends live in `self`, so the queue can never be disconnected.
        if timeout.is_zero() {
            match self.sender.try_send(utterance) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
            }
        } else {
            match self.sender.send_timeout(utterance, timeout) {
                Ok(()) => true,
                Err(SendTimeoutError::Timeout(_)) | Err(SendTimeoutError::Disconnected(_)) => {
                    false
                }
            }
        }
    }

    /// Remove the oldest utterance, waiting at most `timeout` for one to arrive.
    pub fn take(&self, timeout: Duration) -> Option<Utterance> {
        match self.receiver.recv_timeout(timeout) {
            Ok(utterance) => Some(utterance),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Discard everything still queued and return how many were dropped.
    pub fn drain(&self) -> usize {
        self.receiver.try_iter().count()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    fn channel(capacity: usize) -> BoundedMessageChannel {
        BoundedMessageChannel::new(NonZeroUsize::new(capacity).unwrap())
    }

    fn utterance(text: &str) -> Utterance {
        Utterance::new(text).unwrap()
    }

    #[test]
    fn test_full_channel_drops_newest() {
        let queue = channel(2);
        let timeout = Duration::from_millis(20);

        assert!(queue.offer(utterance("first"), timeout));
        assert!(queue.offer(utterance("second"), timeout));
        assert!(!queue.offer(utterance("third"), timeout));
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.take(timeout).unwrap().text(), "first");
        assert_eq!(queue.take(timeout).unwrap().text(), "second");
        assert!(queue.take(timeout).is_none());
    }

    #[test]
    fn test_offer_to_full_channel_is_bounded() {
        let queue = channel(1);
        assert!(queue.offer(utterance("only"), Duration::ZERO));

        let started = Instant::now();
        assert!(!queue.offer(utterance("late"), Duration::from_millis(50)));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_offer_succeeds_when_consumer_frees_space() {
        let queue = channel(1);
        assert!(queue.offer(utterance("a"), Duration::ZERO));

        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                queue.take(Duration::from_secs(1))
            })
        };

        assert!(queue.offer(utterance("b"), Duration::from_secs(5)));
        assert_eq!(consumer.join().unwrap().unwrap().text(), "a");
        assert_eq!(queue.take(Duration::ZERO).unwrap().text(), "b");
    }

    #[test]
    fn test_take_times_out_when_empty() {
        let queue = channel(4);
        let started = Instant::now();
        assert!(queue.take(Duration::from_millis(30)).is_none());
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_fifo_across_threads() {
        let queue = channel(8);
        let producer = {
            let queue = queue.clone();
            thread::spawn(move || {
                for i in 0..100 {
                    let accepted = queue.offer(utterance(&i.to_string()), Duration::from_secs(5));
                    assert!(accepted);
                }
            })
        };

        let received: Vec<usize> = (0..100)
            .map(|_| queue.take(Duration::from_secs(5)).unwrap().text().parse().unwrap())
            .collect();
        producer.join().unwrap();

        assert_eq!(received, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_drain_discards_remaining() {
        let queue = channel(3);
        for text in ["a", "b", "c"] {
            assert!(queue.offer(utterance(text), Duration::ZERO));
        }
        assert_eq!(queue.drain(), 3);
        assert!(queue.is_empty());
        assert_eq!(queue.capacity(), 3);
    }
}
