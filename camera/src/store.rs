//! Latest-frame store shared between the capture loop and stream consumers.
//!
//! The store holds at most one frame. Publishing swaps in a new
//! `Arc<Frame>` under the channel lock, so a reader sees either the previous
//! frame or the new one in full, never a mix. Readers that only want to
//! know that something changed subscribe to the underlying watch channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Local};
use image::RgbImage;
use tokio::sync::watch;

use crate::frame::Frame;

/// Contents of the store at one instant.
#[derive(Debug, Clone, Default)]
pub struct FrameSlot {
    /// Most recently published frame, kept after the store is closed
    pub frame: Option<Arc<Frame>>,
    /// Whether a capture session is feeding the store
    pub live: bool,
    /// Incremented each time a capture session opens the store
    pub session: u64,
}

pub struct FrameStore {
    tx: watch::Sender<FrameSlot>,
    published: AtomicU64,
}

impl FrameStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(FrameSlot::default());
        Self {
            tx,
            published: AtomicU64::new(0),
        }
    }

    /// Replace the current frame and wake every subscriber.
    ///
    /// Returns the sequence number assigned to the frame.
    pub fn publish(&self, image: RgbImage, captured_at: DateTime<Local>) -> u64 {
        let mut sequence = 0;
        self.tx.send_modify(|slot| {
            sequence = self.published.fetch_add(1, Ordering::Relaxed) + 1;
            slot.frame = Some(Arc::new(Frame {
                image,
                sequence,
                captured_at,
            }));
        });
        sequence
    }

    /// The current frame, if one has been published.
    pub fn snapshot(&self) -> Option<Arc<Frame>> {
        self.tx.borrow().frame.clone()
    }

    /// Sequence number of the latest frame, 0 before the first publish.
    pub fn latest_sequence(&self) -> u64 {
        self.tx
            .borrow()
            .frame
            .as_ref()
            .map_or(0, |frame| frame.sequence)
    }

    pub fn subscribe(&self) -> watch::Receiver<FrameSlot> {
        self.tx.subscribe()
    }

    pub fn is_live(&self) -> bool {
        self.tx.borrow().live
    }

    /// Mark the store as fed by a running capture session.
    ///
    /// Opening a closed store starts a new session.
    pub fn open(&self) {
        self.tx.send_if_modified(|slot| {
            if slot.live {
                return false;
            }
            slot.live = true;
            slot.session += 1;
            true
        });
    }

    /// Current session number, 0 before the store was first opened.
    pub fn session(&self) -> u64 {
        self.tx.borrow().session
    }

    /// Mark the capture session as ended. Subscribed streams finish.
    pub fn close(&self) {
        self.tx.send_if_modified(|slot| std::mem::replace(&mut slot.live, false));
    }
}

impl Default for FrameStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::thread;

    fn solid(value: u8) -> RgbImage {
        RgbImage::from_pixel(16, 8, Rgb([value, value, value]))
    }

    #[test]
    fn test_empty_store() {
        let store = FrameStore::new();
        assert!(store.snapshot().is_none());
        assert_eq!(store.latest_sequence(), 0);
        assert!(!store.is_live());
    }

    #[test]
    fn test_publish_replaces_frame() {
        let store = FrameStore::new();
        assert_eq!(store.publish(solid(1), Local::now()), 1);
        assert_eq!(store.publish(solid(2), Local::now()), 2);

        let frame = store.snapshot().unwrap();
        assert_eq!(frame.sequence, 2);
        assert_eq!(frame.image.get_pixel(0, 0), &Rgb([2, 2, 2]));
        assert_eq!(store.latest_sequence(), 2);
    }

    #[test]
    fn test_close_keeps_last_frame() {
        let store = FrameStore::new();
        store.open();
        store.publish(solid(7), Local::now());
        store.close();
        assert!(!store.is_live());
        assert_eq!(store.snapshot().unwrap().sequence, 1);
    }

    #[test]
    fn test_open_close_notify_only_on_change() {
        let store = FrameStore::new();
        let mut rx = store.subscribe();
        store.close();
        assert!(!rx.has_changed().unwrap());

        store.open();
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();
        store.open();
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_reopen_starts_new_session() {
        let store = FrameStore::new();
        assert_eq!(store.session(), 0);
        store.open();
        store.open();
        assert_eq!(store.session(), 1);

        store.close();
        assert_eq!(store.session(), 1);
        store.open();
        assert_eq!(store.session(), 2);
    }

    #[test]
    fn test_readers_never_see_torn_frames() {
        let store = Arc::new(FrameStore::new());
        let writer = {
            let store = store.clone();
            thread::spawn(move || {
                for i in 0..500u32 {
                    store.publish(solid((i % 256) as u8), Local::now());
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    let mut last = 0;
                    for _ in 0..500 {
                        if let Some(frame) = store.snapshot() {
                            let first = *frame.image.get_pixel(0, 0);
                            assert!(frame.image.pixels().all(|p| *p == first));
                            assert!(frame.sequence >= last, "sequence went backwards");
                            last = frame.sequence;
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(store.latest_sequence(), 500);
    }
}
