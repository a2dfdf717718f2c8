//! Ordered playback of received audio chunks.
//!
//! Chunks play strictly in arrival order, one at a time. Each item gets a
//! transient playable resource that is released before the next item
//! starts, whether playback finished or failed. A failed item is logged
//! and skipped; the queue keeps going.

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use rodio::{Decoder, OutputStream, Sink};
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::error::{Result, StreamError};

/// Plays one chunk to completion. Implementations construct whatever
/// transient resources they need inside `play` and release them before
/// returning, which is what the queue's per-item cleanup guarantee
/// rests on.
pub trait ChunkPlayer: Send + Sync {
    /// Block until the chunk finishes playing or fails.
    fn play(&self, chunk: &[u8]) -> Result<()>;

    /// Interrupt the chunk currently playing, if any.
    fn halt(&self);
}

/// Default player: decodes the chunk with rodio and plays it through the
/// default output device. Output stream, sink, and decoder live only for
/// the duration of one `play` call.
pub struct RodioPlayer {
    current: Mutex<Option<Arc<Sink>>>,
}

impl RodioPlayer {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(None),
        }
    }
}

impl Default for RodioPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkPlayer for RodioPlayer {
    fn play(&self, chunk: &[u8]) -> Result<()> {
        let (_stream, handle) = OutputStream::try_default()
            .map_err(|e| StreamError::Playback(format!("audio output unavailable: {}", e)))?;
        let sink = Sink::try_new(&handle)
            .map_err(|e| StreamError::Playback(format!("sink creation failed: {}", e)))?;
        let source = Decoder::new(Cursor::new(chunk.to_vec()))
            .map_err(|e| StreamError::Playback(format!("undecodable chunk: {}", e)))?;

        let sink = Arc::new(sink);
        *self.current.lock().unwrap() = Some(Arc::clone(&sink));
        sink.append(source);
        // Returns early if halt() stops the sink.
        sink.sleep_until_end();
        self.current.lock().unwrap().take();
        Ok(())
    }

    fn halt(&self) {
        if let Some(sink) = self.current.lock().unwrap().take() {
            sink.stop();
        }
    }
}

/// FIFO queue of inbound audio chunks, drained by a single worker task.
pub struct PlaybackQueue {
    queue: Mutex<VecDeque<Vec<u8>>>,
    playing: AtomicBool,
    wake: Notify,
    player: Arc<dyn ChunkPlayer>,
}

impl PlaybackQueue {
    pub fn new(player: Arc<dyn ChunkPlayer>) -> Arc<Self> {
        let queue = Arc::new(Self {
            queue: Mutex::new(VecDeque::new()),
            playing: AtomicBool::new(false),
            wake: Notify::new(),
            player,
        });
        tokio::spawn(Arc::clone(&queue).run());
        queue
    }

    /// Append a chunk; playback starts immediately when the queue is idle.
    pub fn enqueue(&self, chunk: Vec<u8>) {
        self.queue.lock().unwrap().push_back(chunk);
        self.wake.notify_one();
    }

    /// Discard everything queued and halt the item in progress.
    pub fn clear(&self) {
        self.queue.lock().unwrap().clear();
        self.player.halt();
        self.playing.store(false, Ordering::SeqCst);
        debug!("Playback queue cleared");
    }

    /// Whether an item is currently playing.
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    /// Worker: pop the head, play it to completion on the blocking pool,
    /// release it, move on. One item at a time, enqueue order exactly.
    async fn run(self: Arc<Self>) {
        loop {
            let next = self.queue.lock().unwrap().pop_front();
            match next {
                Some(chunk) => {
                    self.playing.store(true, Ordering::SeqCst);
                    let player = Arc::clone(&self.player);
                    let joined =
                        tokio::task::spawn_blocking(move || player.play(&chunk)).await;
                    match joined {
                        Ok(Ok(())) => debug!("Chunk playback finished"),
                        Ok(Err(e)) => warn!(error = %e, "Chunk skipped"),
                        Err(e) => warn!(error = %e, "Playback worker join failed"),
                    }
                }
                None => {
                    self.playing.store(false, Ordering::SeqCst);
                    self.wake.notified().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Player that records everything and can be told to fail or dawdle.
    struct FakePlayer {
        played: Mutex<Vec<Vec<u8>>>,
        in_flight: AtomicUsize,
        overlap_seen: AtomicBool,
        halts: AtomicUsize,
        delay: Duration,
    }

    impl FakePlayer {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                played: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                overlap_seen: AtomicBool::new(false),
                halts: AtomicUsize::new(0),
                delay,
            })
        }

        fn played(&self) -> Vec<Vec<u8>> {
            self.played.lock().unwrap().clone()
        }
    }

    impl ChunkPlayer for FakePlayer {
        fn play(&self, chunk: &[u8]) -> Result<()> {
            if self.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
                self.overlap_seen.store(true, Ordering::SeqCst);
            }
            std::thread::sleep(self.delay);
            self.played.lock().unwrap().push(chunk.to_vec());
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if chunk.starts_with(b"BAD") {
                return Err(StreamError::Playback("bad chunk".into()));
            }
            Ok(())
        }

        fn halt(&self) {
            self.halts.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..500 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn plays_in_enqueue_order_one_at_a_time() {
        let player = FakePlayer::new(Duration::from_millis(5));
        let queue = PlaybackQueue::new(Arc::clone(&player) as Arc<dyn ChunkPlayer>);

        let chunks: Vec<Vec<u8>> = (0u8..8).map(|i| vec![i; 4]).collect();
        for chunk in &chunks {
            queue.enqueue(chunk.clone());
        }

        wait_until(|| player.played().len() == 8).await;
        assert_eq!(player.played(), chunks);
        assert!(!player.overlap_seen.load(Ordering::SeqCst));

        wait_until(|| !queue.is_playing()).await;
    }

    #[tokio::test]
    async fn playback_starts_immediately_when_idle() {
        let player = FakePlayer::new(Duration::ZERO);
        let queue = PlaybackQueue::new(Arc::clone(&player) as Arc<dyn ChunkPlayer>);

        queue.enqueue(vec![9u8; 100]);
        wait_until(|| player.played().len() == 1).await;
        assert_eq!(player.played()[0].len(), 100);
        wait_until(|| !queue.is_playing()).await;
    }

    #[tokio::test]
    async fn a_failed_item_is_skipped_and_the_queue_continues() {
        let player = FakePlayer::new(Duration::ZERO);
        let queue = PlaybackQueue::new(Arc::clone(&player) as Arc<dyn ChunkPlayer>);

        queue.enqueue(b"ok-1".to_vec());
        queue.enqueue(b"BAD".to_vec());
        queue.enqueue(b"ok-2".to_vec());

        wait_until(|| player.played().len() == 3).await;
        assert_eq!(
            player.played(),
            vec![b"ok-1".to_vec(), b"BAD".to_vec(), b"ok-2".to_vec()]
        );
        wait_until(|| !queue.is_playing()).await;
    }

    #[tokio::test]
    async fn clear_discards_pending_items_and_halts() {
        let player = FakePlayer::new(Duration::from_millis(30));
        let queue = PlaybackQueue::new(Arc::clone(&player) as Arc<dyn ChunkPlayer>);

        for i in 0u8..6 {
            queue.enqueue(vec![i; 4]);
        }
        wait_until(|| queue.is_playing()).await;
        queue.clear();

        assert!(player.halts.load(Ordering::SeqCst) >= 1);
        // The in-flight item may finish; everything still queued is gone.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(player.played().len() <= 2);
        assert!(!queue.is_playing());
    }
}
