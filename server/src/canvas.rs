//! The canvas: a bounds-checking, alpha-compositing front end to the pixel store, plus the
//! write queue and render tick that serialize all writes.
//!
//! A thin front end over the grid, with a periodic tick as the grid's sole writer, backed by a
//! genuine multi-producer queue rather than a single-producer ring buffer, since many TCP
//! sessions and HTTP handlers enqueue concurrently here instead of one worker per core.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_queue::SegQueue;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::const_settings::DEFAULT_RENDER_TICK_HZ;
use crate::heartbeat::Heartbeat;
use crate::stats::Stats;
use crate::store::{PixelStore, Rgb};

/// One pending write. Coordinates are signed so a malformed/adversarial `x`/`y` can be
/// represented and dropped at drain time instead of panicking earlier.
#[derive(Debug, Clone, Copy)]
struct PendingWrite {
    x: i64,
    y: i64,
    r: u8,
    g: u8,
    b: u8,
    a: u8,
}

pub struct Canvas {
    store: Arc<PixelStore>,
    heartbeat: Arc<Heartbeat>,
    stats: Arc<Stats>,
    queue: SegQueue<PendingWrite>,
    queue_len: AtomicU64,
}

impl Canvas {
    pub fn new(store: Arc<PixelStore>, heartbeat: Arc<Heartbeat>, stats: Arc<Stats>) -> Arc<Self> {
        Arc::new(Self {
            store,
            heartbeat,
            stats,
            queue: SegQueue::new(),
            queue_len: AtomicU64::new(0),
        })
    }

    pub fn store(&self) -> &PixelStore {
        &self.store
    }

    pub fn width(&self) -> usize {
        self.store.width()
    }

    pub fn height(&self) -> usize {
        self.store.height()
    }

    /// Pushes a write to the queue and returns immediately. No validation here — bounds and
    /// blending are applied when the render tick drains the item.
    pub fn enqueue(&self, x: i64, y: i64, r: u8, g: u8, b: u8, a: u8) {
        self.queue.push(PendingWrite { x, y, r, g, b, a });
        self.queue_len.fetch_add(1, Ordering::Relaxed);
    }

    /// Applies a write immediately, bypassing the queue. Used only by the admin bulk-write
    /// path. Applies the same bounds/alpha rules as the render tick.
    pub fn put_now(&self, x: i64, y: i64, r: u8, g: u8, b: u8, a: u8) {
        self.apply(PendingWrite { x, y, r, g, b, a });
    }

    /// Reads back the current color at `(x, y)`, honoring the read-bounds quirk in `store.rs`.
    pub fn read(&self, x: i64, y: i64) -> Option<Rgb> {
        if !self.store.in_read_bounds(x, y) {
            return None;
        }
        Some(self.store.read(x as usize, y as usize))
    }

    fn apply(&self, write: PendingWrite) {
        if write.x < 0 || write.y < 0 {
            return;
        }
        let (x, y) = (write.x as usize, write.y as usize);
        if !self.store.in_write_bounds(x, y) {
            return;
        }
        if write.a == 0 {
            return;
        }

        let new_rgb = Rgb {
            r: write.r,
            g: write.g,
            b: write.b,
        };
        let timestamp = self.heartbeat.now();

        let final_rgb = if write.a == 255 {
            new_rgb
        } else {
            let old = self.store.read(x, y);
            blend(old, new_rgb, write.a)
        };

        self.store.update(x, y, final_rgb, timestamp);
        self.stats.bump(final_rgb);
    }

    /// Drains every item currently in the queue, applying each in FIFO order. Called once per
    /// render tick.
    fn drain(&self) {
        while let Some(write) = self.queue.pop() {
            self.queue_len.fetch_sub(1, Ordering::Relaxed);
            self.apply(write);
        }
    }

    pub fn queue_len(&self) -> u64 {
        self.queue_len.load(Ordering::Relaxed)
    }

    /// Spawns the render tick task: fires at `hz`, draining the write queue into the pixel
    /// store on every tick.
    pub fn spawn_render_tick(self: &Arc<Self>, hz: Option<u64>) -> JoinHandle<()> {
        let hz = hz.unwrap_or(DEFAULT_RENDER_TICK_HZ).max(1);
        let canvas = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(1000 / hz));
            loop {
                ticker.tick().await;
                canvas.drain();
                trace!("render tick drained queue");
            }
        })
    }
}

/// Source-over alpha blend: `out = (old*(255-a) + new*a) / 255`, rounded toward zero, per
/// channel. The stored cell is always opaque RGB.
fn blend(old: Rgb, new: Rgb, a: u8) -> Rgb {
    let a = a as u32;
    let inv_a = 255 - a;
    let mix = |o: u8, n: u8| -> u8 { ((o as u32 * inv_a + n as u32 * a) / 255) as u8 };
    Rgb {
        r: mix(old.r, new.r),
        g: mix(old.g, new.g),
        b: mix(old.b, new.b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_canvas(w: usize, h: usize) -> Arc<Canvas> {
        let store = Arc::new(PixelStore::new(w, h));
        let heartbeat = Heartbeat::new();
        let stats = Stats::new();
        Canvas::new(store, heartbeat, stats)
    }

    #[test]
    fn full_alpha_write_then_drain_is_visible() {
        let canvas = fresh_canvas(10, 10);
        canvas.enqueue(1, 2, 0xff, 0x88, 0x00, 255);
        canvas.drain();
        assert_eq!(
            canvas.read(1, 2).unwrap(),
            Rgb {
                r: 0xff,
                g: 0x88,
                b: 0x00
            }
        );
    }

    #[test]
    fn zero_alpha_write_is_a_no_op() {
        let canvas = fresh_canvas(10, 10);
        canvas.enqueue(1, 2, 0xff, 0xff, 0xff, 0);
        canvas.drain();
        assert_eq!(canvas.read(1, 2).unwrap(), Rgb::BLACK);
    }

    #[test]
    fn out_of_bounds_write_is_silently_dropped() {
        let canvas = fresh_canvas(4, 4);
        canvas.enqueue(4, 0, 1, 1, 1, 255);
        canvas.enqueue(-1, 0, 1, 1, 1, 255);
        canvas.drain();
        // No panic, nothing written.
        assert_eq!(canvas.queue_len(), 0);
    }

    #[test]
    fn sequential_blends_apply_in_enqueue_order() {
        let canvas = fresh_canvas(4, 4);
        canvas.enqueue(0, 0, 255, 0, 0, 255);
        canvas.enqueue(0, 0, 0, 255, 0, 128);
        canvas.drain();
        let got = canvas.read(0, 0).unwrap();
        let expected_g = (255u32 * 128 / 255) as u8;
        let expected_r = (255u32 * (255 - 128) / 255) as u8;
        assert_eq!(got.r, expected_r);
        assert_eq!(got.g, expected_g);
    }

    #[test]
    fn put_now_bypasses_the_queue() {
        let canvas = fresh_canvas(4, 4);
        canvas.put_now(0, 0, 1, 2, 3, 255);
        assert_eq!(canvas.queue_len(), 0);
        assert_eq!(canvas.read(0, 0).unwrap(), Rgb { r: 1, g: 2, b: 3 });
    }
}
