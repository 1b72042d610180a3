// EventLoopBridge - Delivers background results to the Slint event loop
//
// Scan work runs on tokio's blocking pool and the camera preview thread,
// while the StateManager and the widgets belong to Slint's single UI thread.
// The bridge connects the two with a repeating slint::Timer that drains the
// orchestrator's channels on the UI thread:
// - Scan events are all delivered, in order
// - Camera previews are coalesced; only the newest frame of a tick is shown

use crate::services::{ScanChannels, ScanEvent};
use image::RgbaImage;
use slint::{Timer, TimerMode};
use std::time::Duration;
use tokio::sync::mpsc;

/// How often the UI thread polls the queues.
pub const DRAIN_INTERVAL: Duration = Duration::from_millis(16);

/// Upper bound of scan events handled per tick so the UI stays responsive.
pub const MAX_EVENTS_PER_TICK: usize = 64;

/// A queue that can be polled without blocking.
pub trait DrainQueue<T> {
    fn try_next(&mut self) -> Option<T>;
}

impl<T> DrainQueue<T> for mpsc::UnboundedReceiver<T> {
    fn try_next(&mut self) -> Option<T> {
        self.try_recv().ok()
    }
}

impl<T> DrainQueue<T> for mpsc::Receiver<T> {
    fn try_next(&mut self) -> Option<T> {
        self.try_recv().ok()
    }
}

/// Hand up to `max` ready items to `handle`, oldest first.
///
/// Returns how many were handled.
pub fn drain_batch<T, Q, F>(queue: &mut Q, max: usize, mut handle: F) -> usize
where
    Q: DrainQueue<T>,
    F: FnMut(T),
{
    let mut handled = 0;
    while handled < max {
        match queue.try_next() {
            Some(item) => {
                handle(item);
                handled += 1;
            }
            None => break,
        }
    }
    handled
}

/// Empty the queue and keep only the newest item.
pub fn take_latest<T, Q: DrainQueue<T>>(queue: &mut Q) -> Option<T> {
    let mut latest = None;
    while let Some(item) = queue.try_next() {
        latest = Some(item);
    }
    latest
}

/// Drains scan channels on the Slint event loop
///
/// Must be created on the UI thread. Dropping the bridge stops the timer.
///
/// # Example
/// ```ignore
/// let bridge = EventLoopBridge::new();
/// bridge.start(channels, |event| apply(event), |frame| show(frame));
/// ui.run()?;
/// ```
pub struct EventLoopBridge {
    timer: Timer,
}

impl EventLoopBridge {
    pub fn new() -> Self {
        Self {
            timer: Timer::default(),
        }
    }

    /// Start delivering `channels` to the handlers on every tick.
    ///
    /// Handlers run on the UI thread, so they may freely touch UI-owned
    /// state.
    pub fn start<E, P>(&self, channels: ScanChannels, mut on_event: E, mut on_preview: P)
    where
        E: FnMut(ScanEvent) + 'static,
        P: FnMut(RgbaImage) + 'static,
    {
        let ScanChannels {
            mut events,
            mut camera_previews,
        } = channels;

        self.timer.start(TimerMode::Repeated, DRAIN_INTERVAL, move || {
            drain_batch(&mut events, MAX_EVENTS_PER_TICK, &mut on_event);

            if let Some(frame) = take_latest(&mut camera_previews) {
                on_preview(frame);
            }
        });

        tracing::debug!("EventLoopBridge draining every {:?}", DRAIN_INTERVAL);
    }

    pub fn stop(&self) {
        self.timer.stop();
    }

    pub fn is_running(&self) -> bool {
        self.timer.running()
    }
}

impl Default for EventLoopBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    impl<T> DrainQueue<T> for VecDeque<T> {
        fn try_next(&mut self) -> Option<T> {
            self.pop_front()
        }
    }

    #[test]
    fn test_drain_batch_keeps_order() {
        let mut queue: VecDeque<u32> = (1..=5).collect();
        let mut seen = Vec::new();

        let handled = drain_batch(&mut queue, 10, |item| seen.push(item));

        assert_eq!(handled, 5);
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_drain_batch_respects_limit() {
        let mut queue: VecDeque<u32> = (1..=5).collect();
        let mut seen = Vec::new();

        assert_eq!(drain_batch(&mut queue, 2, |item| seen.push(item)), 2);
        assert_eq!(seen, vec![1, 2]);

        // The rest waits for the next tick
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_take_latest() {
        let mut queue: VecDeque<&str> = VecDeque::from(vec!["old", "older", "newest"]);
        assert_eq!(take_latest(&mut queue), Some("newest"));
        assert!(queue.is_empty());
        assert_eq!(take_latest(&mut queue), None);
    }

    #[test]
    fn test_tokio_receivers_drain_without_runtime() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(1).unwrap();
        tx.send(2).unwrap();

        let mut seen = Vec::new();
        drain_batch(&mut rx, MAX_EVENTS_PER_TICK, |item| seen.push(item));
        assert_eq!(seen, vec![1, 2]);

        let (tx, mut rx) = mpsc::channel(2);
        tx.try_send("a").unwrap();
        tx.try_send("b").unwrap();
        assert!(tx.try_send("c").is_err());
        assert_eq!(take_latest(&mut rx), Some("b"));
    }
}
