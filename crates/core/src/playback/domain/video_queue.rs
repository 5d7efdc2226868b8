use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::cache::frame_cache::CacheHandle;
use crate::shared::constants::DEFAULT_QUEUE_MAX;
use crate::shared::image::Image;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue is full ({max} frames)")]
    QueueFull { max: usize },
    #[error("timed out waiting for queue space")]
    Timeout,
    #[error("cancelled")]
    Cancelled,
}

#[derive(Debug, Clone)]
pub enum FrameImage {
    Cached(CacheHandle),
    Owned(Image),
}

/// A decoded frame waiting for display.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub frame: i64,
    pub image: FrameImage,
}

impl VideoFrame {
    pub fn cached(frame: i64, handle: CacheHandle) -> Self {
        Self {
            frame,
            image: FrameImage::Cached(handle),
        }
    }

    pub fn owned(frame: i64, image: Image) -> Self {
        Self {
            frame,
            image: FrameImage::Owned(image),
        }
    }

    pub fn image(&self) -> &Image {
        match &self.image {
            FrameImage::Cached(handle) => handle.image(),
            FrameImage::Owned(image) => image,
        }
    }
}

struct QueueState {
    frames: VecDeque<VideoFrame>,
    max: usize,
    finished: bool,
}

/// Bounded FIFO between a decode thread and a display consumer.
///
/// Never holds more than `max` frames: producers either get
/// [`QueueError::QueueFull`] or wait for space. Finished and empty is the
/// normal end of stream.
pub struct VideoQueue {
    state: Mutex<QueueState>,
    space: Condvar,
}

impl VideoQueue {
    pub fn new(max: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                frames: VecDeque::new(),
                max: max.max(1),
                finished: false,
            }),
            space: Condvar::new(),
        }
    }

    pub fn max(&self) -> usize {
        self.state.lock().unwrap().max
    }

    /// Frames already queued beyond a lowered maximum stay until popped.
    pub fn set_max(&self, max: usize) {
        self.state.lock().unwrap().max = max.max(1);
        self.space.notify_all();
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn add_frame(&self, frame: VideoFrame) -> Result<(), QueueError> {
        let mut state = self.state.lock().unwrap();
        if state.frames.len() >= state.max {
            return Err(QueueError::QueueFull { max: state.max });
        }
        state.frames.push_back(frame);
        Ok(())
    }

    /// Waits up to `timeout` for space, checking `cancel` between polls.
    pub fn add_frame_blocking(&self, frame: VideoFrame, timeout: Duration, cancel: &AtomicBool) -> Result<(), QueueError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().unwrap();
        loop {
            if cancel.load(Ordering::Relaxed) {
                return Err(QueueError::Cancelled);
            }
            if state.frames.len() < state.max {
                state.frames.push_back(frame);
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(QueueError::Timeout);
            }
            let wait = POLL_INTERVAL.min(deadline - now);
            let (next, _) = self.space.wait_timeout(state, wait).unwrap();
            state = next;
        }
    }

    pub fn pop_frame(&self) -> Option<VideoFrame> {
        let frame = self.state.lock().unwrap().frames.pop_front();
        if frame.is_some() {
            self.space.notify_all();
        }
        frame
    }

    /// Non-blocking pop. Contention reads as empty, so callers poll.
    pub fn try_pop_frame(&self) -> Option<VideoFrame> {
        let frame = self.state.try_lock().ok()?.frames.pop_front();
        if frame.is_some() {
            self.space.notify_all();
        }
        frame
    }

    pub fn has_frames(&self) -> bool {
        !self.state.lock().unwrap().frames.is_empty()
    }

    pub fn set_finished(&self, finished: bool) {
        self.state.lock().unwrap().finished = finished;
    }

    /// Marks the queue finished unless `pending` reports otherwise. The check
    /// runs under the queue lock, so a concurrent `set_finished(false)` is
    /// never overwritten by a stale end-of-range.
    pub fn finish_unless(&self, pending: impl FnOnce() -> bool) -> bool {
        let mut state = self.state.lock().unwrap();
        if pending() {
            return false;
        }
        state.finished = true;
        true
    }

    pub fn is_finished(&self) -> bool {
        self.state.lock().unwrap().finished
    }

    /// Finished with nothing left to pop.
    pub fn is_drained(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.finished && state.frames.is_empty()
    }

    /// Drops queued frames without touching the finished flag.
    pub fn clear(&self) {
        self.state.lock().unwrap().frames.clear();
        self.space.notify_all();
    }
}

impl Default for VideoQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_MAX)
    }
}
