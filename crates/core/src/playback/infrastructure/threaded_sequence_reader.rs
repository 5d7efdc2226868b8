use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::cache::frame_cache::{FrameCache, OwnerKey};
use crate::codec::domain::io_plugin::{IoInfo, Load, ReadRequest};
use crate::playback::domain::video_queue::{QueueError, VideoFrame, VideoQueue};
use crate::shared::image::Proxy;

const DEFAULT_CHANNEL_CAPACITY: usize = 8;
const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Forward,
    Reverse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderCommand {
    Seek(i64),
    SetDirection(Direction),
    SetLoop(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReaderConfig {
    /// First frame to decode; defaults to the start of the range in the
    /// playback direction.
    pub start: Option<i64>,
    pub direction: Direction,
    pub looping: bool,
    pub layer: usize,
    pub proxy: Proxy,
}

/// Decodes one clip on a background thread into a [`VideoQueue`], going
/// through the shared [`FrameCache`] first.
///
/// Frames that fail to decode are logged and skipped. Closing stops the
/// thread after its in-flight decode, drops the clip's cache entries and
/// marks the queue finished.
pub struct SequenceReader {
    owner: OwnerKey,
    info: IoInfo,
    cache: Arc<FrameCache>,
    queue: Arc<VideoQueue>,
    commands: Sender<ReaderCommand>,
    pending_seeks: Arc<AtomicUsize>,
    cancelled: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SequenceReader {
    pub fn spawn(load: Box<dyn Load>, cache: Arc<FrameCache>, queue: Arc<VideoQueue>, config: ReaderConfig) -> Self {
        let owner = OwnerKey::next();
        let info = load.info().clone();
        let cancelled = Arc::new(AtomicBool::new(false));
        let pending_seeks = Arc::new(AtomicUsize::new(0));
        let (commands, command_rx) = crossbeam_channel::bounded(DEFAULT_CHANNEL_CAPACITY);

        let worker = Worker {
            load,
            owner,
            frames: frame_list(&info),
            cache: Arc::clone(&cache),
            queue: Arc::clone(&queue),
            pending_seeks: Arc::clone(&pending_seeks),
            cancelled: Arc::clone(&cancelled),
            config,
        };
        let handle = std::thread::spawn(move || worker.run(command_rx));

        Self {
            owner,
            info,
            cache,
            queue,
            commands,
            pending_seeks,
            cancelled,
            handle: Some(handle),
        }
    }

    /// Cache key of this clip's frames.
    pub fn owner(&self) -> OwnerKey {
        self.owner
    }

    pub fn info(&self) -> &IoInfo {
        &self.info
    }

    pub fn queue(&self) -> &Arc<VideoQueue> {
        &self.queue
    }

    /// Restarts decoding at `frame`, or the nearest frame of the sequence.
    ///
    /// The queue reads as unfinished from here until the worker has replayed
    /// the new range; an end-of-range reached before the worker sees the
    /// seek does not mark it finished.
    pub fn seek(&self, frame: i64) {
        self.pending_seeks.fetch_add(1, Ordering::SeqCst);
        self.queue.clear();
        self.queue.set_finished(false);
        if !self.send(ReaderCommand::Seek(frame)) {
            self.pending_seeks.fetch_sub(1, Ordering::SeqCst);
        }
    }

    pub fn set_direction(&self, direction: Direction) {
        self.send(ReaderCommand::SetDirection(direction));
    }

    pub fn set_loop(&self, looping: bool) {
        self.send(ReaderCommand::SetLoop(looping));
    }

    fn send(&self, command: ReaderCommand) -> bool {
        if self.commands.send(command).is_err() {
            log::debug!("reader thread gone, dropping {command:?}");
            return false;
        }
        true
    }

    pub fn close(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.cancelled.store(true, Ordering::Relaxed);
        if handle.join().is_err() {
            log::warn!("sequence reader thread panicked");
        }
        let dropped = self.cache.invalidate(self.owner);
        log::debug!("closed reader, invalidated {dropped} cached frames");
        self.queue.set_finished(true);
    }
}

impl Drop for SequenceReader {
    fn drop(&mut self) {
        self.close();
    }
}

/// Frame numbers in playback order. A file without a sequence plays as a
/// single frame 0.
fn frame_list(info: &IoInfo) -> Vec<i64> {
    if info.sequence.is_empty() {
        vec![0]
    } else {
        info.sequence.frames().collect()
    }
}

struct Worker {
    load: Box<dyn Load>,
    owner: OwnerKey,
    frames: Vec<i64>,
    cache: Arc<FrameCache>,
    queue: Arc<VideoQueue>,
    pending_seeks: Arc<AtomicUsize>,
    cancelled: Arc<AtomicBool>,
    config: ReaderConfig,
}

impl Worker {
    fn run(mut self, commands: Receiver<ReaderCommand>) {
        let mut position = match self.config.start {
            Some(frame) => Some(self.nearest_index(frame)),
            None => Some(self.first_index()),
        };

        while !self.cancelled.load(Ordering::Relaxed) {
            let Some(index) = position else {
                // End of range: idle until told to seek.
                match commands.recv_timeout(POLL_INTERVAL) {
                    Ok(command) => position = self.apply(command, position),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
                continue;
            };

            let mut pending = false;
            while let Ok(command) = commands.try_recv() {
                position = self.apply(command, position);
                pending = true;
            }
            if pending {
                continue;
            }

            if let Some(frame) = self.decode(self.frames[index]) {
                if !self.enqueue(frame, &commands) {
                    continue;
                }
            }
            position = self.advance(index);
            if position.is_none() {
                let pending = &self.pending_seeks;
                if self.queue.finish_unless(|| pending.load(Ordering::SeqCst) > 0) {
                    log::debug!("reached end of range");
                }
            }
        }
        self.load.close();
    }

    fn apply(&mut self, command: ReaderCommand, position: Option<usize>) -> Option<usize> {
        match command {
            ReaderCommand::Seek(frame) => {
                self.queue.clear();
                self.queue.set_finished(false);
                self.pending_seeks.fetch_sub(1, Ordering::SeqCst);
                Some(self.nearest_index(frame))
            }
            ReaderCommand::SetDirection(direction) => {
                self.config.direction = direction;
                position
            }
            ReaderCommand::SetLoop(looping) => {
                self.config.looping = looping;
                position
            }
        }
    }

    fn decode(&mut self, frame: i64) -> Option<VideoFrame> {
        if let Some(handle) = self.cache.get(self.owner, frame) {
            return Some(VideoFrame::cached(frame, handle));
        }
        let mut request = ReadRequest::new().with_layer(self.config.layer).with_proxy(self.config.proxy);
        if self.frames.len() > 1 || frame != 0 {
            request.frame = Some(frame);
        }
        match self.load.read(&request) {
            Ok(image) => Some(VideoFrame::cached(frame, self.cache.add(self.owner, frame, image))),
            Err(e) => {
                log::warn!("skipping frame {frame}: {e}");
                None
            }
        }
    }

    /// Waits for queue space. Returns false when a command arrived first,
    /// leaving the frame unqueued.
    fn enqueue(&self, frame: VideoFrame, commands: &Receiver<ReaderCommand>) -> bool {
        loop {
            if !commands.is_empty() {
                return false;
            }
            match self.queue.add_frame_blocking(frame.clone(), POLL_INTERVAL, &self.cancelled) {
                Ok(()) => return true,
                Err(QueueError::Timeout) | Err(QueueError::QueueFull { .. }) => {}
                Err(QueueError::Cancelled) => return false,
            }
        }
    }

    fn first_index(&self) -> usize {
        match self.config.direction {
            Direction::Forward => 0,
            Direction::Reverse => self.frames.len() - 1,
        }
    }

    fn nearest_index(&self, frame: i64) -> usize {
        self.frames
            .partition_point(|&f| f < frame)
            .min(self.frames.len() - 1)
    }

    fn advance(&self, index: usize) -> Option<usize> {
        let last = self.frames.len() - 1;
        match (self.config.direction, self.config.looping) {
            (Direction::Forward, _) if index < last => Some(index + 1),
            (Direction::Forward, true) => Some(0),
            (Direction::Reverse, _) if index > 0 => Some(index - 1),
            (Direction::Reverse, true) => Some(last),
            (_, false) => None,
        }
    }
}

/// Pops frames into `on_frame` until the queue is finished and empty,
/// sleeping `poll` whenever it is momentarily empty. Returns the number of
/// frames consumed.
pub fn drain_queue(queue: &VideoQueue, mut on_frame: impl FnMut(VideoFrame), poll: Duration) -> usize {
    let mut count = 0;
    loop {
        if let Some(frame) = queue.try_pop_frame() {
            on_frame(frame);
            count += 1;
            continue;
        }
        if queue.is_drained() {
            return count;
        }
        std::thread::sleep(poll);
    }
}
