use super::append_log::{AppendSink, JsonArrayLog, LineLog};
use super::layout::{SessionLayout, StreamId};
use crate::config::{CaptureConfig, PoseEncoding};
use crate::error::CaptureResult;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

enum WriterMsg {
    Append(String),
    Flush(Sender<()>),
}

#[derive(Debug, Default)]
struct WriterStats {
    appended: AtomicU64,
    failed: AtomicU64,
}

/// Single writer thread owning one stream's sink.
///
/// The queue is unbounded: `append` never blocks the caller. Dropping the
/// writer closes the queue; the thread drains what is left and exits.
pub struct StreamWriter {
    stream: StreamId,
    tx: Sender<WriterMsg>,
    stats: Arc<WriterStats>,
    warn_depth: usize,
    backlog_warned: AtomicBool,
}

impl StreamWriter {
    pub fn spawn(
        stream: StreamId,
        sink: Box<dyn AppendSink>,
        warn_depth: usize,
    ) -> CaptureResult<Self> {
        let (tx, rx) = channel::unbounded();
        let stats = Arc::new(WriterStats::default());
        let thread_stats = Arc::clone(&stats);

        thread::Builder::new()
            .name(format!("{}-writer", stream))
            .spawn(move || run_writer(stream, sink, rx, thread_stats))?;

        Ok(StreamWriter {
            stream,
            tx,
            stats,
            warn_depth: warn_depth.max(1),
            backlog_warned: AtomicBool::new(false),
        })
    }

    pub fn stream(&self) -> StreamId {
        self.stream
    }

    /// Queue one entry; returns immediately
    pub fn append(&self, entry: String) {
        if self.tx.send(WriterMsg::Append(entry)).is_err() {
            log::warn!("[{}] writer thread gone, dropping entry", self.stream);
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let depth = self.tx.len();
        if depth >= self.warn_depth {
            if !self.backlog_warned.swap(true, Ordering::Relaxed) {
                log::warn!("[{}] writer backlog at {} entries", self.stream, depth);
            }
        } else if depth < self.warn_depth / 2 {
            self.backlog_warned.store(false, Ordering::Relaxed);
        }
    }

    /// Entries queued but not yet written
    pub fn pending(&self) -> usize {
        self.tx.len()
    }

    pub fn appended(&self) -> u64 {
        self.stats.appended.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.stats.failed.load(Ordering::Relaxed)
    }

    fn request_flush(&self) -> Option<Receiver<()>> {
        let (ack_tx, ack_rx) = channel::bounded(1);
        self.tx.send(WriterMsg::Flush(ack_tx)).ok()?;
        Some(ack_rx)
    }

    /// Wait until everything queued before this call has been written.
    /// Returns false on timeout.
    pub fn flush(&self, timeout: Duration) -> bool {
        match self.request_flush() {
            Some(ack) => ack.recv_timeout(timeout).is_ok(),
            None => false,
        }
    }
}

fn run_writer(
    stream: StreamId,
    mut sink: Box<dyn AppendSink>,
    rx: Receiver<WriterMsg>,
    stats: Arc<WriterStats>,
) {
    log::debug!("[{}] writer started for {}", stream, sink.path().display());

    for msg in rx.iter() {
        match msg {
            WriterMsg::Append(entry) => match sink.append(&entry) {
                Ok(()) => {
                    stats.appended.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                    log::warn!(
                        "[{}] append to {} failed, entry dropped: {}",
                        stream,
                        sink.path().display(),
                        e
                    );
                }
            },
            WriterMsg::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }

    log::debug!(
        "[{}] writer exiting ({} appended, {} failed)",
        stream,
        stats.appended.load(Ordering::Relaxed),
        stats.failed.load(Ordering::Relaxed)
    );
}

/// The four stream writers of one session
pub struct SessionWriters {
    pose: StreamWriter,
    imu: StreamWriter,
    gps: StreamWriter,
    compass: StreamWriter,
}

impl SessionWriters {
    /// File-backed writers for a session folder
    pub fn open(layout: &SessionLayout, config: &CaptureConfig) -> CaptureResult<Self> {
        let sync = config.sync_each_append;
        let pose_path = layout.stream_path(StreamId::Pose, config.pose_encoding);
        let pose_sink: Box<dyn AppendSink> = match config.pose_encoding {
            PoseEncoding::Ndjson => Box::new(LineLog::new(pose_path, sync)),
            PoseEncoding::JsonArray => Box::new(JsonArrayLog::new(pose_path, sync)),
        };

        Self::from_sinks(
            pose_sink,
            Box::new(LineLog::new(layout.imu_path(), sync)),
            Box::new(LineLog::new(layout.gps_path(), sync)),
            Box::new(LineLog::new(layout.compass_path(), sync)),
            config.queue_warn_depth,
        )
    }

    pub fn from_sinks(
        pose: Box<dyn AppendSink>,
        imu: Box<dyn AppendSink>,
        gps: Box<dyn AppendSink>,
        compass: Box<dyn AppendSink>,
        warn_depth: usize,
    ) -> CaptureResult<Self> {
        Ok(SessionWriters {
            pose: StreamWriter::spawn(StreamId::Pose, pose, warn_depth)?,
            imu: StreamWriter::spawn(StreamId::Imu, imu, warn_depth)?,
            gps: StreamWriter::spawn(StreamId::Gps, gps, warn_depth)?,
            compass: StreamWriter::spawn(StreamId::Compass, compass, warn_depth)?,
        })
    }

    pub fn writer(&self, stream: StreamId) -> &StreamWriter {
        match stream {
            StreamId::Pose => &self.pose,
            StreamId::Imu => &self.imu,
            StreamId::Gps => &self.gps,
            StreamId::Compass => &self.compass,
        }
    }

    pub fn append(&self, stream: StreamId, entry: String) {
        self.writer(stream).append(entry);
    }

    pub fn pending(&self) -> usize {
        StreamId::ALL.iter().map(|s| self.writer(*s).pending()).sum()
    }

    /// Barrier across all four streams, sharing one deadline
    pub fn flush(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let acks: Vec<(StreamId, Option<Receiver<()>>)> = StreamId::ALL
            .iter()
            .map(|s| (*s, self.writer(*s).request_flush()))
            .collect();

        let mut all_done = true;
        for (stream, ack) in acks {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let done = match ack {
                Some(rx) => match rx.recv_timeout(remaining) {
                    Ok(()) => true,
                    Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
                },
                None => false,
            };
            if !done {
                log::warn!("[{}] flush did not complete within {:?}", stream, timeout);
                all_done = false;
            }
        }
        all_done
    }
}
