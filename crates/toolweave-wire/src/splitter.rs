use std::io;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, warn};

use crate::accumulator::FrameAccumulator;
use crate::config::{SplitStrategy, SplitterConfig};
use crate::error::SplitterError;
use crate::frame::{Direction, Frame};

pub type FrameResult = Result<Frame, SplitterError>;

/// Frames read from one or two byte streams by background workers.
///
/// Each direction has its own worker task and accumulator. Frames of one
/// direction arrive in stream order; the two directions may interleave.
/// With [`SplitStrategy::ByDirection`] a duplex splitter instead funnels
/// both readers into one accumulator, so frames come out in turnaround
/// order. Dropping the splitter aborts its workers.
#[derive(Debug)]
pub struct StreamSplitter {
    frames: mpsc::Receiver<FrameResult>,
    workers: Vec<JoinHandle<()>>,
}

impl StreamSplitter {
    /// Frame a single stream.
    pub fn spawn<R>(reader: R, direction: Direction, config: SplitterConfig) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        let worker = tokio::spawn(run_worker(
            reader,
            None::<tokio::io::Sink>,
            direction,
            config,
            tx,
        ));
        Self {
            frames: rx,
            workers: vec![worker],
        }
    }

    /// Frame a stream while relaying every byte to `writer`.
    ///
    /// The writer is shut down when the reader reaches EOF.
    pub fn spawn_forwarding<R, W>(
        reader: R,
        writer: W,
        direction: Direction,
        config: SplitterConfig,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        let worker = tokio::spawn(run_worker(reader, Some(writer), direction, config, tx));
        Self {
            frames: rx,
            workers: vec![worker],
        }
    }

    /// Frame both halves of a connection into one channel.
    pub fn spawn_duplex<C, S>(client: C, server: S, config: SplitterConfig) -> Self
    where
        C: AsyncRead + Unpin + Send + 'static,
        S: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        if config.strategy == SplitStrategy::ByDirection {
            let (chunk_tx, chunk_rx) = mpsc::channel(config.channel_capacity.max(1));
            let read_size = config.read_buffer_size.max(1);
            let client_reader = tokio::spawn(run_reader(
                client,
                Direction::ClientToServer,
                read_size,
                chunk_tx.clone(),
            ));
            let server_reader = tokio::spawn(run_reader(
                server,
                Direction::ServerToClient,
                read_size,
                chunk_tx,
            ));
            let framer = tokio::spawn(run_turnaround(chunk_rx, config, tx));
            return Self {
                frames: rx,
                workers: vec![client_reader, server_reader, framer],
            };
        }

        let client_worker = tokio::spawn(run_worker(
            client,
            None::<tokio::io::Sink>,
            Direction::ClientToServer,
            config.clone(),
            tx.clone(),
        ));
        let server_worker = tokio::spawn(run_worker(
            server,
            None::<tokio::io::Sink>,
            Direction::ServerToClient,
            config,
            tx,
        ));
        Self {
            frames: rx,
            workers: vec![client_worker, server_worker],
        }
    }

    /// Next frame, or `None` once every worker has finished.
    pub async fn next_frame(&mut self) -> Option<FrameResult> {
        self.frames.recv().await
    }

    /// Drain until every worker has finished.
    pub async fn collect(mut self) -> Vec<FrameResult> {
        let mut out = Vec::new();
        while let Some(item) = self.next_frame().await {
            out.push(item);
        }
        out
    }

    pub fn abort(&self) {
        for worker in &self.workers {
            worker.abort();
        }
    }
}

impl Drop for StreamSplitter {
    fn drop(&mut self) {
        self.abort();
    }
}

async fn emit(tx: &mpsc::Sender<FrameResult>, frame: Frame) -> bool {
    debug!(
        direction = %frame.direction(),
        size = frame.size(),
        force_split = frame.is_unknown_protocol(),
        "frame emitted"
    );
    tx.send(Ok(frame)).await.is_ok()
}

/// Raw read results handed from a reader task to the shared framer
enum Chunk {
    Data(Direction, Bytes),
    Eof(Direction),
    Failed(Direction, io::Error),
}

async fn run_reader<R>(
    mut reader: R,
    direction: Direction,
    read_size: usize,
    chunks: mpsc::Sender<Chunk>,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; read_size];
    loop {
        let chunk = match reader.read(&mut buf).await {
            Ok(0) => Chunk::Eof(direction),
            Ok(n) => Chunk::Data(direction, Bytes::copy_from_slice(&buf[..n])),
            Err(source) => Chunk::Failed(direction, source),
        };
        let last = !matches!(chunk, Chunk::Data(..));
        if chunks.send(chunk).await.is_err() || last {
            return;
        }
    }
}

/// Frame both directions of a connection with one accumulator.
async fn run_turnaround(
    mut chunks: mpsc::Receiver<Chunk>,
    config: SplitterConfig,
    tx: mpsc::Sender<FrameResult>,
) {
    let mut accumulator = FrameAccumulator::new(Direction::ClientToServer, &config);
    let mut open = 2;
    debug!(strategy = %config.strategy, "turnaround framer started");

    while open > 0 {
        let Some(chunk) = chunks.recv().await else {
            break;
        };
        match chunk {
            Chunk::Data(direction, data) => {
                for frame in accumulator.push_from(direction, &data, Instant::now()) {
                    if !emit(&tx, frame).await {
                        return;
                    }
                }
            }
            Chunk::Eof(direction) => {
                debug!(direction = %direction, "splitter reached end of stream");
                open -= 1;
            }
            Chunk::Failed(direction, source) => {
                warn!(direction = %direction, error = %source, "splitter read failed");
                if accumulator.direction() == direction {
                    if let Some(frame) = accumulator.finish() {
                        if !emit(&tx, frame).await {
                            return;
                        }
                    }
                }
                if tx
                    .send(Err(SplitterError::Read { direction, source }))
                    .await
                    .is_err()
                {
                    return;
                }
                open -= 1;
            }
        }
    }

    if let Some(frame) = accumulator.finish() {
        let _ = emit(&tx, frame).await;
    }
}

async fn run_worker<R, W>(
    mut reader: R,
    mut writer: Option<W>,
    direction: Direction,
    config: SplitterConfig,
    tx: mpsc::Sender<FrameResult>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut accumulator = FrameAccumulator::new(direction, &config);
    let mut buf = vec![0u8; config.read_buffer_size.max(1)];
    debug!(
        direction = %direction,
        strategy = %config.strategy,
        "splitter worker started"
    );

    loop {
        let read = match accumulator.idle_deadline() {
            Some(deadline) => match time::timeout_at(deadline, reader.read(&mut buf)).await {
                Ok(result) => result,
                Err(_) => {
                    if let Some(frame) = accumulator.flush_idle(Instant::now()) {
                        if !emit(&tx, frame).await {
                            return;
                        }
                    }
                    continue;
                }
            },
            None => reader.read(&mut buf).await,
        };

        match read {
            Ok(0) => {
                if let Some(frame) = accumulator.finish() {
                    let _ = emit(&tx, frame).await;
                }
                if let Some(writer) = writer.as_mut() {
                    if let Err(err) = writer.shutdown().await {
                        debug!(direction = %direction, error = %err, "forward shutdown failed");
                    }
                }
                debug!(direction = %direction, "splitter reached end of stream");
                return;
            }
            Ok(n) => {
                if let Some(writer) = writer.as_mut() {
                    if let Err(source) = writer.write_all(&buf[..n]).await {
                        warn!(direction = %direction, error = %source, "forward write failed");
                        if let Some(frame) = accumulator.finish() {
                            let _ = emit(&tx, frame).await;
                        }
                        let _ = tx.send(Err(SplitterError::Forward { direction, source })).await;
                        return;
                    }
                }
                for frame in accumulator.push(&buf[..n], Instant::now()) {
                    if !emit(&tx, frame).await {
                        return;
                    }
                }
            }
            Err(source) => {
                warn!(direction = %direction, error = %source, "splitter read failed");
                if let Some(frame) = accumulator.finish() {
                    let _ = emit(&tx, frame).await;
                }
                let _ = tx.send(Err(SplitterError::Read { direction, source })).await;
                return;
            }
        }
    }
}
