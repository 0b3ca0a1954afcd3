use std::convert::Infallible;
use std::error;
use std::fmt;
use std::io::Read;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use flate2::read::MultiGzDecoder;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use zeromq::{Socket, SocketRecv, SubSocket};

use model::Train;

use crate::config::Config;
use crate::store::UpdateOutcome;
use crate::supervisor::{Continuation, SupervisionStrategy, Task};
use crate::Context;

/// Log stale messages at warning level once the gap exceeds this many
/// seconds; smaller gaps are routine reordering.
const STALE_WARN_GAP_SECONDS: i64 = 5;

#[derive(Debug)]
pub enum IngestError {
    Socket(zeromq::ZmqError),
    Payload(std::io::Error),
}

impl error::Error for IngestError {}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            IngestError::Socket(why) => write!(f, "feed socket error: {}", why),
            IngestError::Payload(why) => write!(f, "cannot decompress payload: {}", why),
        }
    }
}

impl From<zeromq::ZmqError> for IngestError {
    fn from(why: zeromq::ZmqError) -> Self {
        IngestError::Socket(why)
    }
}

impl From<std::io::Error> for IngestError {
    fn from(why: std::io::Error) -> Self {
        IngestError::Payload(why)
    }
}

/// Subscribes to the upstream feed and pushes raw payloads onto the work
/// queue. The queue is unbounded so a stalled worker never causes receive
/// side drops upstream. On a socket error the subscription is rebuilt after
/// a short backoff.
pub struct FeedReader {
    endpoint: String,
    envelope: String,
    socket: Option<SubSocket>,
    queue: mpsc::UnboundedSender<Vec<u8>>,
    shutdown: CancellationToken,
}

impl FeedReader {
    pub fn new(
        config: &Config,
        queue: mpsc::UnboundedSender<Vec<u8>>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            endpoint: config.bindings.dvs_server.clone(),
            envelope: config.zmq.envelope.clone().unwrap_or_default(),
            socket: None,
            queue,
            shutdown,
        }
    }

    async fn open(&self) -> Result<SubSocket, IngestError> {
        let mut socket = SubSocket::new();
        socket.connect(&self.endpoint).await?;
        socket.subscribe(&self.envelope).await?;
        log::info!("collecting updates from {}", self.endpoint);
        Ok(socket)
    }
}

#[async_trait]
impl Task for FeedReader {
    type Error = IngestError;

    fn name(&self) -> &'static str {
        "feed-reader"
    }

    async fn run(&mut self) -> Result<Continuation, IngestError> {
        if self.socket.is_none() {
            self.socket = Some(self.open().await?);
        }
        let Some(socket) = self.socket.as_mut() else {
            return Ok(Continuation::Continue);
        };

        let received = tokio::select! {
            _ = self.shutdown.cancelled() => return Ok(Continuation::Exit),
            received = socket.recv() => received,
        };

        let message = match received {
            Ok(message) => message,
            Err(why) => {
                // rebuild the subscription on the next unit of work
                self.socket = None;
                return Err(IngestError::Socket(why));
            }
        };

        // frame 0 is the envelope; the remaining frames concatenate to one
        // gzip stream
        let frames = message.into_vec();
        if frames.len() < 2 {
            log::warn!("ignoring feed message with {} frame(s)", frames.len());
            return Ok(Continuation::Continue);
        }
        let mut payload = Vec::new();
        for frame in &frames[1..] {
            payload.extend_from_slice(frame);
        }

        if self.queue.send(payload).is_err() {
            // worker is gone, nothing left to feed
            return Ok(Continuation::Exit);
        }
        Ok(Continuation::Continue)
    }

    fn on_error(&self, _error: &IngestError) -> SupervisionStrategy {
        SupervisionStrategy::Backoff(Duration::from_secs(1))
    }
}

/// Drains the work queue: decompress, decode, apply. Malformed messages are
/// logged and dropped; the worker never stops over a bad payload.
pub struct FeedWorker {
    queue: mpsc::UnboundedReceiver<Vec<u8>>,
    ctx: Context,
    shutdown: CancellationToken,
}

impl FeedWorker {
    pub fn new(
        queue: mpsc::UnboundedReceiver<Vec<u8>>,
        ctx: Context,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            queue,
            ctx,
            shutdown,
        }
    }

    async fn process(&self, payload: &[u8]) {
        let xml = match decompress(payload) {
            Ok(xml) => xml,
            Err(why) => {
                log::error!("{}", why);
                log::debug!("offending payload: {:02x?}", payload);
                return;
            }
        };
        let train = match infoplus::decode_train(&xml) {
            Ok(train) => train,
            Err(why) => {
                log::error!("dropping malformed feed message: {}", why);
                log::debug!("offending document: {}", xml);
                return;
            }
        };
        self.apply(train).await;
    }

    async fn apply(&self, train: Train) {
        let number = train.train_number.clone();
        let station = train.trip_station.code.clone();
        let status = train.status.clone();
        let departed = train.is_departed();

        match self.ctx.store.apply(train, Utc::now()).await {
            UpdateOutcome::Installed => {
                if departed {
                    log::info!("train {} departed from {}", number, station);
                } else if status == "2" {
                    log::debug!("train {} arrived at {}", number, station);
                } else if status == "0" {
                    log::debug!("train {} at {} has unknown status", number, station);
                }
            }
            UpdateOutcome::Duplicate => {
                self.ctx.metrics.count_duplicate();
                log::info!("duplicate message for train {} at {}", number, station);
            }
            UpdateOutcome::Stale { gap } => {
                self.ctx.metrics.count_stale();
                if gap.num_seconds() > STALE_WARN_GAP_SECONDS {
                    log::warn!(
                        "out-of-order message for train {} at {}, {}s behind",
                        number,
                        station,
                        gap.num_seconds()
                    );
                } else {
                    log::info!("out-of-order message for train {} at {}", number, station);
                }
            }
        }
    }
}

#[async_trait]
impl Task for FeedWorker {
    type Error = Infallible;

    fn name(&self) -> &'static str {
        "ingest-worker"
    }

    async fn run(&mut self) -> Result<Continuation, Infallible> {
        let payload = tokio::select! {
            _ = self.shutdown.cancelled() => return Ok(Continuation::Exit),
            payload = self.queue.recv() => payload,
        };
        let Some(payload) = payload else {
            return Ok(Continuation::Exit);
        };

        // every consumed payload counts, success or failure
        self.ctx.metrics.count_message();
        self.process(&payload).await;
        Ok(Continuation::Continue)
    }
}

fn decompress(payload: &[u8]) -> Result<String, IngestError> {
    let mut xml = String::new();
    MultiGzDecoder::new(payload).read_to_string(&mut xml)?;
    Ok(xml)
}
