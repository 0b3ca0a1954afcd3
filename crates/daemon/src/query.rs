use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use zeromq::{RepSocket, Socket, SocketRecv, SocketSend, ZmqMessage};

use crate::store::Bucket;
use crate::supervisor::{Continuation, Task};
use crate::Context;

/// Reply to the station/ and trein/ commands: the system status plus the
/// requested bucket.
#[derive(Debug, Serialize)]
struct TrainsReply {
    status: String,
    data: Bucket,
}

/// The client-facing request/reply endpoint. Commands are ASCII path
/// strings; every request gets exactly one reply, MessagePack-encoded with
/// field names so any client can decode it. Unknown commands and internal
/// errors produce a nil reply.
pub struct QueryServer {
    socket: RepSocket,
    ctx: Context,
    shutdown: CancellationToken,
}

impl QueryServer {
    pub async fn bind(
        endpoint: &str,
        ctx: Context,
        shutdown: CancellationToken,
    ) -> Result<Self, zeromq::ZmqError> {
        let mut socket = RepSocket::new();
        socket.bind(endpoint).await?;
        log::info!("client channel listening on {}", endpoint);
        Ok(Self {
            socket,
            ctx,
            shutdown,
        })
    }
}

#[async_trait]
impl Task for QueryServer {
    type Error = zeromq::ZmqError;

    fn name(&self) -> &'static str {
        "query-server"
    }

    async fn run(&mut self) -> Result<Continuation, zeromq::ZmqError> {
        let request = tokio::select! {
            _ = self.shutdown.cancelled() => return Ok(Continuation::Exit),
            request = self.socket.recv() => request?,
        };

        let command = request
            .get(0)
            .map(|frame| String::from_utf8_lossy(frame).into_owned())
            .unwrap_or_default();

        let reply = answer(&self.ctx, command.trim()).await;
        self.socket.send(ZmqMessage::from(reply)).await?;
        Ok(Continuation::Continue)
    }
}

/// Answer one command. Serialization problems degrade to a nil reply; the
/// server itself never dies over a request.
pub(crate) async fn answer(ctx: &Context, command: &str) -> Vec<u8> {
    match build_reply(ctx, command).await {
        Ok(reply) => reply,
        Err(why) => {
            log::error!("cannot serialize reply to {:?}: {}", command, why);
            nil()
        }
    }
}

async fn build_reply(ctx: &Context, command: &str) -> Result<Vec<u8>, rmp_serde::encode::Error> {
    match command {
        "store/station" => encode(&ctx.store.dump_by_station().await),
        "store/trein" => encode(&ctx.store.dump_by_train().await),
        "count/station" => encode(&(ctx.store.station_count().await as u64)),
        "count/trein" => encode(&(ctx.store.train_count().await as u64)),
        "status" => encode(&ctx.health.read().await.report()),
        "status/status" => encode(&ctx.health.read().await.status().as_str()),
        _ => {
            if let Some(code) = command.strip_prefix("station/") {
                let bucket = ctx.store.station_snapshot(&code.to_uppercase()).await;
                trains_reply(ctx, bucket).await
            } else if let Some(number) = command.strip_prefix("trein/") {
                let bucket = ctx.store.train_snapshot(number).await;
                trains_reply(ctx, bucket).await
            } else if let Some(name) = command.strip_prefix("count/") {
                match ctx.metrics.counter(name) {
                    Some(value) => encode(&value),
                    None => Ok(nil()),
                }
            } else {
                log::info!("unknown command {:?}", command);
                Ok(nil())
            }
        }
    }
}

async fn trains_reply(
    ctx: &Context,
    bucket: Option<Bucket>,
) -> Result<Vec<u8>, rmp_serde::encode::Error> {
    match bucket {
        Some(data) => {
            let status = ctx.health.read().await.status().as_str().to_owned();
            encode(&TrainsReply { status, data })
        }
        // unknown key: an empty map, not nil
        None => encode(&Bucket::new()),
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, rmp_serde::encode::Error> {
    rmp_serde::to_vec_named(value)
}

/// The MessagePack nil byte, used as the null reply.
fn nil() -> Vec<u8> {
    vec![0xc0]
}
