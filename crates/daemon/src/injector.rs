use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use zeromq::{RepSocket, Socket, SocketRecv, SocketSend, ZmqMessage};

use model::{Modification, ModificationKind, Platform, Station, Train, TransportKind, Wing};

use crate::supervisor::{Continuation, Task};
use crate::Context;

/// A synthesized train as posted on the injector channel.
#[derive(Debug, Deserialize)]
pub struct InjectRequest {
    pub service_id: i64,
    /// Zero for a purely synthetic train without a public number.
    pub service_number: i64,
    pub service_date: NaiveDate,
    pub stop_code: String,
    pub transmode_text: String,
    pub transmode_code: String,
    pub company: String,
    pub departure: DateTime<Utc>,
    /// Delay in minutes on top of the departure time.
    #[serde(default)]
    pub departure_delay: i64,
    #[serde(default)]
    pub platform: Option<String>,
    pub destination_code: String,
    pub destination_text: String,
    /// Stopping pattern as (code, name) pairs.
    pub stops: Vec<(String, String)>,
    /// Headline via-stations as (code, name) pairs.
    #[serde(default)]
    pub via: Vec<(String, String)>,
    #[serde(default)]
    pub do_not_board: bool,
    #[serde(default)]
    pub cancelled: bool,
}

impl InjectRequest {
    /// Trip ids from the injector live in their own key space: a purely
    /// synthetic train gets an "i" prefix so it can never collide with a
    /// feed-assigned id; a real service number is used as-is.
    pub fn trip_id(&self) -> String {
        if self.service_number == 0 {
            format!("i{}", self.service_id)
        } else {
            self.service_number.to_string()
        }
    }

    /// Build the synthetic train. The request's display texts double as all
    /// station name lengths; `now` becomes the message timestamp.
    pub fn build_train(&self, now: DateTime<Utc>) -> Train {
        let trip_id = self.trip_id();
        let destination =
            Station::with_name(self.destination_code.clone(), self.destination_text.clone());
        let platform: Vec<Platform> = self
            .platform
            .iter()
            .map(|platform| Platform::parse(platform))
            .collect();
        let stops: Vec<Station> = self
            .stops
            .iter()
            .map(|(code, name)| Station::with_name(code.clone(), name.clone()))
            .collect();
        let via: Vec<Station> = self
            .via
            .iter()
            .map(|(code, name)| Station::with_name(code.clone(), name.clone()))
            .collect();

        let mut wing = Wing::towards(destination.clone());
        wing.planned_platform = platform.clone();
        wing.current_platform = platform.clone();
        wing.planned_stops = stops.clone();
        wing.current_stops = stops;

        let mut modifications = Vec::new();
        if self.cancelled {
            modifications.push(Modification::new(ModificationKind::Cancelled));
        }

        Train {
            train_number: trip_id.clone(),
            trip_id,
            trip_station: Station::with_name(self.stop_code.clone(), self.stop_code.clone()),
            trip_date: self.service_date,
            message_timestamp: now,
            transport_kind: TransportKind {
                code: self.transmode_code.clone(),
                name: self.transmode_text.clone(),
            },
            carrier: self.company.clone(),
            train_name: None,
            status: "0".to_owned(),
            planned_departure: self.departure,
            current_departure: self.departure + Duration::minutes(self.departure_delay),
            exact_delay_seconds: self.departure_delay * 60,
            damped_delay_seconds: self.departure_delay * 60,
            planned_platform: platform.clone(),
            current_platform: platform,
            planned_destinations: vec![destination.clone()],
            current_destinations: vec![destination],
            planned_short_route: via.clone(),
            current_short_route: via,
            reservation_required: false,
            supplement_required: false,
            do_not_board: self.do_not_board,
            special_ticket: false,
            shunting: false,
            rear_stays_behind: false,
            wings: vec![wing],
            modifications,
            travel_tips: Vec::new(),
            boarding_tips: Vec::new(),
            transfer_tips: Vec::new(),
            synthetic: true,
            departed_timestamp: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InjectReply {
    pub result: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InjectReply {
    fn ok() -> Self {
        Self {
            result: true,
            error: None,
        }
    }

    fn error(why: impl fmt::Display) -> Self {
        Self {
            result: false,
            error: Some(why.to_string()),
        }
    }
}

/// The administrative request/reply endpoint: JSON in, JSON out. A request
/// that does not parse gets an error reply; the server carries on.
pub struct InjectorServer {
    socket: RepSocket,
    ctx: Context,
    shutdown: CancellationToken,
}

impl InjectorServer {
    pub async fn bind(
        endpoint: &str,
        ctx: Context,
        shutdown: CancellationToken,
    ) -> Result<Self, zeromq::ZmqError> {
        let mut socket = RepSocket::new();
        socket.bind(endpoint).await?;
        log::info!("injector channel listening on {}", endpoint);
        Ok(Self {
            socket,
            ctx,
            shutdown,
        })
    }
}

#[async_trait]
impl Task for InjectorServer {
    type Error = zeromq::ZmqError;

    fn name(&self) -> &'static str {
        "injector-server"
    }

    async fn run(&mut self) -> Result<Continuation, zeromq::ZmqError> {
        let request = tokio::select! {
            _ = self.shutdown.cancelled() => return Ok(Continuation::Exit),
            request = self.socket.recv() => request?,
        };

        let payload = request.get(0).map(|frame| frame.to_vec()).unwrap_or_default();
        let reply = handle(&self.ctx, &payload).await;
        let encoded = serde_json::to_vec(&reply)
            .unwrap_or_else(|_| br#"{"result":false}"#.to_vec());
        self.socket.send(ZmqMessage::from(encoded)).await?;
        Ok(Continuation::Continue)
    }
}

/// Process one injection request.
pub(crate) async fn handle(ctx: &Context, payload: &[u8]) -> InjectReply {
    let request: InjectRequest = match serde_json::from_slice(payload) {
        Ok(request) => request,
        Err(why) => {
            log::warn!("rejecting injection: {}", why);
            return InjectReply::error(why);
        }
    };

    let now = Utc::now();
    let train = request.build_train(now);
    log::info!(
        "injecting train {} at {} towards {}",
        train.trip_id,
        train.trip_station.code,
        request.destination_text
    );
    ctx.store.apply(train, now).await;
    ctx.metrics.count_injection();
    InjectReply::ok()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::query;
    use crate::testutil;

    use super::*;

    fn request(service_id: i64, service_number: i64) -> serde_json::Value {
        json!({
            "service_id": service_id,
            "service_number": service_number,
            "service_date": "2014-04-12",
            "stop_code": "RTD",
            "transmode_text": "Sprintercity",
            "transmode_code": "SPC",
            "company": "GeertWays",
            "departure": "2014-04-12T12:30:00Z",
            "departure_delay": 2,
            "platform": "4a",
            "destination_code": "LAA",
            "destination_text": "Den Haag Laan van NOI",
            "stops": [["GD", "Gouda"], ["LAA", "Den Haag Laan van NOI"]],
            "via": [["GD", "Gouda"]],
            "do_not_board": false,
            "cancelled": false
        })
    }

    #[tokio::test]
    async fn synthetic_train_gets_prefixed_trip_id() {
        let ctx = testutil::context();

        let reply = handle(&ctx, request(42, 0).to_string().as_bytes()).await;
        assert!(reply.result);
        assert_eq!(reply.error, None);

        let bucket = ctx.store.train_snapshot("i42").await.unwrap();
        let train = &bucket["RTD"];
        assert_eq!(train.trip_id, "i42");
        assert!(train.synthetic);
        assert_eq!(train.carrier, "GeertWays");
        assert_eq!(train.current_platform, vec![Platform::parse("4a")]);
        assert_eq!(train.exact_delay_seconds, 120);
        assert_eq!(train.wings.len(), 1);
        assert_eq!(train.wings[0].planned_stops.len(), 2);
        assert_eq!(ctx.metrics.counter("injecties"), Some(1));

        // reachable over the client channel as well
        let reply: serde_json::Value =
            rmp_serde::from_slice(&query::answer(&ctx, "trein/i42").await).unwrap();
        assert_eq!(reply["data"]["RTD"]["trip_id"], "i42");
    }

    #[tokio::test]
    async fn numbered_service_uses_its_number() {
        let ctx = testutil::context();

        let reply = handle(&ctx, request(42, 99).to_string().as_bytes()).await;
        assert!(reply.result);

        let bucket = ctx.store.train_snapshot("99").await.unwrap();
        assert_eq!(bucket["RTD"].train_number, "99");
    }

    #[tokio::test]
    async fn cancelled_injection_carries_a_modification() {
        let ctx = testutil::context();
        let mut body = request(7, 0);
        body["cancelled"] = serde_json::Value::Bool(true);

        handle(&ctx, body.to_string().as_bytes()).await;

        let bucket = ctx.store.train_snapshot("i7").await.unwrap();
        assert!(bucket["RTD"].is_cancelled());
    }

    #[tokio::test]
    async fn malformed_request_is_rejected() {
        let ctx = testutil::context();

        let reply = handle(&ctx, b"{\"service_id\": ").await;
        assert!(!reply.result);
        assert!(reply.error.is_some());
        assert_eq!(ctx.metrics.counter("injecties"), Some(0));
        assert_eq!(ctx.store.train_count().await, 0);
    }
}
