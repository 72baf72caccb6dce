//! Client actor: one connected peer from upgrade through disconnect.
//!
//! Ingest runs on the connection task and forwards every data frame to the
//! hub. Dispatch runs on a spawned task, drains the outbound queue and sends
//! keepalive pings. Whichever loop ends first stops the other.

use std::fmt::Display;
use std::sync::Arc;
use std::time::{Duration, Instant as StdInstant};

use axum::extract::ws::{CloseFrame, Message as WsMessage, close_code};
use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use metrics::{counter, histogram};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::ServerConfig;
use crate::errors::RelayError;
use crate::hub::{Client, HubHandle, Membership, OutboundReceiver};
use crate::metrics as m;

/// Run a client actor for an upgraded socket.
///
/// Registers `name` with the hub. If another connection won the name in the
/// meantime, the peer gets a policy-violation close frame instead.
#[instrument(skip_all, fields(name = %name))]
pub async fn run_client<S, E>(mut socket: S, name: String, hub: HubHandle, config: Arc<ServerConfig>)
where
    S: Stream<Item = Result<WsMessage, E>> + Sink<WsMessage> + Unpin + Send + 'static,
    <S as Sink<WsMessage>>::Error: Display + Send,
    E: Display + Send,
{
    let (client, outbound) = Client::new(name, config.outbound_queue_capacity);
    let member = client.membership();

    if let Err(err) = hub.register(client).await {
        let code = match err {
            RelayError::HandshakeRejected { .. } => close_code::POLICY,
            _ => close_code::AWAY,
        };
        warn!(client_id = %member.id, error = %err, "closing connection, registration failed");
        let frame = CloseFrame {
            code,
            reason: err.to_string().into(),
        };
        if let Err(e) = write_frame(&mut socket, WsMessage::Close(Some(frame)), config.write_timeout()).await {
            debug!(client_id = %member.id, error = %e, "close frame not delivered");
        }
        return;
    }

    let connected_at = StdInstant::now();
    info!(client_id = %member.id, "client connected");

    let (sink, stream) = socket.split();
    let stop = CancellationToken::new();

    let dispatch = tokio::spawn(dispatch_loop(
        sink,
        outbound,
        config.keepalive_interval(),
        config.write_timeout(),
        stop.clone(),
    ));

    let ingest = ingest_loop(stream, &member, &hub, config.read_idle_timeout(), stop.clone()).await;

    hub.unregister(&member.name, &member.id).await;
    // An evicted client's queue is already closed; let dispatch flush it and
    // send the close frame.
    if !matches!(ingest, Err(RelayError::Evicted { .. })) {
        stop.cancel();
    }

    let dispatch = match dispatch.await {
        Ok(result) => result,
        Err(e) => Err(RelayError::WriteFailure(e.to_string())),
    };

    for result in [&ingest, &dispatch] {
        let Err(err) = result else { continue };
        match err {
            RelayError::ReadFailure(_) | RelayError::WriteFailure(_) => {
                warn!(client_id = %member.id, error = %err, "connection failed");
            }
            RelayError::Evicted { .. } => {
                warn!(client_id = %member.id, error = %err, "connection ended by eviction");
            }
            _ => debug!(client_id = %member.id, error = %err, "connection ended"),
        }
    }

    let duration = connected_at.elapsed();
    info!(
        client_id = %member.id,
        duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        total_users = hub.connected_count(),
        "client disconnected"
    );
    counter!(m::DISCONNECTIONS_TOTAL).increment(1);
    histogram!(m::CONNECTION_DURATION_SECONDS).record(duration.as_secs_f64());
}

/// Read frames and hand data payloads to the hub.
///
/// Returns `Ok` on a clean close or when `stop` fires, and
/// [`RelayError::Evicted`] once the hub evicts `member`. The read-idle
/// deadline is only pushed back by a pong.
pub(crate) async fn ingest_loop<S, E>(
    mut stream: S,
    member: &Membership,
    hub: &HubHandle,
    read_idle: Duration,
    stop: CancellationToken,
) -> Result<(), RelayError>
where
    S: Stream<Item = Result<WsMessage, E>> + Unpin,
    E: Display,
{
    let mut deadline = Instant::now() + read_idle;
    loop {
        let frame = tokio::select! {
            biased;

            () = stop.cancelled() => return Ok(()),
            () = member.evicted() => {
                return Err(RelayError::Evicted {
                    name: member.name.clone(),
                });
            }
            next = tokio::time::timeout_at(deadline, stream.next()) => match next {
                Err(_) => {
                    return Err(RelayError::ReadFailure(format!(
                        "no keepalive response within {}ms",
                        read_idle.as_millis()
                    )));
                }
                Ok(None) => return Ok(()),
                Ok(Some(Err(e))) => return Err(RelayError::ReadFailure(e.to_string())),
                Ok(Some(Ok(frame))) => frame,
            },
        };

        match frame {
            WsMessage::Binary(data) => hub.broadcast(member.message(data)).await?,
            WsMessage::Text(text) => {
                let data = Bytes::copy_from_slice(text.as_str().as_bytes());
                hub.broadcast(member.message(data)).await?;
            }
            WsMessage::Pong(_) => deadline = Instant::now() + read_idle,
            // Answered by the protocol layer
            WsMessage::Ping(_) => {}
            WsMessage::Close(_) => {
                debug!("client sent close frame");
                return Ok(());
            }
        }
    }
}

/// Drain the outbound queue to the peer and send keepalive pings.
///
/// Cancels `stop` on exit so ingest ends too. Sends a close frame once the
/// queue is closed and drained.
pub(crate) async fn dispatch_loop<S>(
    mut sink: S,
    mut outbound: OutboundReceiver,
    keepalive: Duration,
    write_timeout: Duration,
    stop: CancellationToken,
) -> Result<(), RelayError>
where
    S: Sink<WsMessage> + Unpin,
    S::Error: Display,
{
    let _guard = stop.clone().drop_guard();
    let mut ticker = tokio::time::interval_at(Instant::now() + keepalive, keepalive);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            () = stop.cancelled() => return Ok(()),
            next = outbound.recv() => match next {
                Some(payload) => write_frame(&mut sink, WsMessage::Binary(payload), write_timeout).await?,
                None => {
                    let _ = write_frame(&mut sink, WsMessage::Close(None), write_timeout).await;
                    return Ok(());
                }
            },
            _ = ticker.tick() => {
                write_frame(&mut sink, WsMessage::Ping(Bytes::new()), write_timeout).await?;
            }
        }
    }
}

async fn write_frame<S>(sink: &mut S, frame: WsMessage, timeout: Duration) -> Result<(), RelayError>
where
    S: Sink<WsMessage> + Unpin,
    S::Error: Display,
{
    match tokio::time::timeout(timeout, sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(RelayError::WriteFailure(e.to_string())),
        Err(_) => Err(RelayError::WriteFailure(format!(
            "write timed out after {}ms",
            timeout.as_millis()
        ))),
    }
}
