use crate::domain::{Command, SimError, Snapshot};
use crate::interface_adapters::net::frames::SnapshotFrames;
use crate::interface_adapters::protocol::{ClientMessage, CommandDto, ServerMessage};
use crate::interface_adapters::state::AppState;
use crate::use_cases::{SimHandle, Subscription};

use axum::{
    Error,
    extract::{
        State,
        ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade, close_code},
    },
    response::IntoResponse,
};
use futures::{Sink, SinkExt};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::time::timeout;
use tracing::{Instrument, debug, info, info_span, warn};

#[derive(Debug)]
enum NetError {
    // Categorizes connection lifecycle failures so callers can decide policy.
    #[allow(dead_code)]
    Ws(axum::Error),
    #[allow(dead_code)]
    Serialization(serde_json::Error),
    // The peer stopped reading and the socket stayed full.
    SendTimeout,
}

impl From<axum::Error> for NetError {
    fn from(e: axum::Error) -> Self {
        NetError::Ws(e)
    }
}

enum LoopControl {
    Continue,
    Disconnect,
}

const LOG_THROTTLE: Duration = Duration::from_secs(2);
const MAX_INVALID_JSON: u32 = 10;
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    // Registered as Connecting; nothing is delivered until the welcome is out.
    let subscription = state.hub.connect();
    let subscriber_id = subscription.id();
    let span = info_span!("conn", subscriber_id);

    async move {
        let welcome = ServerMessage::Welcome {
            subscriber_id,
            tick_interval_ms: state.tick_interval.as_millis() as u64,
        };
        if let Err(e) = send_message(&mut socket, &welcome).await {
            debug!(error = ?e, "failed to send welcome");
            return;
        }
        state.hub.activate(subscriber_id);
        info!(active = state.hub.active_count(), "subscriber connected");

        let mut ctx = ConnCtx::new(subscription, state.sim.clone(), state.frames.clone());
        if let Err(e) = run_client_loop(&mut socket, &mut ctx).await {
            warn!(error = ?e, "client loop exited with error");
        }

        debug!(
            msgs_in = ctx.msgs_in,
            msgs_out = ctx.msgs_out,
            bytes_in = ctx.bytes_in,
            bytes_out = ctx.bytes_out,
            commands = ctx.commands,
            rejected = ctx.rejected,
            invalid_json = ctx.invalid_json,
            "connection stats"
        );
        // Dropping the subscription closes it in the hub.
        drop(ctx);
        info!("subscriber disconnected");
    }
    .instrument(span)
    .await
}

struct ConnCtx {
    subscription: Subscription,
    sim: SimHandle,
    frames: Arc<SnapshotFrames>,

    msgs_in: u64,
    msgs_out: u64,
    bytes_in: u64,
    bytes_out: u64,
    commands: u64,
    rejected: u64,

    invalid_json: u32,
    last_invalid_log: Instant,

    close_frame: Option<CloseFrame>,
}

impl ConnCtx {
    fn new(subscription: Subscription, sim: SimHandle, frames: Arc<SnapshotFrames>) -> Self {
        Self {
            subscription,
            sim,
            frames,
            msgs_in: 0,
            msgs_out: 0,
            bytes_in: 0,
            bytes_out: 0,
            commands: 0,
            rejected: 0,
            invalid_json: 0,
            last_invalid_log: Instant::now(),
            close_frame: None,
        }
    }
}

async fn send_message(socket: &mut WebSocket, msg: &ServerMessage) -> Result<usize, NetError> {
    let txt = serde_json::to_string(msg).map_err(NetError::Serialization)?;
    let bytes = txt.len();
    send_frame(socket, Message::Text(txt.into()), SEND_TIMEOUT).await?;
    Ok(bytes)
}

// Every outbound write is bounded so a peer that stops reading cannot park the loop.
async fn send_frame<S>(sink: &mut S, msg: Message, limit: Duration) -> Result<(), NetError>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    match timeout(limit, sink.send(msg)).await {
        Ok(sent) => sent.map_err(NetError::Ws),
        Err(_) => Err(NetError::SendTimeout),
    }
}

fn should_log(last: &mut Instant) -> bool {
    if last.elapsed() >= LOG_THROTTLE {
        *last = Instant::now();
        true
    } else {
        false
    }
}

async fn run_client_loop(socket: &mut WebSocket, ctx: &mut ConnCtx) -> Result<(), NetError> {
    let mut fatal: Option<NetError> = None;

    loop {
        let disconnect: bool = tokio::select! {
            incoming = socket.recv() => {
                match handle_incoming_ws(socket, incoming, ctx).await {
                    Ok(LoopControl::Continue) => false,
                    Ok(LoopControl::Disconnect) => true,
                    Err(e) => {
                        fatal = Some(e);
                        true
                    }
                }
            }

            snapshot = ctx.subscription.recv() => {
                match snapshot {
                    Some(snapshot) => match forward_snapshot(&snapshot, socket, ctx).await {
                        LoopControl::Continue => false,
                        LoopControl::Disconnect => true,
                    },
                    None => {
                        // The hub stopped delivering after our queue overflowed.
                        warn!("subscriber lagged; closing");
                        ctx.close_frame = Some(CloseFrame {
                            code: close_code::POLICY,
                            reason: "subscriber lagged".into(),
                        });
                        true
                    }
                }
            }
        };

        if disconnect {
            if let Some(frame) = ctx.close_frame.take() {
                let _ = send_frame(socket, Message::Close(Some(frame)), SEND_TIMEOUT).await;
            }
            match timeout(SEND_TIMEOUT, socket.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => debug!(error = ?err, "socket close error"),
                Err(_) => debug!("socket close timed out"),
            }
            break;
        }
    }

    match fatal {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

async fn handle_incoming_ws(
    socket: &mut WebSocket,
    incoming: Option<Result<Message, Error>>,
    ctx: &mut ConnCtx,
) -> Result<LoopControl, NetError> {
    match incoming {
        Some(Ok(msg)) => match msg {
            Message::Text(text) => {
                ctx.msgs_in += 1;
                ctx.bytes_in += text.len() as u64;

                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Command(dto)) => handle_command(socket, dto, ctx).await,
                    Err(parse_err) if is_command_envelope(&text) => {
                        // Well-formed JSON with a bad command body is a rejection, not noise.
                        let request_id = command_request_id(&text);
                        let error = SimError::validation(parse_err.to_string());
                        reply_to_command(socket, request_id, Err(error), ctx).await
                    }
                    Err(parse_err) => {
                        ctx.invalid_json += 1;
                        if should_log(&mut ctx.last_invalid_log) {
                            warn!(
                                bytes = text.len(),
                                error = %parse_err,
                                "failed to parse client message"
                            );
                        }

                        if ctx.invalid_json > MAX_INVALID_JSON {
                            ctx.close_frame = Some(CloseFrame {
                                code: close_code::POLICY,
                                reason: "too many invalid messages".into(),
                            });
                            return Ok(LoopControl::Disconnect);
                        }

                        Ok(LoopControl::Continue)
                    }
                }
            }
            Message::Binary(_) => {
                ctx.close_frame = Some(CloseFrame {
                    code: close_code::UNSUPPORTED,
                    reason: "binary messages not supported".into(),
                });
                Ok(LoopControl::Disconnect)
            }
            Message::Ping(_) | Message::Pong(_) => Ok(LoopControl::Continue),
            Message::Close(_) => Ok(LoopControl::Disconnect),
        },
        Some(Err(e)) => {
            warn!(error = %e, "websocket recv error");
            Ok(LoopControl::Disconnect)
        }
        None => {
            info!("websocket closed");
            Ok(LoopControl::Disconnect)
        }
    }
}

// Validates, applies and acknowledges one command. Failures only reach this client.
async fn handle_command(
    socket: &mut WebSocket,
    dto: CommandDto,
    ctx: &mut ConnCtx,
) -> Result<LoopControl, NetError> {
    ctx.commands += 1;
    let request_id = dto.request_id;

    let result = match Command::try_from(dto) {
        Ok(command) => ctx.sim.send_command(command).await,
        Err(e) => Err(e),
    };

    reply_to_command(socket, request_id, result, ctx).await
}

async fn reply_to_command(
    socket: &mut WebSocket,
    request_id: Option<u64>,
    result: Result<(), SimError>,
    ctx: &mut ConnCtx,
) -> Result<LoopControl, NetError> {
    let reply = match result {
        Ok(()) => ServerMessage::CommandAccepted { request_id },
        Err(e) => {
            ctx.rejected += 1;
            if should_log(&mut ctx.last_invalid_log) {
                debug!(?request_id, error = %e, "command rejected");
            }
            ServerMessage::CommandRejected {
                request_id,
                error: e.to_string(),
            }
        }
    };

    match send_message(socket, &reply).await {
        Ok(bytes) => {
            ctx.msgs_out += 1;
            ctx.bytes_out += bytes as u64;
            Ok(LoopControl::Continue)
        }
        Err(err) => {
            warn!(error = ?err, "failed to send command reply");
            Ok(LoopControl::Disconnect)
        }
    }
}

fn is_command_envelope(text: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(text)
        .is_ok_and(|v| v.get("type").and_then(|t| t.as_str()) == Some("Command"))
}

fn command_request_id(text: &str) -> Option<u64> {
    let value = serde_json::from_str::<serde_json::Value>(text).ok()?;
    value.get("data")?.get("request_id")?.as_u64()
}

async fn forward_snapshot(
    snapshot: &Snapshot,
    socket: &mut WebSocket,
    ctx: &mut ConnCtx,
) -> LoopControl {
    let frame: Utf8Bytes = match ctx.frames.frame(snapshot) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(tick = snapshot.tick, error = %e, "failed to serialize snapshot");
            return LoopControl::Continue;
        }
    };
    let bytes = frame.as_str().len();
    match send_frame(socket, Message::Text(frame), SEND_TIMEOUT).await {
        Ok(()) => {
            ctx.msgs_out += 1;
            ctx.bytes_out += bytes as u64;
            LoopControl::Continue
        }
        Err(NetError::SendTimeout) => {
            // Ends the loop, which drops the subscription and closes it in the hub.
            warn!(tick = snapshot.tick, "snapshot send timed out; dropping subscriber");
            ctx.close_frame = Some(CloseFrame {
                code: close_code::POLICY,
                reason: "send timeout".into(),
            });
            LoopControl::Disconnect
        }
        Err(err) => {
            // Log unexpected send failures; disconnect will follow immediately.
            warn!(tick = snapshot.tick, error = ?err, "failed to send snapshot");
            LoopControl::Disconnect
        }
    }
}
