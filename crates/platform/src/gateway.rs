//! Minimal gateway client: hello → identify → heartbeat → dispatch. Each
//! dispatch becomes a [`PlatformEvent`] on the outbound channel; the session
//! reconnects after any close.

use std::time::Duration;

use {
    futures::{Sink, SinkExt, Stream, StreamExt},
    serde_json::{Value, json},
    tokio::sync::mpsc,
    tokio_tungstenite::{connect_async, tungstenite::Message},
    tracing::{debug, info, warn},
};

use crate::{
    error::{Error, Result},
    types::{PlatformEvent, WireMessage},
};

/// Servers, server members, server messages, message content.
const INTENTS: u64 = (1 << 0) | (1 << 1) | (1 << 9) | (1 << 15);

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Run gateway sessions forever, reconnecting on close. Returns once the
/// event receiver has been dropped.
pub async fn run(gateway_url: &str, token: &str, tx: mpsc::Sender<PlatformEvent>) {
    loop {
        match session(gateway_url, token, &tx).await {
            Ok(()) => info!("gateway session closed"),
            Err(e) => warn!(error = %e, "gateway session ended"),
        }
        if tx.is_closed() {
            return;
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

async fn session(gateway_url: &str, token: &str, tx: &mpsc::Sender<PlatformEvent>) -> Result<()> {
    let (mut ws, _) = connect_async(gateway_url)
        .await
        .map_err(|e| Error::Gateway(e.to_string()))?;

    // First frame must be hello with the heartbeat interval.
    let hello = next_json(&mut ws).await?;
    if hello["op"].as_u64() != Some(10) {
        return Err(Error::Gateway("expected hello".into()));
    }
    let heartbeat_ms = hello["d"]["heartbeat_interval"].as_u64().unwrap_or(41_250);
    let heartbeat = Duration::from_millis(heartbeat_ms);

    let identify = json!({
        "op": 2,
        "d": {
            "token": token,
            "intents": INTENTS,
            "properties": { "os": "linux", "browser": "babelink", "device": "babelink" },
        },
    });
    send_json(&mut ws, &identify).await?;

    let mut seq: Option<u64> = None;
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + heartbeat, heartbeat);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                send_json(&mut ws, &json!({ "op": 1, "d": seq })).await?;
            }
            frame = ws.next() => {
                let Some(frame) = frame else {
                    return Err(Error::Gateway("socket closed".into()));
                };
                let frame = frame.map_err(|e| Error::Gateway(e.to_string()))?;
                match frame {
                    Message::Text(txt) => {
                        let Ok(payload) = serde_json::from_str::<Value>(txt.as_str()) else {
                            continue;
                        };
                        match payload["op"].as_u64() {
                            Some(0) => {
                                if let Some(s) = payload["s"].as_u64() {
                                    seq = Some(s);
                                }
                                if let Some(event) = dispatch(&payload) {
                                    // Receiver gone means shutdown.
                                    if tx.send(event).await.is_err() {
                                        return Ok(());
                                    }
                                }
                            },
                            // Immediate heartbeat request.
                            Some(1) => send_json(&mut ws, &json!({ "op": 1, "d": seq })).await?,
                            Some(7) | Some(9) => {
                                return Err(Error::Gateway("server requested reconnect".into()));
                            },
                            Some(11) => debug!("heartbeat ack"),
                            _ => {},
                        }
                    },
                    Message::Ping(data) => {
                        ws.send(Message::Pong(data))
                            .await
                            .map_err(|e| Error::Gateway(e.to_string()))?;
                    },
                    Message::Close(_) => return Err(Error::Gateway("close frame".into())),
                    _ => {},
                }
            }
        }
    }
}

async fn next_json<S>(ws: &mut S) -> Result<Value>
where
    S: Stream<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let frame = ws
            .next()
            .await
            .ok_or_else(|| Error::Gateway("socket closed".into()))?
            .map_err(|e| Error::Gateway(e.to_string()))?;
        if let Message::Text(txt) = frame {
            return serde_json::from_str(txt.as_str())
                .map_err(|e| Error::Gateway(e.to_string()));
        }
    }
}

async fn send_json<S>(ws: &mut S, payload: &Value) -> Result<()>
where
    S: Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    ws.send(Message::Text(payload.to_string().into()))
        .await
        .map_err(|e| Error::Gateway(e.to_string()))
}

/// Map a dispatch payload onto a relay event. Unknown event types are
/// dropped silently.
fn dispatch(payload: &Value) -> Option<PlatformEvent> {
    let data = payload.get("d")?;
    match payload["t"].as_str()? {
        "READY" => {
            let user_id = data["user"]["id"].as_str()?.parse().ok()?;
            Some(PlatformEvent::Ready { user_id })
        },
        "MESSAGE_CREATE" => {
            let wire: WireMessage = serde_json::from_value(data.clone()).ok()?;
            Some(PlatformEvent::MessageCreate(wire.into()))
        },
        "MESSAGE_UPDATE" => {
            let wire: WireMessage = serde_json::from_value(data.clone()).ok()?;
            Some(PlatformEvent::MessageUpdate(wire.into()))
        },
        "GUILD_CREATE" => Some(PlatformEvent::ServerJoin {
            server_id: data["id"].as_str()?.parse().ok()?,
            name: data["name"].as_str().unwrap_or_default().to_string(),
        }),
        "GUILD_DELETE" => Some(PlatformEvent::ServerLeave {
            server_id: data["id"].as_str()?.parse().ok()?,
        }),
        _ => None,
    }
}
