//! `serve-stdio`: one gateway peer speaking envelopes over stdin/stdout.
//!
//! Every line on stdin is one inbound envelope. Replies and room messages
//! are written to stdout as one JSON object per line; the peer fans room
//! messages out to its own clients by `tenant` and `doc_id`.

use std::io::{BufRead, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{Receiver, Select, TryRecvError};

use super::open_store;
use crate::Result;
use crate::collab::{
    BrokerLimits, BrokerSubscription, ChannelBroker, Dispatcher, Outbound, PresenceSweeper,
    PresenceTracker, RoomManager, SubscriberLimits,
};
use crate::config::Config;

pub fn serve_stdio(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let broker = ChannelBroker::new(BrokerLimits::from_limits(&config.limits));
    let subscription = broker.subscribe(
        config.collab.channel_prefix.clone(),
        SubscriberLimits::new(
            config.collab.subscriber_queue_events,
            config.collab.subscriber_queue_bytes,
        )?,
    )?;
    let presence = Arc::new(PresenceTracker::new(Duration::from_millis(
        config.collab.presence_ttl_ms,
    )));
    let manager = Arc::new(RoomManager::new(
        config.collab.clone(),
        config.limits.clone(),
        store,
        Arc::new(broker),
        Arc::clone(&presence),
    ));
    let mut sweeper = PresenceSweeper::start(
        presence,
        Duration::from_millis(config.collab.presence_sweep_interval_ms),
    );
    tracing::info!(
        process_id = %manager.process_id(),
        channel_prefix = %config.collab.channel_prefix,
        "serving envelopes on stdio"
    );

    let dispatcher = Dispatcher::new(manager);
    let lines = spawn_stdin_reader();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let result = run_loop(&dispatcher, &lines, &subscription, &mut out);

    sweeper.stop();
    tracing::info!(rooms = dispatcher.manager().room_count(), "stdio session ended");
    if let Err(err) = result {
        tracing::warn!(error = %err, "stdout closed");
    }
    Ok(())
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = crossbeam::channel::unbounded();
    thread::Builder::new()
        .name("valor-stdin".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                if tx.send(line).is_err() {
                    break;
                }
            }
        })
        .expect("spawn stdin reader");
    rx
}

/// Serve until stdin closes. Room events published by the manager come back
/// through `subscription` and leave as `op_broadcast`.
fn run_loop(
    dispatcher: &Dispatcher,
    lines: &Receiver<String>,
    subscription: &BrokerSubscription,
    out: &mut impl Write,
) -> std::io::Result<()> {
    let mut feed_open = true;
    loop {
        let mut select = Select::new();
        let line_idx = select.recv(lines);
        if feed_open {
            select.recv(subscription.receiver());
        }
        let ready = select.ready();

        if ready == line_idx {
            match lines.try_recv() {
                Ok(line) => {
                    for outbound in dispatcher.handle(line.as_bytes()) {
                        write_outbound(out, &outbound)?;
                    }
                }
                Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }
        }

        // Fan-out runs after each inbound line so a submit's op_ack precedes
        // its op_broadcast.
        if feed_open {
            feed_open = pump_room_events(dispatcher, subscription, out)?;
        }
    }
    if feed_open {
        pump_room_events(dispatcher, subscription, out)?;
    }
    Ok(())
}

/// Drain queued room events. Returns false once the broker has dropped this
/// subscription.
fn pump_room_events(
    dispatcher: &Dispatcher,
    subscription: &BrokerSubscription,
    out: &mut impl Write,
) -> std::io::Result<bool> {
    loop {
        match subscription.try_recv() {
            Ok(message) => {
                if let Some(outbound) = dispatcher.on_room_event(&message.payload) {
                    write_outbound(out, &outbound)?;
                }
            }
            Err(TryRecvError::Empty) => return Ok(true),
            Err(TryRecvError::Disconnected) => {
                tracing::warn!(
                    reason = ?subscription.drop_reason(),
                    "room subscription closed, op_broadcast fan-out stopped"
                );
                return Ok(false);
            }
        }
    }
}

fn write_outbound(out: &mut impl Write, outbound: &Outbound) -> std::io::Result<()> {
    let bytes = match outbound.envelope().encode() {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::error!(error = %err, "failed to encode outbound envelope");
            return Ok(());
        }
    };
    out.write_all(&bytes)?;
    out.write_all(b"\n")?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::{Value, json};

    use crate::collab::MemorySnapshotStore;
    use crate::core::Limits;
    use crate::config::CollabConfig;

    fn line(kind: &str, request_id: &str, payload: Value) -> String {
        json!({
            "type": kind,
            "version": 1,
            "tenant": "t1",
            "doc_id": "d1",
            "user_id": "u1",
            "request_id": request_id,
            "payload": payload,
        })
        .to_string()
    }

    #[test]
    fn ack_precedes_broadcast_on_stdout() {
        let limits = Limits::default();
        let broker = ChannelBroker::new(BrokerLimits::from_limits(&limits));
        let subscription = broker
            .subscribe("collab", SubscriberLimits::new(16, 1 << 20).unwrap())
            .unwrap();
        let manager = RoomManager::new(
            CollabConfig::default(),
            limits,
            Arc::new(MemorySnapshotStore::new()),
            Arc::new(broker),
            Arc::new(PresenceTracker::new(Duration::from_secs(60))),
        );
        let dispatcher = Dispatcher::new(Arc::new(manager));

        let (tx, rx) = crossbeam::channel::unbounded();
        tx.send(line("join_room", "r1", Value::Null)).unwrap();
        tx.send(line(
            "op_submit",
            "r2",
            json!({"baseVersion": 0, "ops": [{"path": "a", "type": "set", "value": 1, "ts": 5}]}),
        ))
        .unwrap();
        drop(tx);

        let mut out = Vec::new();
        run_loop(&dispatcher, &rx, &subscription, &mut out).unwrap();

        let kinds: Vec<String> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|line| {
                let value: Value = serde_json::from_str(line).unwrap();
                value["type"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                "snapshot_response",
                "presence_update",
                "op_ack",
                "op_broadcast"
            ]
        );
    }
}
