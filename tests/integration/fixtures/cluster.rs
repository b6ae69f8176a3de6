//! Several collab processes sharing one store and one broker.

use std::sync::Arc;
use std::time::Duration;

use valor_collab::collab::{
    BrokerLimits, BrokerSubscription, ChannelBroker, Dispatcher, MemorySnapshotStore, Outbound,
    PresenceTracker, RoomManager, SnapshotStore, SubscriberLimits,
};
use valor_collab::config::CollabConfig;
use valor_collab::core::{ClientSnapshot, Limits, ProcessId, RoomKey};

pub struct Node {
    pub dispatcher: Dispatcher,
    subscription: BrokerSubscription,
}

impl Node {
    pub fn manager(&self) -> &Arc<RoomManager> {
        self.dispatcher.manager()
    }

    pub fn handle(&self, bytes: &[u8]) -> Vec<Outbound> {
        self.dispatcher.handle(bytes)
    }

    /// Deliver every queued room event to this node.
    pub fn pump(&self) -> Vec<Outbound> {
        self.subscription
            .drain()
            .into_iter()
            .filter_map(|message| self.dispatcher.on_room_event(&message.payload))
            .collect()
    }

    pub fn snapshot(&self, key: &RoomKey) -> ClientSnapshot {
        self.manager().current_snapshot(key).expect("snapshot")
    }
}

pub struct Cluster {
    pub broker: ChannelBroker,
    pub store: Arc<MemorySnapshotStore>,
    pub config: CollabConfig,
    pub limits: Limits,
}

impl Cluster {
    pub fn new(config: CollabConfig) -> Self {
        Self::with_store(config, Arc::new(MemorySnapshotStore::new()))
    }

    pub fn with_store(config: CollabConfig, store: Arc<MemorySnapshotStore>) -> Self {
        let limits = Limits::default();
        Self {
            broker: ChannelBroker::new(BrokerLimits::from_limits(&limits)),
            store,
            config,
            limits,
        }
    }

    pub fn node(&self) -> Node {
        self.node_with_store(Arc::clone(&self.store) as Arc<dyn SnapshotStore>)
    }

    pub fn node_with_store(&self, store: Arc<dyn SnapshotStore>) -> Node {
        let subscription = self
            .broker
            .subscribe(
                self.config.channel_prefix.clone(),
                SubscriberLimits::new(1_024, 8 * 1024 * 1024).expect("subscriber limits"),
            )
            .expect("subscribe");
        let manager = RoomManager::with_process_id(
            self.config.clone(),
            self.limits.clone(),
            store,
            Arc::new(self.broker.clone()),
            Arc::new(PresenceTracker::new(Duration::from_millis(
                self.config.presence_ttl_ms,
            ))),
            ProcessId::generate(),
        );
        Node {
            dispatcher: Dispatcher::new(Arc::new(manager)),
            subscription,
        }
    }
}

pub fn room() -> RoomKey {
    RoomKey::parse("t1", "d1").expect("room key")
}
