use std::collections::hash_map::DefaultHasher;
use std::error::Error;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use libp2p::gossipsub::{self, IdentTopic};
use libp2p::identify;
use libp2p::identity;
use libp2p::kad::{self, Mode as KadMode, store::MemoryStore};
use libp2p::swarm::NetworkBehaviour;

use crate::common::ThreadId;

pub const PROTOCOL_VERSION: &str = "rust-chats/1.0.0";
const TOPIC_PREFIX: &str = "rust-chats/thread/";

#[derive(NetworkBehaviour)]
pub struct ChatBehavior {
    pub gossipsub: gossipsub::Behaviour,
    pub kad: kad::Behaviour<MemoryStore>,
    pub identify: identify::Behaviour,
}

/// Mỗi thread là một gossipsub topic riêng.
pub fn thread_topic(thread_id: &ThreadId) -> IdentTopic {
    IdentTopic::new(format!("{TOPIC_PREFIX}{thread_id}"))
}

pub fn build_behavior(
    local_key: &identity::Keypair,
) -> Result<ChatBehavior, Box<dyn Error + Send + Sync>> {
    let local_peer_id = local_key.public().to_peer_id();

    // Same payload => same id, so a message relayed twice is only delivered once.
    let message_id_fn = |message: &gossipsub::Message| {
        let mut hasher = DefaultHasher::new();
        message.data.hash(&mut hasher);
        gossipsub::MessageId::from(hasher.finish().to_string())
    };

    let gossipsub_config = gossipsub::ConfigBuilder::default()
        .heartbeat_interval(Duration::from_secs(5))
        .validation_mode(gossipsub::ValidationMode::Strict)
        .message_id_fn(message_id_fn)
        .build()?;

    let gossipsub = gossipsub::Behaviour::new(
        gossipsub::MessageAuthenticity::Signed(local_key.clone()),
        gossipsub_config,
    )?;

    let store = MemoryStore::new(local_peer_id);
    let mut kad = kad::Behaviour::new(local_peer_id, store);
    kad.set_mode(Some(KadMode::Server));

    let identify_config =
        identify::Config::new(PROTOCOL_VERSION.to_string(), local_key.public());
    let identify = identify::Behaviour::new(identify_config);

    Ok(ChatBehavior {
        gossipsub,
        kad,
        identify,
    })
}
