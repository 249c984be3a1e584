use std::collections::HashMap;
use std::error::Error;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use libp2p::gossipsub::{self, TopicHash};
use libp2p::identify;
use libp2p::kad;
use libp2p::swarm::SwarmEvent;
use libp2p::{Multiaddr, PeerId, Swarm, SwarmBuilder, identity, noise, tcp, yamux};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::backend::{EventSource, MessageSender, Subscription, SubscriptionHandle};
use crate::common::{ChatMessage, NodeCommand, RemoteEvent, ThreadId};
use crate::error::{ChatError, Result};
use crate::storage::MessageDatabase;

use super::behavior::{ChatBehavior, ChatBehaviorEvent, build_behavior, thread_topic};

/// Dạng JSON gửi trên gossipsub.
#[derive(Debug, Serialize, Deserialize)]
pub struct WireEnvelope {
    pub thread_id: ThreadId,
    pub message: ChatMessage,
}

/// Cheap handle used by thread sessions to talk to the node.
#[derive(Clone)]
pub struct P2PHandle {
    commands: mpsc::UnboundedSender<NodeCommand>,
}

#[async_trait]
impl EventSource for P2PHandle {
    async fn subscribe(&self, thread_id: &ThreadId) -> Result<Subscription> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(NodeCommand::Subscribe {
                thread_id: thread_id.clone(),
                reply,
            })
            .map_err(|_| ChatError::Closed("network node"))?;
        let (subscriber_id, events) = response
            .await
            .map_err(|_| ChatError::Closed("network node"))??;

        let commands = self.commands.clone();
        let released_thread = thread_id.clone();
        let handle = SubscriptionHandle::new(thread_id.clone(), move || {
            // Node already gone means nothing is left to release.
            let _ = commands.send(NodeCommand::Unsubscribe {
                thread_id: released_thread,
                subscriber_id,
            });
        });

        Ok(Subscription { events, handle })
    }
}

#[async_trait]
impl MessageSender for P2PHandle {
    async fn send(&self, thread_id: &ThreadId, message: ChatMessage) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(NodeCommand::Publish {
                thread_id: thread_id.clone(),
                message,
                reply,
            })
            .map_err(|_| ChatError::Closed("network node"))?;
        response
            .await
            .map_err(|_| ChatError::Closed("network node"))?
    }
}

/// Owns the swarm, the history database and the local subscribers.
pub struct P2PNode {
    commands: mpsc::UnboundedReceiver<NodeCommand>,
    bootstrap_peers: Vec<(PeerId, Multiaddr)>,
    listen_addr: Multiaddr,
    database: MessageDatabase,
    topics: HashMap<TopicHash, ThreadId>,
    subscribers: HashMap<ThreadId, Vec<(u64, mpsc::UnboundedSender<RemoteEvent>)>>,
    next_subscriber: u64,
}

impl P2PNode {
    pub fn new(
        database: MessageDatabase,
        listen_addr: Multiaddr,
        bootstrap_peers: Vec<(PeerId, Multiaddr)>,
    ) -> (Self, P2PHandle) {
        let (command_sender, commands) = mpsc::unbounded_channel();
        let node = Self {
            commands,
            bootstrap_peers,
            listen_addr,
            database,
            topics: HashMap::new(),
            subscribers: HashMap::new(),
            next_subscriber: 0,
        };
        (
            node,
            P2PHandle {
                commands: command_sender,
            },
        )
    }

    pub async fn run(mut self) -> std::result::Result<(), Box<dyn Error + Send + Sync>> {
        let local_key = identity::Keypair::generate_ed25519();
        log::info!("Local PeerID: {:?}", local_key.public().to_peer_id());

        let mut swarm = build_swarm(local_key)?;
        swarm.listen_on(self.listen_addr.clone())?;

        if self.bootstrap_peers.is_empty() {
            log::warn!("No bootstrap peers configured; only directly dialed peers will be reached");
        } else {
            for (peer_id, addr) in &self.bootstrap_peers {
                log::info!("Adding bootstrap peer {peer_id} at {addr}");
                swarm
                    .behaviour_mut()
                    .kad
                    .add_address(peer_id, addr.clone());
                if let Err(err) = swarm.dial(addr.clone()) {
                    log::warn!("Failed to dial bootstrap peer {peer_id}: {err}");
                }
            }

            if let Err(err) = swarm.behaviour_mut().kad.bootstrap() {
                log::warn!("Failed to trigger Kademlia bootstrap: {err}");
            }
        }

        log::info!("Network event loop started");
        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        Some(command) => self.handle_command(command, &mut swarm),
                        None => break,
                    }
                }
                event = swarm.select_next_some() => {
                    self.handle_swarm_event(event, &mut swarm);
                }
            }
        }

        log::info!("Network event loop stopped");
        Ok(())
    }

    fn handle_command(&mut self, command: NodeCommand, swarm: &mut Swarm<ChatBehavior>) {
        match command {
            NodeCommand::Subscribe { thread_id, reply } => {
                if !self.subscribers.contains_key(&thread_id) {
                    let topic = thread_topic(&thread_id);
                    if let Err(err) = swarm.behaviour_mut().gossipsub.subscribe(&topic) {
                        let _ = reply.send(Err(ChatError::Subscription(format!("{err:?}"))));
                        return;
                    }
                    self.topics.insert(topic.hash(), thread_id.clone());
                }
                let _ = reply.send(Ok(self.attach(&thread_id)));
            }
            NodeCommand::Unsubscribe {
                thread_id,
                subscriber_id,
            } => {
                if self.detach(&thread_id, subscriber_id) {
                    let topic = thread_topic(&thread_id);
                    let _ = swarm.behaviour_mut().gossipsub.unsubscribe(&topic);
                    self.topics.remove(&topic.hash());
                    log::debug!("Left topic for thread {thread_id}");
                }
            }
            NodeCommand::Publish {
                thread_id,
                message,
                reply,
            } => {
                let result = self.publish(&thread_id, &message, swarm);
                if result.is_ok() {
                    // Gossipsub không gửi lại tin của chính mình, nên tự đẩy cho subscriber local.
                    self.accept(&thread_id, message);
                }
                let _ = reply.send(result);
            }
        }
    }

    fn publish(
        &self,
        thread_id: &ThreadId,
        message: &ChatMessage,
        swarm: &mut Swarm<ChatBehavior>,
    ) -> Result<()> {
        let envelope = WireEnvelope {
            thread_id: thread_id.clone(),
            message: message.clone(),
        };
        let bytes = serde_json::to_vec(&envelope)?;
        swarm
            .behaviour_mut()
            .gossipsub
            .publish(thread_topic(thread_id), bytes)
            .map_err(|err| ChatError::Send(format!("{err:?}")))?;
        Ok(())
    }

    /// Registers a local subscriber and queues the stored history for it.
    fn attach(&mut self, thread_id: &ThreadId) -> (u64, mpsc::UnboundedReceiver<RemoteEvent>) {
        let (sender, events) = mpsc::unbounded_channel();

        match self.database.thread_messages(thread_id) {
            Ok(history) => {
                log::debug!("Replaying {} stored messages for {thread_id}", history.len());
                for message in history {
                    let _ = sender.send(RemoteEvent::Message(message));
                }
            }
            Err(err) => {
                let _ = sender.send(RemoteEvent::Error(ChatError::Storage(err)));
            }
        }

        let id = self.next_subscriber;
        self.next_subscriber += 1;
        self.subscribers
            .entry(thread_id.clone())
            .or_default()
            .push((id, sender));
        (id, events)
    }

    /// Returns `true` when the last subscriber of the thread is gone.
    fn detach(&mut self, thread_id: &ThreadId, subscriber_id: u64) -> bool {
        let Some(subscribers) = self.subscribers.get_mut(thread_id) else {
            return false;
        };
        subscribers.retain(|(id, _)| *id != subscriber_id);
        if subscribers.is_empty() {
            self.subscribers.remove(thread_id);
            return true;
        }
        false
    }

    /// Persists a message and hands it to every local subscriber of the thread.
    fn accept(&mut self, thread_id: &ThreadId, message: ChatMessage) {
        match self.database.insert_message(thread_id, &message) {
            Ok(true) => {}
            Ok(false) => {
                log::debug!("Message {} already stored", message.id);
                return;
            }
            Err(err) => log::warn!("Failed to persist message {}: {err}", message.id),
        }

        if let Some(subscribers) = self.subscribers.get_mut(thread_id) {
            subscribers.retain(|(_, sender)| {
                sender.send(RemoteEvent::Message(message.clone())).is_ok()
            });
        }
    }

    fn handle_swarm_event(
        &mut self,
        event: SwarmEvent<ChatBehaviorEvent>,
        swarm: &mut Swarm<ChatBehavior>,
    ) {
        match event {
            SwarmEvent::Behaviour(ChatBehaviorEvent::Gossipsub(gossipsub::Event::Message {
                message,
                ..
            })) => {
                let Some(thread_id) = self.topics.get(&message.topic).cloned() else {
                    return;
                };
                match serde_json::from_slice::<WireEnvelope>(&message.data) {
                    Ok(envelope) if envelope.thread_id == thread_id => {
                        self.accept(&thread_id, envelope.message);
                    }
                    Ok(envelope) => {
                        log::warn!(
                            "Dropping message for {} received on topic of {thread_id}",
                            envelope.thread_id
                        );
                    }
                    Err(err) => log::warn!("Dropping malformed message: {err}"),
                }
            }
            SwarmEvent::Behaviour(ChatBehaviorEvent::Identify(identify::Event::Received {
                peer_id,
                info,
                ..
            })) => {
                for addr in info.listen_addrs {
                    swarm.behaviour_mut().kad.add_address(&peer_id, addr);
                }
            }
            SwarmEvent::Behaviour(ChatBehaviorEvent::Kad(
                kad::Event::OutboundQueryProgressed {
                    result: kad::QueryResult::Bootstrap(result),
                    ..
                },
            )) => match result {
                Ok(kad::BootstrapOk { num_remaining, .. }) => {
                    log::info!("Kademlia bootstrap ok, remaining peers: {num_remaining}");
                }
                Err(err) => log::warn!("Kademlia bootstrap error: {err:?}"),
            },
            SwarmEvent::NewListenAddr { address, .. } => {
                log::info!("Listening on {address:?}");
            }
            SwarmEvent::ConnectionEstablished { peer_id, .. } => {
                log::info!("Connected to {peer_id}");
            }
            SwarmEvent::ConnectionClosed { peer_id, .. } => {
                log::info!("Disconnected from {peer_id}");
            }
            _ => {}
        }
    }
}

fn build_swarm(
    local_key: identity::Keypair,
) -> std::result::Result<Swarm<ChatBehavior>, Box<dyn Error + Send + Sync>> {
    let swarm = SwarmBuilder::with_existing_identity(local_key)
        .with_tokio()
        .with_tcp(
            tcp::Config::default(),
            noise::Config::new,
            yamux::Config::default,
        )?
        // Bootstrap node có thể được cấu hình bằng /dns4/... thay vì IP.
        .with_dns()?
        .with_behaviour(|key| build_behavior(key))?
        .with_swarm_config(|config| config.with_idle_connection_timeout(Duration::from_secs(60)))
        .build();
    Ok(swarm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::UserProfile;

    fn node() -> P2PNode {
        let (node, _handle) = P2PNode::new(
            MessageDatabase::in_memory().unwrap(),
            "/ip4/127.0.0.1/tcp/0".parse().unwrap(),
            Vec::new(),
        );
        node
    }

    fn alice() -> UserProfile {
        UserProfile {
            id: "alice".to_string(),
            display_name: "Alice".to_string(),
        }
    }

    fn received_ids(events: &mut mpsc::UnboundedReceiver<RemoteEvent>) -> Vec<String> {
        let mut ids = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let RemoteEvent::Message(message) = event {
                ids.push(message.id);
            }
        }
        ids
    }

    #[test]
    fn late_subscriber_gets_history_first() {
        let mut node = node();
        let thread = ThreadId::between("alice", "bob");
        let first = ChatMessage::text(&alice(), "hello");
        node.accept(&thread, first.clone());

        let (_, mut events) = node.attach(&thread);
        let second = ChatMessage::text(&alice(), "again");
        node.accept(&thread, second.clone());

        assert_eq!(received_ids(&mut events), vec![first.id, second.id]);
    }

    #[test]
    fn stored_duplicates_are_not_redelivered() {
        let mut node = node();
        let thread = ThreadId::between("alice", "bob");
        let (_, mut events) = node.attach(&thread);
        let message = ChatMessage::text(&alice(), "once");

        node.accept(&thread, message.clone());
        node.accept(&thread, message.clone());

        assert_eq!(received_ids(&mut events), vec![message.id]);
    }

    #[test]
    fn detach_reports_last_subscriber() {
        let mut node = node();
        let thread = ThreadId::new("t");
        let (first, _a) = node.attach(&thread);
        let (second, _b) = node.attach(&thread);

        assert!(!node.detach(&thread, first));
        assert!(node.detach(&thread, second));
        assert!(!node.detach(&thread, second));
    }

    #[test]
    fn envelope_carries_reference_but_not_bytes() {
        let mut message = ChatMessage::text(&alice(), "x");
        message.attachment_data = Some(vec![1, 2, 3]);
        let envelope = WireEnvelope {
            thread_id: ThreadId::new("t"),
            message,
        };

        let decoded: WireEnvelope =
            serde_json::from_slice(&serde_json::to_vec(&envelope).unwrap()).unwrap();
        assert_eq!(decoded.thread_id, envelope.thread_id);
        assert!(decoded.message.attachment_data.is_none());
    }

    #[tokio::test]
    async fn publish_without_peers_is_a_send_error() {
        let mut node = node();
        let mut swarm = build_swarm(identity::Keypair::generate_ed25519()).unwrap();
        let thread = ThreadId::between("alice", "bob");
        let (_, mut events) = node.attach(&thread);
        let (reply, response) = oneshot::channel();

        node.handle_command(
            NodeCommand::Publish {
                thread_id: thread.clone(),
                message: ChatMessage::text(&alice(), "nobody listening"),
                reply,
            },
            &mut swarm,
        );

        let err = response.await.unwrap().unwrap_err();
        assert!(matches!(err, ChatError::Send(_)));
        assert_eq!(err.title(), "Message not delivered");
        assert_eq!(node.database.message_count(&thread).unwrap(), 0);
        assert!(received_ids(&mut events).is_empty());
    }

    #[tokio::test]
    async fn swarm_accepts_dns_addresses() {
        let mut swarm = build_swarm(identity::Keypair::generate_ed25519()).unwrap();
        let addr: Multiaddr = "/dns4/localhost/tcp/9".parse().unwrap();
        assert!(swarm.dial(addr).is_ok());
    }

    #[tokio::test]
    async fn handle_reports_stopped_node() {
        let (node, handle) = P2PNode::new(
            MessageDatabase::in_memory().unwrap(),
            "/ip4/127.0.0.1/tcp/0".parse().unwrap(),
            Vec::new(),
        );
        drop(node);

        let err = handle.subscribe(&ThreadId::new("t")).await.err().unwrap();
        assert!(matches!(err, ChatError::Closed(_)));
    }
}
