pub mod behavior;
pub mod node;

pub use node::{P2PHandle, P2PNode, WireEnvelope};

use libp2p::multiaddr::Protocol;
use libp2p::{Multiaddr, PeerId};

pub fn parse_bootstrap_peers(entries: &[String]) -> Vec<(PeerId, Multiaddr)> {
    entries
        .iter()
        .filter_map(|entry| {
            let mut addr: Multiaddr = match entry.parse() {
                Ok(addr) => addr,
                Err(err) => {
                    log::warn!("Invalid multiaddr `{entry}`: {err}");
                    return None;
                }
            };

            let peer_id = match addr.pop() {
                Some(Protocol::P2p(peer)) => peer,
                _ => {
                    log::warn!("Multiaddr `{entry}` missing /p2p/PeerId suffix");
                    return None;
                }
            };

            Some((peer_id, addr))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_entries_are_skipped() {
        let peer = PeerId::random();
        let entries = vec![
            "not an address".to_string(),
            "/ip4/10.0.0.1/tcp/4001".to_string(),
            format!("/ip4/10.0.0.2/tcp/4001/p2p/{peer}"),
        ];

        let peers = parse_bootstrap_peers(&entries);

        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].0, peer);
        assert_eq!(peers[0].1, "/ip4/10.0.0.2/tcp/4001".parse::<Multiaddr>().unwrap());
    }
}
