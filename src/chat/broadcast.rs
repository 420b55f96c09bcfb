use log::debug;

use super::account::Directory;
use super::presence::PresenceRegistry;
use super::protocol::Reply;

/// Fans a reply out to every present session that has not blocked the sender
pub struct BroadcastRelay<'a> {
    directory: &'a Directory,
    presence: &'a PresenceRegistry,
}

impl<'a> BroadcastRelay<'a> {
    pub fn new(directory: &'a Directory, presence: &'a PresenceRegistry) -> Self {
        BroadcastRelay { directory, presence }
    }

    /// Deliver `reply` once to each eligible recipient; returns how many got it
    pub async fn broadcast(&self, sender: &str, reply: &Reply) -> usize {
        let mut delivered = 0;
        for (name, handle) in self.presence.snapshot().await {
            if name == sender || self.directory.has_blocked(&name, sender).await {
                continue;
            }
            if handle.send(reply) {
                delivered += 1;
            }
        }
        debug!("Broadcast from {} reached {} session(s)", sender, delivered);
        delivered
    }
}
