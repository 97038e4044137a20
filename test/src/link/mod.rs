/// Lossy in-memory link carrying packets from one connection to another.
/// Packets are never reordered: the transport under a connection is
/// ordered, only lossy.
use std::{collections::HashSet, time::Instant};

use log::debug;

use weave_shared::{Connection, ConnectionError, ReplicationHost};

pub struct LossyLink {
    rng: fastrand::Rng,
    loss: f32,
    carried: usize,
    scheduled_drops: HashSet<usize>,
    delivered: usize,
    dropped: usize,
    delivered_sizes: Vec<usize>,
}

impl LossyLink {
    /// Delivers every packet
    pub fn perfect() -> Self {
        Self::lossy(0, 0.0)
    }

    /// Drops each packet with probability `loss`, deterministic per seed
    pub fn lossy(seed: u64, loss: f32) -> Self {
        Self {
            rng: fastrand::Rng::with_seed(seed),
            loss,
            carried: 0,
            scheduled_drops: HashSet::new(),
            delivered: 0,
            dropped: 0,
            delivered_sizes: Vec::new(),
        }
    }

    /// Drops packets at these offsets from the next one carried, where 0
    /// is the next packet
    pub fn drop_upcoming(&mut self, offsets: &[usize]) {
        for offset in offsets {
            self.scheduled_drops.insert(self.carried + offset);
        }
    }

    pub fn delivered(&self) -> usize {
        self.delivered
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Sizes in bytes of every delivered packet, in order
    pub fn delivered_sizes(&self) -> &[usize] {
        &self.delivered_sizes
    }

    /// Moves every queued packet of `from` into `to`. Returns how many
    /// arrived.
    pub fn carry(
        &mut self,
        now: Instant,
        from: &mut Connection,
        to: &mut Connection,
        to_host: &mut dyn ReplicationHost,
    ) -> Result<usize, ConnectionError> {
        let mut arrived = 0;
        while let Some(packet) = from.pop_outgoing_packet() {
            let ordinal = self.carried;
            self.carried += 1;

            let scheduled = self.scheduled_drops.remove(&ordinal);
            let random = self.loss > 0.0 && self.rng.f32() < self.loss;
            if scheduled || random {
                debug!("link dropped packet {} ({} bytes)", ordinal, packet.len());
                self.dropped += 1;
                continue;
            }

            self.delivered += 1;
            self.delivered_sizes.push(packet.len());
            arrived += 1;
            to.receive_packet(now, to_host, &packet)?;
        }
        Ok(arrived)
    }
}

#[cfg(test)]
mod tests {
    use super::LossyLink;

    #[test]
    fn same_seed_drops_the_same_packets() {
        let mut first = LossyLink::lossy(7, 0.5);
        let mut second = LossyLink::lossy(7, 0.5);
        let a: Vec<bool> = (0..32).map(|_| first.rng.f32() < first.loss).collect();
        let b: Vec<bool> = (0..32).map(|_| second.rng.f32() < second.loss).collect();
        assert_eq!(a, b);
    }
}
