use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Queue of encoded events written by a single producer.
///
/// A channel keeps two byte buffers, like a double-buffered logger: producers
/// append whole framed events to the active buffer, and a drain swaps the
/// active buffer with the (empty) spare one. The swap is the only work done
/// under the lock on the consumer side; serialization happens on the detached
/// buffer, which is handed back with [`recycle`](Channel::recycle) to become
/// the next spare.
///
/// # Backpressure
///
/// The active buffer starts at `initial_capacity` bytes and doubles on demand,
/// but never beyond `max_bytes`. A record that does not fit under that ceiling
/// is dropped and counted; the producer never waits for the consumer.
pub(crate) struct Channel {
    id: u64,
    name: Mutex<String>,
    state: Mutex<ChannelState>,
    dropped: AtomicU64,
    initial_capacity: usize,
    max_bytes: usize,
}

struct ChannelState {
    active: Vec<u8>,
    spare: Vec<u8>,
    records: usize,
    closed: bool,
    dropped_since_drain: u64,
}

/// Events detached from a channel by a drain.
pub(crate) struct Batch {
    pub bytes: Vec<u8>,
    pub records: usize,
    /// The producer is gone; nothing will be appended after this batch.
    pub closed: bool,
}

impl Channel {
    pub(crate) fn new(id: u64, name: String, initial_capacity: usize, max_bytes: usize) -> Self {
        Self {
            id,
            name: Mutex::new(name),
            state: Mutex::new(ChannelState {
                active: Vec::with_capacity(initial_capacity),
                spare: Vec::new(),
                records: 0,
                closed: false,
                dropped_since_drain: 0,
            }),
            dropped: AtomicU64::new(0),
            initial_capacity,
            max_bytes,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn name(&self) -> String {
        self.name.lock().clone()
    }

    pub(crate) fn set_name(&self, name: String) {
        *self.name.lock() = name;
    }

    /// Records dropped by this channel since it was created.
    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Appends one entry of exactly `entry_len` bytes produced by `write`.
    ///
    /// Returns `false`, without calling `write`, if the entry does not fit
    /// under the channel ceiling.
    pub(crate) fn push(&self, entry_len: usize, write: impl FnOnce(&mut Vec<u8>)) -> bool {
        let mut state = self.state.lock();
        let needed = state.active.len().saturating_add(entry_len);

        if needed > self.max_bytes || state.closed {
            state.dropped_since_drain += 1;
            let first_drop = state.dropped_since_drain == 1;
            drop(state);

            self.dropped.fetch_add(1, Ordering::Relaxed);
            if first_drop {
                tracing::warn!(
                    channel = self.id,
                    ceiling = self.max_bytes,
                    record_bytes = entry_len,
                    "log channel full, dropping records until the next consume"
                );
            }
            return false;
        }

        if needed > state.active.capacity() {
            let target = (state.active.capacity() * 2)
                .max(needed)
                .max(self.initial_capacity)
                .min(self.max_bytes);
            let additional = target - state.active.len();
            state.active.reserve_exact(additional);
        }

        let start = state.active.len();
        write(&mut state.active);
        debug_assert_eq!(state.active.len() - start, entry_len, "entry size mismatch");
        state.records += 1;
        true
    }

    /// Swaps out everything queued so far.
    pub(crate) fn detach(&self) -> Batch {
        let mut state = self.state.lock();
        let spare = std::mem::take(&mut state.spare);
        let bytes = std::mem::replace(&mut state.active, spare);
        let records = std::mem::take(&mut state.records);
        state.dropped_since_drain = 0;

        Batch {
            bytes,
            records,
            closed: state.closed,
        }
    }

    /// Returns a drained buffer so its allocation can be reused.
    pub(crate) fn recycle(&self, mut bytes: Vec<u8>) {
        bytes.clear();
        let mut state = self.state.lock();
        if bytes.capacity() > state.spare.capacity() {
            state.spare = bytes;
        }
    }

    /// Marks the producer as gone. Later pushes are dropped.
    pub(crate) fn close(&self) {
        self.state.lock().closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_bytes(channel: &Channel, bytes: &[u8]) -> bool {
        channel.push(bytes.len(), |out| out.extend_from_slice(bytes))
    }

    #[test]
    fn test_detach_swaps_buffers() {
        let channel = Channel::new(1, "t".into(), 16, 1024);
        assert!(push_bytes(&channel, b"abc"));
        assert!(push_bytes(&channel, b"de"));

        let batch = channel.detach();
        assert_eq!(batch.bytes, b"abcde");
        assert_eq!(batch.records, 2);
        assert!(!batch.closed);

        assert!(push_bytes(&channel, b"f"));
        channel.recycle(batch.bytes);
        let batch = channel.detach();
        assert_eq!(batch.bytes, b"f");
        assert_eq!(batch.records, 1);
    }

    #[test]
    fn test_grows_up_to_ceiling_then_drops() {
        let channel = Channel::new(1, "t".into(), 4, 10);
        assert!(push_bytes(&channel, &[0; 4]));
        assert!(push_bytes(&channel, &[0; 4])); // grows past the initial capacity
        assert!(!push_bytes(&channel, &[0; 4])); // 12 > 10
        assert!(push_bytes(&channel, &[0; 2])); // exactly at the ceiling
        assert_eq!(channel.dropped(), 1);

        let batch = channel.detach();
        assert_eq!(batch.records, 3);
        assert_eq!(batch.bytes.len(), 10);
        assert!(batch.bytes.capacity() <= 10);
    }

    #[test]
    fn test_oversized_record_is_always_dropped() {
        let channel = Channel::new(1, "t".into(), 4, 8);
        assert!(!push_bytes(&channel, &[0; 9]));
        assert_eq!(channel.detach().records, 0);
        assert_eq!(channel.dropped(), 1);
    }

    #[test]
    fn test_close_is_reported_by_detach() {
        let channel = Channel::new(1, "t".into(), 4, 64);
        assert!(push_bytes(&channel, b"x"));
        channel.close();
        assert!(!push_bytes(&channel, b"y"));

        let batch = channel.detach();
        assert!(batch.closed);
        assert_eq!(batch.bytes, b"x");
    }
}
