//! Slot-array quantum memory

use qnet_core::{Addr, ChannelId, PathDirection, PathId, ReservationKey, SimTime, WernerEpr};
use tracing::{debug, trace};

use crate::error::{MemoryError, MemoryResult};
use crate::qubit::{MemoryQubit, QubitState};
use crate::storable::Storable;

/// Lookup key for stored content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryKey<'a> {
    Addr(Addr),
    Name(&'a str),
}

impl From<Addr> for MemoryKey<'_> {
    fn from(addr: Addr) -> Self {
        MemoryKey::Addr(addr)
    }
}

impl<'a> From<&'a str> for MemoryKey<'a> {
    fn from(name: &'a str) -> Self {
        MemoryKey::Name(name)
    }
}

impl<'a> From<&'a String> for MemoryKey<'a> {
    fn from(name: &'a String) -> Self {
        MemoryKey::Name(name)
    }
}

impl std::fmt::Display for MemoryKey<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryKey::Addr(addr) => write!(f, "addr {addr}"),
            MemoryKey::Name(name) => write!(f, "{name}"),
        }
    }
}

/// A decoherence deadline armed by a write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoherenceTimer {
    pub addr: Addr,
    pub name: String,
    pub at: SimTime,
}

/// Fixed-capacity quantum memory
#[derive(Debug, Clone)]
pub struct QuantumMemory<T: Storable = WernerEpr> {
    name: String,
    decoherence_rate: f64,
    slots: Vec<(MemoryQubit, Option<T>)>,
    usage: usize,
    timers: Vec<DecoherenceTimer>,
}

impl<T: Storable> QuantumMemory<T> {
    /// Create a memory with `capacity` slots
    ///
    /// A positive `decoherence_rate` (per second) makes every stored item
    /// expire `1 / rate` seconds after its creation.
    pub fn new(name: impl Into<String>, capacity: usize, decoherence_rate: f64) -> Self {
        Self {
            name: name.into(),
            decoherence_rate,
            slots: (0..capacity).map(|addr| (MemoryQubit::new(addr), None)).collect(),
            usage: 0,
            timers: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn decoherence_rate(&self) -> f64 {
        self.decoherence_rate
    }

    /// Number of occupied slots
    pub fn count(&self) -> usize {
        self.usage
    }

    pub fn is_full(&self) -> bool {
        self.usage == self.slots.len()
    }

    /// Bind up to `n` unassigned slots to `channel`
    pub fn assign(&mut self, channel: &ChannelId, n: usize) -> Vec<Addr> {
        let addrs: Vec<Addr> = self
            .slots
            .iter_mut()
            .filter(|(q, _)| q.qchannel.is_none())
            .take(n)
            .map(|(q, _)| {
                q.qchannel = Some(channel.clone());
                q.addr
            })
            .collect();
        debug!(memory = %self.name, %channel, ?addrs, "assigned qubits to channel");
        addrs
    }

    /// Pin `n` slots of `channel` that are not yet allocated to `path_id`
    ///
    /// Fails without side effects if fewer than `n` such slots exist.
    pub fn allocate(
        &mut self,
        path_id: PathId,
        direction: PathDirection,
        channel: &ChannelId,
        n: usize,
    ) -> MemoryResult<Vec<Addr>> {
        let free: Vec<Addr> = self
            .slots
            .iter()
            .filter(|(q, _)| q.qchannel.as_ref() == Some(channel) && q.path_id.is_none())
            .map(|(q, _)| q.addr)
            .take(n)
            .collect();
        if free.len() < n {
            return Err(MemoryError::InsufficientQubits {
                channel: channel.clone(),
                requested: n,
                available: free.len(),
            });
        }
        for &addr in &free {
            let q = &mut self.slots[addr].0;
            q.path_id = Some(path_id);
            q.path_direction = Some(direction);
        }
        debug!(memory = %self.name, path_id, %direction, %channel, addrs = ?free, "allocated qubits");
        Ok(free)
    }

    /// Remove the path allocation of an empty slot
    pub fn deallocate(&mut self, addr: Addr) -> MemoryResult<()> {
        let capacity = self.capacity();
        let (q, value) = self.slots.get_mut(addr).ok_or(MemoryError::OutOfBounds { addr, capacity })?;
        if value.is_some() {
            return Err(MemoryError::OccupiedSlot(addr));
        }
        q.path_id = None;
        q.path_direction = None;
        Ok(())
    }

    /// Store `content` in the first free slot matching the constraints
    ///
    /// A `path_id` restricts the search to slots allocated to that path and a
    /// `key` to slots reserved under that key. Returns `None` when no
    /// matching free slot exists.
    pub fn write(
        &mut self,
        mut content: T,
        path_id: Option<PathId>,
        key: Option<ReservationKey>,
    ) -> Option<&mut MemoryQubit> {
        let idx = self.slots.iter().position(|(q, v)| {
            v.is_none()
                && path_id.is_none_or(|p| q.path_id == Some(p))
                && key.is_none_or(|k| q.active == Some(k))
        })?;

        if content.decoherence_time().is_none() && self.decoherence_rate > 0.0 {
            let lifetime = SimTime::from_secs_f64(1.0 / self.decoherence_rate);
            content.set_decoherence_time(content.creation_time() + lifetime);
        }
        if let Some(at) = content.decoherence_time() {
            self.timers.push(DecoherenceTimer { addr: idx, name: content.name().to_string(), at });
        }

        trace!(memory = %self.name, addr = idx, name = content.name(), "write");
        self.usage += 1;
        let slot = &mut self.slots[idx];
        slot.1 = Some(content);
        Some(&mut slot.0)
    }

    /// Replace the occupant of an occupied slot, returning the previous one
    pub fn replace(&mut self, addr: Addr, mut content: T) -> MemoryResult<T> {
        let capacity = self.capacity();
        let rate = self.decoherence_rate;
        let slot = self.slots.get_mut(addr).ok_or(MemoryError::OutOfBounds { addr, capacity })?;
        if slot.1.is_none() {
            return Err(MemoryError::EmptySlot(addr));
        }
        if content.decoherence_time().is_none() && rate > 0.0 {
            content.set_decoherence_time(content.creation_time() + SimTime::from_secs_f64(1.0 / rate));
        }
        if let Some(at) = content.decoherence_time() {
            self.timers.push(DecoherenceTimer { addr, name: content.name().to_string(), at });
        }
        slot.1.replace(content).ok_or(MemoryError::EmptySlot(addr))
    }

    fn position(&self, key: MemoryKey<'_>) -> Option<Addr> {
        match key {
            MemoryKey::Addr(addr) => self.slots.get(addr).and_then(|(_, v)| v.as_ref()).map(|_| addr),
            MemoryKey::Name(name) => self
                .slots
                .iter()
                .position(|(_, v)| v.as_ref().is_some_and(|c| c.name() == name)),
        }
    }

    /// Destructively read an occupant
    ///
    /// The returned metadata still carries the reservation key, the slot
    /// itself no longer does.
    pub fn read<'k>(&mut self, key: impl Into<MemoryKey<'k>>) -> Option<(MemoryQubit, T)> {
        let addr = self.position(key.into())?;
        let (qubit, value) = &mut self.slots[addr];
        let content = value.take()?;
        self.usage -= 1;
        let snapshot = qubit.clone();
        qubit.active = None;
        Some((snapshot, content))
    }

    /// Destructively read an occupant that must exist
    pub fn read_must<'k>(&mut self, key: impl Into<MemoryKey<'k>>) -> MemoryResult<(MemoryQubit, T)> {
        let key = key.into();
        self.read(key).ok_or_else(|| MemoryError::NotFound(key.to_string()))
    }

    /// Look at an occupant without removing it
    pub fn get<'k>(&self, key: impl Into<MemoryKey<'k>>) -> Option<(&MemoryQubit, &T)> {
        let addr = self.position(key.into())?;
        let (qubit, value) = &self.slots[addr];
        value.as_ref().map(|content| (qubit, content))
    }

    pub fn get_must<'k>(&self, key: impl Into<MemoryKey<'k>>) -> MemoryResult<(&MemoryQubit, &T)> {
        let key = key.into();
        self.get(key).ok_or_else(|| MemoryError::NotFound(key.to_string()))
    }

    pub fn get_mut<'k>(&mut self, key: impl Into<MemoryKey<'k>>) -> Option<(&mut MemoryQubit, &mut T)> {
        let addr = self.position(key.into())?;
        let (qubit, value) = &mut self.slots[addr];
        value.as_mut().map(|content| (qubit, content))
    }

    /// Slot metadata regardless of occupancy
    pub fn qubit(&self, addr: Addr) -> MemoryResult<&MemoryQubit> {
        let capacity = self.capacity();
        self.slots.get(addr).map(|(q, _)| q).ok_or(MemoryError::OutOfBounds { addr, capacity })
    }

    pub fn qubit_mut(&mut self, addr: Addr) -> MemoryResult<&mut MemoryQubit> {
        let capacity = self.capacity();
        self.slots.get_mut(addr).map(|(q, _)| q).ok_or(MemoryError::OutOfBounds { addr, capacity })
    }

    /// Lazily iterate over slots matching `pred`, occupied or not
    pub fn find<'s, P>(&'s self, pred: P) -> impl Iterator<Item = (&'s MemoryQubit, Option<&'s T>)> + 's
    where
        P: Fn(&MemoryQubit, Option<&T>) -> bool + 's,
    {
        self.slots.iter().map(|(q, v)| (q, v.as_ref())).filter(move |(q, v)| pred(q, *v))
    }

    /// Lazily iterate over occupied slots matching `pred`
    pub fn find_occupied<'s, P>(&'s self, pred: P) -> impl Iterator<Item = (&'s MemoryQubit, &'s T)> + 's
    where
        P: Fn(&MemoryQubit, &T) -> bool + 's,
    {
        self.slots
            .iter()
            .filter_map(|(q, v)| v.as_ref().map(|content| (q, content)))
            .filter(move |(q, v)| pred(q, v))
    }

    /// All slots assigned to `channel`
    pub fn get_channel_qubits(&self, channel: &ChannelId) -> Vec<(&MemoryQubit, Option<&T>)> {
        self.slots
            .iter()
            .filter(|(q, _)| q.qchannel.as_ref() == Some(channel))
            .map(|(q, v)| (q, v.as_ref()))
            .collect()
    }

    /// Empty every slot and return it to RAW, keeping channel and path bindings
    pub fn clear(&mut self) {
        for (qubit, value) in &mut self.slots {
            *value = None;
            qubit.reset();
        }
        self.usage = 0;
        self.timers.clear();
        debug!(memory = %self.name, "cleared");
    }

    /// Expire the occupant of `addr` if it is still the item named `name`
    ///
    /// Returns whether the slot was freed. The slot moves to RELEASE.
    pub fn decohere(&mut self, addr: Addr, name: &str) -> MemoryResult<bool> {
        let capacity = self.capacity();
        let (qubit, value) = self.slots.get_mut(addr).ok_or(MemoryError::OutOfBounds { addr, capacity })?;
        if !value.as_ref().is_some_and(|c| c.name() == name) {
            return Ok(false);
        }
        *value = None;
        self.usage -= 1;
        qubit.active = None;
        qubit.set_state(QubitState::Release)?;
        debug!(memory = %self.name, addr, name, "decohered");
        Ok(true)
    }

    /// Take the decoherence deadlines armed since the last call
    pub fn drain_timers(&mut self) -> Vec<DecoherenceTimer> {
        std::mem::take(&mut self.timers)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MemoryQubit, Option<&T>)> {
        self.slots.iter().map(|(q, v)| (q, v.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storable::Qubit;
    use proptest::prelude::*;
    use qnet_core::NodeId;

    fn key(n: u128) -> ReservationKey {
        ReservationKey::from_u128(n)
    }

    fn epr(name: &str) -> WernerEpr {
        WernerEpr::elementary(name, 1.0, NodeId::from("n1"), NodeId::from("peer"), SimTime::ZERO)
    }

    #[test]
    fn test_write_and_read_with_path_and_key() {
        let ch = ChannelId::from("qc");
        let mut mem = QuantumMemory::new("mem", 2, 1.0);
        mem.assign(&ch, 2);

        let addrs = mem.allocate(0, PathDirection::Left, &ch, 1).unwrap();
        assert_eq!(addrs.len(), 1);
        let addr = addrs[0];
        mem.qubit_mut(addr).unwrap().active = Some(key(1));

        let written = mem.write(epr("epr1"), Some(0), Some(key(1))).map(|q| q.addr);
        assert_eq!(written, Some(addr));

        // same path and key, slot already occupied
        assert!(mem.write(epr("epr2"), Some(0), Some(key(1))).is_none());

        let (qubit, data) = mem.read("epr1").unwrap();
        assert_eq!(data.name, "epr1");
        assert_eq!(mem.count(), 0);
        assert_eq!(qubit.active, Some(key(1)));
        assert_eq!(mem.qubit(addr).unwrap().active, None);
        assert!(matches!(mem.read_must(qubit.addr), Err(MemoryError::NotFound(_))));
    }

    #[test]
    fn test_mismatched_key_rejected() {
        let ch = ChannelId::from("qc");
        let mut mem = QuantumMemory::new("mem", 2, 1.0);
        mem.assign(&ch, 2);
        let addr = mem.allocate(42, PathDirection::Left, &ch, 1).unwrap()[0];
        mem.qubit_mut(addr).unwrap().active = Some(key(7));

        assert!(mem.write(epr("x"), Some(42), Some(key(8))).is_none());
        assert!(mem.write(epr("x"), Some(41), Some(key(7))).is_none());
        let written = mem.write(epr("x"), Some(42), Some(key(7))).map(|q| q.addr);
        assert_eq!(written, Some(addr));
    }

    #[test]
    fn test_channel_assignment() {
        let ch = ChannelId::from("qch");
        let mut mem: QuantumMemory = QuantumMemory::new("mem", 3, 1.0);
        assert_eq!(mem.assign(&ch, 1).len(), 1);

        let qubits = mem.get_channel_qubits(&ch);
        assert_eq!(qubits.len(), 1);
        assert_eq!(qubits[0].0.qchannel.as_ref(), Some(&ch));
        assert!(qubits[0].1.is_none());
    }

    #[test]
    fn test_allocate_insufficient() {
        let ch = ChannelId::from("qc");
        let mut mem: QuantumMemory = QuantumMemory::new("mem", 2, 0.0);
        mem.assign(&ch, 2);
        let err = mem.allocate(1, PathDirection::Right, &ch, 3).unwrap_err();
        assert_eq!(
            err,
            MemoryError::InsufficientQubits { channel: ch.clone(), requested: 3, available: 2 }
        );
        assert!(mem.iter().all(|(q, _)| q.path_id.is_none()));
    }

    #[test]
    fn test_decoherence_timer() {
        let mut mem = QuantumMemory::new("mem", 1, 1.0);
        let addr = {
            let qubit = mem.write(epr("epr3"), None, None).unwrap();
            qubit.set_state(QubitState::Active).unwrap();
            qubit.set_state(QubitState::Reserved).unwrap();
            qubit.set_state(QubitState::Entangled0).unwrap();
            qubit.active = Some(key(3));
            qubit.addr
        };
        let (_, stored) = mem.get("epr3").unwrap();
        assert_eq!(stored.decoherence_time, Some(SimTime::from_secs_f64(1.0)));

        let timers = mem.drain_timers();
        assert_eq!(
            timers,
            vec![DecoherenceTimer { addr, name: "epr3".into(), at: SimTime::from_secs_f64(1.0) }]
        );
        assert!(mem.drain_timers().is_empty());

        assert!(mem.decohere(addr, "epr3").unwrap());
        assert!(mem.get("epr3").is_none());
        assert_eq!(mem.qubit(addr).unwrap().state(), QubitState::Release);
        assert_eq!(mem.qubit(addr).unwrap().active, None);
    }

    #[test]
    fn test_stale_decoherence_ignored() {
        let mut mem = QuantumMemory::new("mem", 1, 1.0);
        mem.write(epr("old"), None, None);
        mem.read("old");
        mem.write(epr("new"), None, None);

        assert!(!mem.decohere(0, "old").unwrap());
        assert!(mem.get("new").is_some());
        assert!(matches!(mem.decohere(5, "new"), Err(MemoryError::OutOfBounds { .. })));
    }

    #[test]
    fn test_replace_rearms_timer() {
        let mut mem = QuantumMemory::new("mem", 1, 2.0);
        mem.write(epr("a"), None, None);
        mem.drain_timers();

        let mut next = epr("b");
        next.decoherence_time = Some(SimTime::from_secs_f64(0.25));
        let old = mem.replace(0, next).unwrap();
        assert_eq!(old.name, "a");
        assert_eq!(mem.get(0usize).unwrap().1.name, "b");
        assert_eq!(mem.drain_timers()[0].at, SimTime::from_secs_f64(0.25));
        assert_eq!(mem.count(), 1);
    }

    #[test]
    fn test_clear_and_deallocate() {
        let ch = ChannelId::from("qc");
        let mut mem = QuantumMemory::new("mem", 2, 1.0);
        mem.assign(&ch, 2);
        for i in 0..2 {
            assert!(mem.write(epr(&format!("epr{i}")), None, None).is_some());
        }
        assert!(mem.is_full());
        mem.clear();
        assert!(!mem.is_full());
        assert!(mem.iter().all(|(q, v)| v.is_none() && q.state() == QubitState::Raw));

        let addr = mem.allocate(7, PathDirection::Left, &ch, 1).unwrap()[0];
        mem.write(epr("held"), Some(7), None).unwrap();
        assert_eq!(mem.deallocate(addr), Err(MemoryError::OccupiedSlot(addr)));
        assert_eq!(mem.qubit(addr).unwrap().path_id, Some(7));

        mem.read("held").unwrap();
        mem.deallocate(addr).unwrap();
        assert_eq!(mem.qubit(addr).unwrap().path_id, None);
        assert!(matches!(mem.deallocate(999), Err(MemoryError::OutOfBounds { addr: 999, capacity: 2 })));
    }

    #[test]
    fn test_plain_qubits() {
        let mut mem: QuantumMemory<Qubit> = QuantumMemory::new("m1", 1, 0.0);
        assert!(mem.write(Qubit::new("test_qubit"), None, None).is_some());
        assert!(mem.read("test_qubit").is_some());

        assert!(mem.get("nonexistent").is_none());
        assert!(mem.read("nonexistent").is_none());
        assert!(mem.get_must("nonexistent").is_err());
        assert!(mem.read_must("nonexistent").is_err());
        assert!(mem.drain_timers().is_empty());
    }

    #[test]
    fn test_freed_slot_is_reused() {
        let mut mem: QuantumMemory<Qubit> = QuantumMemory::new("m1", 5, 0.0);
        for i in 0..5 {
            assert!(mem.write(Qubit::new(format!("q{}", i + 1)), None, None).is_some());
            assert_eq!(mem.count(), i + 1);
        }
        assert!(mem.write(Qubit::new("q5"), None, None).is_none());
        assert!(mem.is_full());

        assert!(mem.read("q4").is_some());
        assert_eq!(mem.count(), 4);
        assert!(!mem.is_full());

        assert!(mem.write(Qubit::new("q6"), None, None).is_some());
        assert!(mem.is_full());
        assert_eq!(mem.get_must("q6").unwrap().0.addr, 3);
    }

    #[test]
    fn test_find_is_lazy_and_filtered() {
        let ch = ChannelId::from("qc");
        let mut mem = QuantumMemory::new("mem", 4, 0.0);
        mem.assign(&ch, 2);
        mem.write(epr("a"), None, None);
        mem.write(epr("b"), None, None);

        let on_channel: Vec<Addr> =
            mem.find_occupied(|q, _| q.qchannel.as_ref() == Some(&ch)).map(|(q, _)| q.addr).collect();
        assert_eq!(on_channel, vec![0, 1]);
        assert_eq!(mem.find(|_, v| v.is_none()).count(), 2);
        assert_eq!(mem.find(|q, _| q.qchannel.is_none()).next().map(|(q, _)| q.addr), Some(2));
    }

    proptest! {
        /// A full memory rejects further writes without changing state
        #[test]
        fn prop_capacity_is_enforced(capacity in 1usize..32) {
            let mut mem: QuantumMemory<Qubit> = QuantumMemory::new("m", capacity, 0.0);
            for i in 0..capacity {
                let name = format!("q{i}");
                let stored = mem.write(Qubit::new(name), None, None).is_some();
                prop_assert!(stored, "write {} of {} failed", i, capacity);
            }
            prop_assert!(mem.is_full());
            prop_assert!(mem.write(Qubit::new("extra"), None, None).is_none());
            prop_assert_eq!(mem.count(), capacity);
            prop_assert!(mem.get("extra").is_none());
        }
    }
}
