//! Contents a memory slot can hold

use std::fmt;

use qnet_core::{SimTime, WernerEpr};

/// Anything that can occupy a memory slot
pub trait Storable: Clone + fmt::Debug {
    fn name(&self) -> &str;
    fn creation_time(&self) -> SimTime;
    fn decoherence_time(&self) -> Option<SimTime>;
    fn set_decoherence_time(&mut self, t: SimTime);
}

impl Storable for WernerEpr {
    fn name(&self) -> &str {
        &self.name
    }

    fn creation_time(&self) -> SimTime {
        self.creation_time
    }

    fn decoherence_time(&self) -> Option<SimTime> {
        self.decoherence_time
    }

    fn set_decoherence_time(&mut self, t: SimTime) {
        self.decoherence_time = Some(t);
    }
}

/// A plain named qubit
#[derive(Debug, Clone, PartialEq)]
pub struct Qubit {
    pub name: String,
    pub creation_time: SimTime,
    pub decoherence_time: Option<SimTime>,
}

impl Qubit {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), creation_time: SimTime::ZERO, decoherence_time: None }
    }
}

impl Storable for Qubit {
    fn name(&self) -> &str {
        &self.name
    }

    fn creation_time(&self) -> SimTime {
        self.creation_time
    }

    fn decoherence_time(&self) -> Option<SimTime> {
        self.decoherence_time
    }

    fn set_decoherence_time(&mut self, t: SimTime) {
        self.decoherence_time = Some(t);
    }
}
