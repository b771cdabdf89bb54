//! The door-strike actuator is an external collaborator (spec §1); only its interface is
//! specified here. Exclusive and serialized by the session — no concurrent unlocks (§5).

use crate::error::{DoorState, ErrorKind};

pub trait DoorActuator {
    /// Actuate the strike. Bounded, e.g. 2s (spec §5 suspension points); a real
    /// implementation talks to hardware, this trait only describes the contract.
    fn unlock(&mut self) -> Result<DoorState, ErrorKind>;

    fn current_state(&self) -> DoorState;
}

/// An in-memory test double, grounded in the teacher's pattern of stubbing hardware
/// collaborators behind a trait for the test suite.
pub struct FakeActuator {
    pub state: DoorState,
    pub fail_next: bool,
    pub unlock_count: u32,
}

impl Default for FakeActuator {
    fn default() -> Self {
        FakeActuator {
            state: DoorState::Locked,
            fail_next: false,
            unlock_count: 0,
        }
    }
}

impl DoorActuator for FakeActuator {
    fn unlock(&mut self) -> Result<DoorState, ErrorKind> {
        if self.fail_next {
            return Err(ErrorKind::Jammed);
        }
        self.unlock_count += 1;
        self.state = DoorState::Unlocked;
        Ok(self.state)
    }

    fn current_state(&self) -> DoorState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlock_updates_state_and_count() {
        let mut actuator = FakeActuator::default();
        let state = actuator.unlock().unwrap();
        assert_eq!(state, DoorState::Unlocked);
        assert_eq!(actuator.unlock_count, 1);
    }

    #[test]
    fn jammed_actuator_reports_fault() {
        let mut actuator = FakeActuator {
            fail_next: true,
            ..Default::default()
        };
        assert_eq!(actuator.unlock().unwrap_err(), ErrorKind::Jammed);
    }
}
