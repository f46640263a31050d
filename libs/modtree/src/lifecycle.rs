use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::Serialize;

// ----- Bootstrap state model -------------------------------------------------

/// Bootstrap stages of a module, entered in order, each exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[repr(u8)]
pub enum ModuleState {
    New,
    Configured,
    ComponentsCreated,
    ComponentsInitialized,
    ModulesInitialized,
    Ready,
}

impl ModuleState {
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    #[inline]
    pub const fn from_u8(x: u8) -> Self {
        match x {
            1 => ModuleState::Configured,
            2 => ModuleState::ComponentsCreated,
            3 => ModuleState::ComponentsInitialized,
            4 => ModuleState::ModulesInitialized,
            5 => ModuleState::Ready,
            _ => ModuleState::New,
        }
    }

    /// The state that follows this one, if any.
    pub const fn next(self) -> Option<Self> {
        match self {
            ModuleState::New => Some(ModuleState::Configured),
            ModuleState::Configured => Some(ModuleState::ComponentsCreated),
            ModuleState::ComponentsCreated => Some(ModuleState::ComponentsInitialized),
            ModuleState::ComponentsInitialized => Some(ModuleState::ModulesInitialized),
            ModuleState::ModulesInitialized => Some(ModuleState::Ready),
            ModuleState::Ready => None,
        }
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Atomic holder for a [`ModuleState`]. Transitions only move one step forward.
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(ModuleState::New.as_u8()))
    }

    #[inline]
    pub fn load(&self) -> ModuleState {
        ModuleState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move `from -> from.next()`. Returns the state actually observed on failure.
    pub fn advance(&self, from: ModuleState) -> Result<ModuleState, ModuleState> {
        let Some(to) = from.next() else {
            return Err(from);
        };
        self.0
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .map(|_| to)
            .map_err(ModuleState::from_u8)
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

// ----- Module events -------------------------------------------------------

/// Fired before any configuration is merged.
pub const BEFORE_INIT: &str = "beforeInit";
/// Fired once own components exist, before the first `init`.
pub const BEFORE_COMPONENT_INIT: &str = "beforeComponentInit";
/// Fired after every own component finished `init`.
pub const AFTER_COMPONENT_INIT: &str = "afterComponentInit";
/// Fired after every child module is ready.
pub const AFTER_MODULE_INIT: &str = "afterModuleInit";
/// Fired last; the module is ready afterwards.
pub const AFTER_INIT: &str = "afterInit";

// ----- Component state -------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ComponentState {
    Created,
    Initialized,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_round_trip_through_u8() {
        let mut s = ModuleState::New;
        loop {
            assert_eq!(ModuleState::from_u8(s.as_u8()), s);
            match s.next() {
                Some(n) => s = n,
                None => break,
            }
        }
        assert_eq!(s, ModuleState::Ready);
    }

    #[test]
    fn advance_moves_one_step_only() {
        let cell = StateCell::new();
        assert_eq!(cell.advance(ModuleState::New), Ok(ModuleState::Configured));
        // stale expectation is rejected with the observed state
        assert_eq!(cell.advance(ModuleState::New), Err(ModuleState::Configured));
        assert_eq!(cell.load(), ModuleState::Configured);
    }

    #[test]
    fn ready_is_terminal() {
        let cell = StateCell::new();
        let mut s = ModuleState::New;
        while let Ok(next) = cell.advance(s) {
            s = next;
        }
        assert_eq!(cell.load(), ModuleState::Ready);
        assert_eq!(cell.advance(ModuleState::Ready), Err(ModuleState::Ready));
    }
}
