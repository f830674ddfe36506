// src/core/cycle.rs

/// Credential rotation happens every this many completed cycles.
pub const ROTATION_CYCLES: u64 = 60;

/// Scheduler counters. Memory only: a restart starts again from zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleState {
    pub cycle_count: u64,
    pub active_credential_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rotation {
    pub from: usize,
    pub to: usize,
}

impl CycleState {
    /// Marks one cycle complete and returns the next state, plus the
    /// credential rotation if this cycle triggered one.
    pub fn complete(self, credential_count: usize) -> (Self, Option<Rotation>) {
        let cycle_count = self.cycle_count + 1;
        if cycle_count % ROTATION_CYCLES != 0 || credential_count == 0 {
            return (
                Self {
                    cycle_count,
                    ..self
                },
                None,
            );
        }

        let to = (self.active_credential_index + 1) % credential_count;
        (
            Self {
                cycle_count,
                active_credential_index: to,
            },
            Some(Rotation {
                from: self.active_credential_index,
                to,
            }),
        )
    }
}
