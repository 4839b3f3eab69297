//! Append-only flow with per-flow step numbering.

use parking_lot::RwLock;

/// Step number handed out ahead of the record it belongs to.
///
/// The generation ties the reservation to the flow incarnation it was taken from; an append
/// carrying a stale generation is discarded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepReservation {
    pub step: u64,
    pub generation: u64,
}

#[derive(Debug)]
struct FlowState<R> {
    generation: u64,
    next_step: u64,
    entries: Vec<R>,
}

/// Ordered sequence of finalized records for one recording mode.
///
/// Entries are never mutated once appended. `reset` is the only way to drop them and it starts a
/// new generation with step numbering back at 1.
#[derive(Debug)]
pub struct FlowStore<R> {
    state: RwLock<FlowState<R>>,
}

impl<R> Default for FlowStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> FlowStore<R> {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(FlowState {
                generation: 0,
                next_step: 1,
                entries: Vec::new(),
            }),
        }
    }

    /// Clear the flow and open a new generation. Returns the new generation.
    pub fn reset(&self) -> u64 {
        let mut state = self.state.write();
        state.generation += 1;
        state.next_step = 1;
        state.entries.clear();
        state.generation
    }

    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    /// Reserve the next step number without appending anything yet.
    pub fn reserve_step(&self) -> StepReservation {
        let mut state = self.state.write();
        let step = state.next_step;
        state.next_step += 1;
        StepReservation {
            step,
            generation: state.generation,
        }
    }

    /// Append a record built against an earlier reservation.
    ///
    /// Returns `false` (and drops the record) when the flow was reset since the reservation.
    pub fn append(&self, generation: u64, record: R) -> bool {
        let mut state = self.state.write();
        if state.generation != generation {
            return false;
        }
        state.entries.push(record);
        true
    }

    /// Assign the next step and append in one step, so receipt order and step order agree.
    pub fn append_next<F>(&self, build: F) -> u64
    where
        F: FnOnce(u64) -> R,
    {
        let mut state = self.state.write();
        let step = state.next_step;
        state.next_step += 1;
        state.entries.push(build(step));
        step
    }

    /// [`append_next`](Self::append_next) that gives up when the flow moved to another generation.
    pub fn append_next_in<F>(&self, generation: u64, build: F) -> Option<u64>
    where
        F: FnOnce(u64) -> R,
    {
        let mut state = self.state.write();
        if state.generation != generation {
            return None;
        }
        let step = state.next_step;
        state.next_step += 1;
        state.entries.push(build(step));
        Some(step)
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }
}

impl<R: Clone> FlowStore<R> {
    /// Copy of the full ordered sequence.
    pub fn snapshot(&self) -> Vec<R> {
        self.state.read().entries.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reservations_are_monotonic_and_reset_restarts_at_one() {
        let flow: FlowStore<u64> = FlowStore::new();
        let gen = flow.reset();
        let a = flow.reserve_step();
        let b = flow.reserve_step();
        assert_eq!((a.step, b.step), (1, 2));
        assert_eq!(a.generation, gen);

        assert!(flow.append(gen, b.step));
        assert!(flow.append(gen, a.step));
        assert_eq!(flow.snapshot(), vec![2, 1]);

        let next = flow.reset();
        assert!(next > gen);
        assert!(flow.is_empty());
        assert_eq!(flow.reserve_step().step, 1);
    }

    #[test]
    fn stale_generation_is_discarded() {
        let flow: FlowStore<&'static str> = FlowStore::new();
        let old = flow.reset();
        let reservation = flow.reserve_step();
        flow.reset();
        assert!(!flow.append(reservation.generation, "late"));
        assert!(!flow.append(old, "late"));
        assert!(flow.is_empty());
    }

    #[test]
    fn append_next_numbers_in_receipt_order() {
        let flow: FlowStore<(u64, &'static str)> = FlowStore::new();
        flow.append_next(|step| (step, "first"));
        flow.append_next(|step| (step, "second"));
        assert_eq!(flow.snapshot(), vec![(1, "first"), (2, "second")]);
        assert_eq!(flow.len(), 2);
    }

    #[test]
    fn append_next_in_rejects_other_generation() {
        let flow: FlowStore<u64> = FlowStore::new();
        let gen = flow.reset();
        assert_eq!(flow.append_next_in(gen, |step| step), Some(1));
        flow.reset();
        assert_eq!(flow.append_next_in(gen, |step| step), None);
        assert!(flow.is_empty());
    }
}
