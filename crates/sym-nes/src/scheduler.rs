//! Context scheduler: a priority-ordered run queue.
//!
//! One context runs at a time, drained until it forks, exhausts the cycle
//! budget, or satisfies the stop predicate. Forked children re-enter the
//! queue; retired contexts collect on the completed list for inspection.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use log::{debug, trace};
use sym_ast::AstManager;

use crate::context::{Context, StepOutcome};
use crate::error::Result;

/// Queue entry: priority first, insertion order breaking ties FIFO.
struct QueueEntry {
    priority: i32,
    seq: u64,
    ctx: Box<Context>,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority wins; earlier insertion wins ties.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Per-cycle stop predicate, checked after every completed step.
pub type StopPredicate = Box<dyn Fn(&Context) -> bool>;

/// Priority scheduler over live contexts.
#[derive(Default)]
pub struct ContextScheduler {
    run_queue: BinaryHeap<QueueEntry>,
    completed: Vec<Box<Context>>,
    maximum_cpu_cycles: u64,
    stop_predicate: Option<StopPredicate>,
    next_seq: u64,
}

impl ContextScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap on a context's total CPU cycles; 0 means unbounded.
    pub fn set_maximum_cpu_cycles(&mut self, max_cycles: u64) {
        self.maximum_cpu_cycles = max_cycles;
    }

    /// Install a stop predicate. A context for which it returns true is
    /// retired to the completed list after the current step.
    pub fn set_stop_predicate(&mut self, predicate: impl Fn(&Context) -> bool + 'static) {
        self.stop_predicate = Some(Box::new(predicate));
    }

    /// Enqueue a context at its current priority.
    pub fn add_context(&mut self, ctx: Context) {
        self.enqueue(Box::new(ctx));
    }

    fn enqueue(&mut self, ctx: Box<Context>) {
        let entry = QueueEntry {
            priority: ctx.priority(),
            seq: self.next_seq,
            ctx,
        };
        self.next_seq += 1;
        self.run_queue.push(entry);
    }

    /// True while the run queue is non-empty.
    #[must_use]
    pub fn have_contexts(&self) -> bool {
        !self.run_queue.is_empty()
    }

    /// Number of queued contexts.
    #[must_use]
    pub fn queued_contexts(&self) -> usize {
        self.run_queue.len()
    }

    /// Retired contexts, in completion order.
    #[must_use]
    pub fn completed_contexts(&self) -> &[Box<Context>] {
        &self.completed
    }

    /// Drain the completed list.
    pub fn take_completed(&mut self) -> Vec<Box<Context>> {
        std::mem::take(&mut self.completed)
    }

    /// Pop the highest-priority context and step it to a break condition.
    ///
    /// # Errors
    ///
    /// A fatal condition raised inside the context aborts the drain and
    /// propagates; the faulting context is dropped.
    pub fn run_next_context(&mut self, m: &mut AstManager) -> Result<()> {
        let Some(entry) = self.run_queue.pop() else {
            return Ok(());
        };
        let mut ctx = entry.ctx;
        trace!("running context at priority {}", entry.priority);

        loop {
            match ctx.step(m)? {
                StepOutcome::Forked(taken, skipped) => {
                    debug!(
                        "context forked at cycle {}; re-queueing both children",
                        ctx.cpu_cycle_count()
                    );
                    self.enqueue(taken);
                    self.enqueue(skipped);
                    self.completed.push(ctx);
                    break;
                }
                StepOutcome::Continue => {}
            }

            if self.maximum_cpu_cycles != 0 && ctx.cpu_cycle_count() >= self.maximum_cpu_cycles {
                debug!(
                    "context reached the cycle budget ({})",
                    self.maximum_cpu_cycles
                );
                self.completed.push(ctx);
                break;
            }

            // Per-frame stopping conditions would also hook in here, once a
            // frame signal exists.
            if let Some(predicate) = &self.stop_predicate {
                if predicate(&ctx) {
                    debug!("stop predicate satisfied at cycle {}", ctx.cpu_cycle_count());
                    self.completed.push(ctx);
                    break;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_ines_nop_rom() -> Vec<u8> {
        // 16K PRG of $FF with a reset vector pointing at $C000 and a
        // two-instruction program: LDA #$01 then an idle branch loop.
        let mut data = vec![0u8; 16 + 0x4000];
        data[0..4].copy_from_slice(b"NES\x1a");
        data[4] = 1;
        let base = 16;
        // LDA #$01; BNE -2 (loops on itself forever since Z stays clear)
        data[base] = 0xA9;
        data[base + 1] = 0x01;
        data[base + 2] = 0xD0;
        data[base + 3] = 0xFE;
        // Reset vector at $FFFC/$FFFD -> $C000
        data[base + 0x3FFC] = 0x00;
        data[base + 0x3FFD] = 0xC0;
        data
    }

    fn seeded(m: &mut AstManager) -> ContextScheduler {
        let mut ctx = Context::new(m);
        ctx.load_ines(m, &make_ines_nop_rom()).unwrap();
        let mut sched = ContextScheduler::new();
        sched.add_context(ctx);
        sched
    }

    #[test]
    fn budget_retires_the_context() {
        let mut m = AstManager::new();
        let mut sched = seeded(&mut m);
        sched.set_maximum_cpu_cycles(50);

        assert!(sched.have_contexts());
        sched.run_next_context(&mut m).unwrap();
        assert!(!sched.have_contexts());

        let done = sched.completed_contexts();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].cpu_cycle_count(), 50);
    }

    #[test]
    fn stop_predicate_retires_early() {
        let mut m = AstManager::new();
        let mut sched = seeded(&mut m);
        sched.set_maximum_cpu_cycles(1_000);
        sched.set_stop_predicate(|ctx| ctx.cpu_cycle_count() >= 9);

        sched.run_next_context(&mut m).unwrap();
        let done = sched.completed_contexts();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].cpu_cycle_count(), 9);
    }

    #[test]
    fn priority_orders_the_queue_with_fifo_ties() {
        let mut m = AstManager::new();
        let mut sched = ContextScheduler::new();
        sched.set_maximum_cpu_cycles(1);

        // Tag each context through a RAM marker byte so completion order
        // is observable.
        let tag = |m: &mut AstManager, priority: i32, marker: u8| {
            let mut ctx = Context::new(m);
            ctx.set_priority(priority);
            let v = m.byte(marker);
            ctx.write_ram(0x0000, v);
            ctx
        };

        let low = tag(&mut m, -1, 1);
        let first_tie = tag(&mut m, 5, 2);
        let second_tie = tag(&mut m, 5, 3);

        sched.add_context(low);
        sched.add_context(first_tie);
        sched.add_context(second_tie);

        // Highest priority first; among equals, insertion order.
        sched.run_next_context(&mut m).unwrap();
        sched.run_next_context(&mut m).unwrap();
        sched.run_next_context(&mut m).unwrap();

        let done = sched.completed_contexts();
        assert_eq!(done.len(), 3);
        let markers: Vec<Option<u32>> = done.iter().map(|c| m.value(c.read_ram(0))).collect();
        assert_eq!(markers, vec![Some(2), Some(3), Some(1)]);
    }
}
