//! Time-slice task scheduler.
//!
//! Companion discipline to the sweep scheduler: a preemptive runqueue that
//! always runs the task with the least remaining time slice. It reuses the
//! same sorted-insertion walk as the sweep scheduler's add, minus the
//! circular/wrap logic, and selects in O(1) from the front of the array.
//!
//! Two arrays back the queue: tasks run from `active`, and an expired task
//! parks on `expired` with a replenished slice until the active array drains,
//! at which point the arrays swap.

use std::collections::VecDeque;

/// Task identifier assigned by the host.
pub type Pid = u64;

/// Slice granted to newly created and replenished tasks, in jiffies.
pub const NEW_TASK_SLICE: u64 = 100;

/// A schedulable task tracked by the runqueue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub pid: Pid,
    /// Remaining time slice in jiffies.
    pub slice: u64,
    /// Set when this task should yield the CPU at the next opportunity.
    pub need_resched: bool,
}

impl Task {
    /// A fresh task holding the full new-task slice.
    pub fn new(pid: Pid) -> Task {
        Task {
            pid,
            slice: NEW_TASK_SLICE,
            need_resched: false,
        }
    }
}

/// Preemptive least-slice-first runqueue.
#[derive(Debug, Default)]
pub struct RunQueue {
    /// Runnable tasks, ascending by remaining slice.
    active: VecDeque<Task>,
    /// Expired tasks waiting with replenished slices for the array swap.
    expired: VecDeque<Task>,
    curr: Option<Pid>,
    nr_switches: u64,
}

impl RunQueue {
    pub fn new() -> RunQueue {
        RunQueue::default()
    }

    /// Build a runqueue around a seed task, ready for the first `schedule`.
    pub fn with_seed(seed_pid: Pid) -> RunQueue {
        let mut rq = RunQueue::new();
        rq.activate(Task::new(seed_pid));
        rq
    }

    /// Tasks known to the scheduler, runnable or expired.
    pub fn nr_running(&self) -> usize {
        self.active.len() + self.expired.len()
    }

    /// Context switches performed so far.
    pub fn nr_switches(&self) -> u64 {
        self.nr_switches
    }

    /// The task currently holding the CPU.
    pub fn current(&self) -> Option<Pid> {
        self.curr
    }

    /// Whether the host should call [`schedule`](Self::schedule): some task
    /// was flagged for preemption, or the running task is gone or expired.
    pub fn need_resched(&self) -> bool {
        let curr_runnable = self
            .curr
            .map(|pid| self.active.iter().any(|t| t.pid == pid))
            .unwrap_or(false);
        (!curr_runnable && self.nr_running() > 0)
            || self.active.iter().chain(self.expired.iter()).any(|t| t.need_resched)
    }

    /// Pick the next task: the first active task with slice remaining.
    ///
    /// Swaps in the expired array when the active one has no runnable task
    /// left, counts a context switch when the selection changes, and clears
    /// pending reschedule flags.
    pub fn schedule(&mut self) -> Option<Pid> {
        if self.nr_running() == 0 {
            self.curr = None;
            return None;
        }

        // A drained active array means every runnable task expired: the
        // replenished batch takes over.
        if !self.active.iter().any(|t| t.slice > 0) {
            std::mem::swap(&mut self.active, &mut self.expired);
        }

        let prev = self.curr;
        match self.active.iter_mut().find(|t| t.slice > 0) {
            Some(next) => {
                self.curr = Some(next.pid);
            }
            None => {
                self.curr = None;
                return None;
            }
        }

        for task in self.active.iter_mut().chain(self.expired.iter_mut()) {
            task.need_resched = false;
        }
        if self.curr != prev {
            self.nr_switches += 1;
        }
        self.curr
    }

    /// Account one jiffy against the running task.
    ///
    /// On expiry the task is flagged, replenished, and parked on the expired
    /// array until the active array drains.
    pub fn tick(&mut self) {
        let Some(pid) = self.curr else { return };
        let Some(pos) = self.active.iter().position(|t| t.pid == pid) else {
            return;
        };

        let task = &mut self.active[pos];
        task.slice = task.slice.saturating_sub(1);
        if task.slice > 0 {
            return;
        }

        let mut expired = self.active.remove(pos).expect("position came from the array");
        expired.need_resched = true;
        expired.slice = NEW_TASK_SLICE;
        Self::enqueue(&mut self.expired, expired);
    }

    /// Split the running task's remaining slice with a newly forked child.
    ///
    /// The parent keeps half; the child gets the other half plus the odd
    /// jiffy, so no time is lost to rounding. The child is returned ready
    /// for [`wake_up_new`](Self::wake_up_new).
    pub fn fork(&mut self, child_pid: Pid) -> Option<Task> {
        let pid = self.curr?;
        let parent = self.active.iter_mut().find(|t| t.pid == pid)?;

        let odd = parent.slice % 2;
        parent.slice /= 2;
        Some(Task {
            pid: child_pid,
            slice: parent.slice + odd,
            need_resched: false,
        })
    }

    /// First wakeup of a freshly created task.
    ///
    /// The newcomer preempts the running task when it needs less time.
    pub fn wake_up_new(&mut self, mut task: Task) {
        let preempts = match self.curr.and_then(|pid| self.active.iter().find(|t| t.pid == pid)) {
            Some(curr) => task.slice < curr.slice,
            None => true,
        };
        task.need_resched = preempts;
        Self::enqueue(&mut self.active, task);
    }

    /// Wake a task from sleep and request a reschedule.
    pub fn activate(&mut self, mut task: Task) {
        task.need_resched = true;
        Self::enqueue(&mut self.active, task);
    }

    /// Remove a task so it can sleep. Returns it to the host, or `None` if
    /// the pid is unknown.
    pub fn deactivate(&mut self, pid: Pid) -> Option<Task> {
        if self.curr == Some(pid) {
            self.curr = None;
        }
        if let Some(pos) = self.active.iter().position(|t| t.pid == pid) {
            return self.active.remove(pos);
        }
        let pos = self.expired.iter().position(|t| t.pid == pid)?;
        self.expired.remove(pos)
    }

    /// Sorted insertion: immediately in front of the first task needing more
    /// time, or at the back when no task does.
    fn enqueue(tasks: &mut VecDeque<Task>, task: Task) {
        let pos = tasks
            .iter()
            .position(|t| task.slice < t.slice)
            .unwrap_or(tasks.len());
        tasks.insert(pos, task);
    }
}
