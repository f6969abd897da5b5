use std::time::{Duration, Instant};

/// One scheduled background execution of a stored macro. Between wakeups a
/// task holds nothing but its macro address and due time; each wakeup runs
/// the macro body from the top.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: u32,
    pub macro_addr: usize,
    pub interval_ms: u64,
    pub next_due: Instant,
}

/// Cooperative background task list. Purely bookkeeping: the engine asks
/// for due tasks and runs them itself, marking which task is current so a
/// bare `stop` inside a background macro can target its own task.
pub struct Scheduler {
    tasks: Vec<Task>,
    next_id: u32,
    current: Option<u32>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            next_id: 0,
            current: None,
        }
    }

    /// Schedule a macro to run every `interval_ms` milliseconds, starting
    /// one interval from now. Returns the new task id.
    pub fn start(&mut self, macro_addr: usize, interval_ms: u64) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.tasks.push(Task {
            id,
            macro_addr,
            interval_ms,
            next_due: Instant::now() + Duration::from_millis(interval_ms),
        });
        id
    }

    /// Stop a task by id. Stopping a task that does not exist is a no-op.
    pub fn stop(&mut self, id: u32) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|task| task.id != id);
        self.tasks.len() != before
    }

    pub fn stop_all(&mut self) {
        self.tasks.clear();
    }

    /// Id of the background task currently being executed, if any.
    pub fn current_id(&self) -> Option<u32> {
        self.current
    }

    pub fn begin_slice(&mut self, id: u32) {
        self.current = Some(id);
    }

    pub fn end_slice(&mut self) {
        self.current = None;
    }

    /// Tasks whose due time has passed, as (id, macro address) pairs.
    pub fn due(&self, now: Instant) -> Vec<(u32, usize)> {
        self.tasks
            .iter()
            .filter(|task| task.next_due <= now)
            .map(|task| (task.id, task.macro_addr))
            .collect()
    }

    /// Push a task's due time one interval past `now`. No-op if the task
    /// was stopped while it ran.
    pub fn reschedule(&mut self, id: u32, now: Instant) {
        if let Some(task) = self.tasks.iter_mut().find(|task| task.id == id) {
            task.next_due = now + Duration::from_millis(task.interval_ms);
        }
    }

    /// Time until the earliest due task, zero if one is already due.
    pub fn next_wake(&self, now: Instant) -> Option<Duration> {
        self.tasks
            .iter()
            .map(|task| task.next_due.saturating_duration_since(now))
            .min()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
