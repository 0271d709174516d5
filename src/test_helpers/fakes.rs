use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{BTreeSet, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::session::{ProcessControl, ProcessSignalError, SignalChannel, TerminationNotice};

/// Process table simulated in memory
///
/// The calling process is always alive. Other pids exist once spawned and,
/// unless told otherwise, exit when interrupted.
#[derive(Debug)]
pub struct FakeProcessControl {
    current: i32,
    alive: Mutex<BTreeSet<i32>>,
    interrupted: Mutex<Vec<i32>>,
    exit_on_interrupt: AtomicBool,
}

impl FakeProcessControl {
    pub fn new(current: i32) -> Self {
        Self {
            current,
            alive: Mutex::new(BTreeSet::from([current])),
            interrupted: Mutex::new(Vec::new()),
            exit_on_interrupt: AtomicBool::new(true),
        }
    }

    pub fn spawn(&self, pid: i32) {
        self.alive.lock().insert(pid);
    }

    pub fn exit(&self, pid: i32) {
        self.alive.lock().remove(&pid);
    }

    /// Keep interrupted processes alive, like a process blocking SIGINT
    pub fn ignore_interrupts(&self) {
        self.exit_on_interrupt.store(false, Ordering::SeqCst);
    }

    /// Every pid an interrupt was sent to, in order
    pub fn interrupted(&self) -> Vec<i32> {
        self.interrupted.lock().clone()
    }
}

impl ProcessControl for FakeProcessControl {
    fn current_pid(&self) -> i32 {
        self.current
    }

    fn is_alive(&self, pid: i32) -> bool {
        pid == self.current || self.alive.lock().contains(&pid)
    }

    fn interrupt(&self, pid: i32) -> Result<(), ProcessSignalError> {
        self.interrupted.lock().push(pid);
        let mut alive = self.alive.lock();
        if !alive.contains(&pid) {
            return Err(ProcessSignalError::NoSuchProcess { pid });
        }
        if pid != self.current && self.exit_on_interrupt.load(Ordering::SeqCst) {
            alive.remove(&pid);
        }
        Ok(())
    }
}

/// Signal channel keeping per-pid queues in memory
#[derive(Debug, Default)]
pub struct MemorySignalChannel {
    queues: DashMap<i32, VecDeque<TerminationNotice>>,
}

impl MemorySignalChannel {
    /// Number of notices waiting for `pid`
    pub fn pending(&self, pid: i32) -> usize {
        self.queues.get(&pid).map_or(0, |queue| queue.len())
    }
}

impl SignalChannel for MemorySignalChannel {
    fn send(&self, pid: i32, notice: &TerminationNotice) -> io::Result<()> {
        self.queues.entry(pid).or_default().push_back(notice.clone());
        Ok(())
    }

    fn poll(&self, pid: i32) -> io::Result<Option<TerminationNotice>> {
        Ok(self
            .queues
            .get_mut(&pid)
            .and_then(|mut queue| queue.pop_front()))
    }

    fn clear(&self, pid: i32) -> io::Result<()> {
        self.queues.remove(&pid);
        Ok(())
    }
}
