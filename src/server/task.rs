use std::collections::VecDeque;
use std::sync::mpsc::Sender;
use std::sync::{Condvar, Mutex};

use crate::server::protocol::{Request, Response};

/// One in-flight client request. The handler keeps the receiving end of the
/// completion channel and blocks on it; the worker sends exactly one
/// response.
pub struct Task {
    pub request: Request,
    pub response_tx: Sender<Response>,
}

/// FIFO queue drained by a pool of workers. `pop` blocks until a task is
/// available; `push` wakes one waiting worker.
#[derive(Default)]
pub struct TaskQueue {
    tasks: Mutex<VecDeque<Task>>,
    available: Condvar,
}

impl TaskQueue {
    pub fn new() -> Self {
        TaskQueue {
            tasks: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
        }
    }

    pub fn push(&self, task: Task) {
        let mut tasks = self.tasks.lock().unwrap();
        tasks.push_back(task);
        self.available.notify_one();
    }

    pub fn pop(&self) -> Task {
        let mut tasks = self.tasks.lock().unwrap();
        loop {
            match tasks.pop_front() {
                Some(task) => return task,
                None => tasks = self.available.wait(tasks).unwrap(),
            }
        }
    }
}
