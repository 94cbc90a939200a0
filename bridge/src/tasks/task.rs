use std::io;
use std::thread::{self, JoinHandle};

pub struct TaskMeta {
    pub name: &'static str,
    pub stack_bytes: Option<usize>,
}

pub trait AppTask {
    fn meta(&self) -> TaskMeta;

    /// Consume the task and return a closure that runs its loop.
    fn into_runner(self: Box<Self>) -> Box<dyn FnOnce() + Send + 'static>;
}

/// Start `task` on a named thread of its own.
pub fn spawn(task: Box<dyn AppTask>) -> io::Result<JoinHandle<()>> {
    let meta = task.meta();
    let runner = task.into_runner();

    let mut b = thread::Builder::new().name(meta.name.into());
    if let Some(stack_sz) = meta.stack_bytes {
        b = b.stack_size(stack_sz);
    }

    b.spawn(runner)
}
