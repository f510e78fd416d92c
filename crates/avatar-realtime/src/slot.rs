use tokio::task::JoinHandle;

/// Owns at most one background task. Arming a new task aborts the previous one,
/// and dropping the slot aborts whatever it still holds.
#[derive(Debug, Default)]
pub(crate) struct TaskSlot {
    handle: Option<JoinHandle<()>>,
}

impl TaskSlot {
    pub(crate) fn arm(&mut self, handle: JoinHandle<()>) {
        self.cancel();
        self.handle = Some(handle);
    }

    /// Aborts the held task. Returns whether there was one.
    pub(crate) fn cancel(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Forgets the held task without aborting it. Used by a task that is
    /// retiring itself from the slot.
    pub(crate) fn release(&mut self) {
        self.handle.take();
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for TaskSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}
