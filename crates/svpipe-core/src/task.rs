//! The work-unit side of a result.

use crate::TaskId;

/// Anything a result can be built from: a task that knows its own id.
///
/// Results only ever read the id; building a result never mutates the task.
pub trait WorkUnit {
    fn id(&self) -> TaskId;
}

impl WorkUnit for TaskId {
    fn id(&self) -> TaskId {
        *self
    }
}

impl<T: WorkUnit + ?Sized> WorkUnit for &T {
    fn id(&self) -> TaskId {
        (**self).id()
    }
}
