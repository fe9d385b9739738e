mod channel;
mod dispatcher;
mod manager;

pub(crate) use channel::Command;
pub(crate) use manager::WorkerHandle;
