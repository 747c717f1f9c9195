pub mod task;
pub mod queue;
pub mod pipeline;
pub mod pool;
pub mod dispatcher;
pub mod failure_log;
pub mod loader;
