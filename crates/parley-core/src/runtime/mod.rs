//! Command runtimes that answer `AGENT_EXEC_CMD` requests

mod local;

pub use local::LocalCommandRuntime;
