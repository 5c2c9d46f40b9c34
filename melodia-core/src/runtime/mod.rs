pub mod backend;
pub mod cleanup;
pub mod pipeline;
pub mod polling;
pub mod scheduler;
pub mod status;
pub mod storage;
pub mod types;
