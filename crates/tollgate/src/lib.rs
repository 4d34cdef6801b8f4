pub mod errors;
pub mod jobs;
pub mod limiter;
pub mod models;
pub mod normalize;
pub mod providers;
pub mod relay;
pub mod storage;
