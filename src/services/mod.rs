pub mod encoder;
pub mod publisher;
pub mod queue;
pub mod status;
