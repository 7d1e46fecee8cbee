pub mod letta;
pub mod sse;
