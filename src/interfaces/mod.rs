pub mod agent_stream;
pub mod transport;
