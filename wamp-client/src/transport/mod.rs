pub mod raw_socket;
pub mod transport;
