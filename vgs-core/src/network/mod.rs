pub mod connection;

pub use connection::{Connection, ConnectionInfo, Inbound, RelayPorts, loopback};
