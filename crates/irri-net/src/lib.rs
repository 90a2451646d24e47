//! ---
//! irri_section: "07-networking-interfaces"
//! irri_subsection: "module"
//! irri_type: "source"
//! irri_scope: "code"
//! irri_description: "Network transports bridging the engine to the outside."
//! irri_version: "v0.1.0-alpha"
//! irri_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! Transport adapters for the coordination engine: the MQTT device channel
//! (inbound telemetry, outbound commands) and the WebSocket observer server.
//! Both are owned by the daemon and torn down through explicit handles; the
//! engine itself never touches a socket.

pub mod mqtt;
pub mod websocket;

pub use mqtt::{DeviceChannel, DeviceChannelHandle, MqttLink};
pub use websocket::{ObserverServer, ObserverServerHandle};
