//! # Disposables protocol
//!
//! Wire-level definitions shared between the host library and the `dlc`
//! agent that runs inside every disposable container.
//!
//! Two channels exist:
//!
//! * **Host → agent**: a [`SetupMessage`] serialized as JSON and handed to the
//!   container through the [`ENV_SETUP`] environment variable.
//! * **Agent → host**: a single [`Event`] written to the control socket as a
//!   length-prefixed frame (see [`frame`]).
//!
//! Both [`WaitCondition`] and [`Event`] use the same tagged-union layout: a
//! `kind` discriminant plus an optional `data` payload.
//!
//! ```rust
//! use disposables_protocol::*;
//!
//! let mut msg = SetupMessage::default();
//! msg.wait_for.push(WaitCondition::PortReachable(80));
//! let json = msg.to_json().unwrap();
//! assert!(json.contains(r#"{"kind":"Port","data":80}"#));
//!
//! let event = Event::from_json(br#"{"kind":"Exited","data":null}"#).unwrap();
//! assert_eq!(event, Event::Exited(None));
//! ```

pub mod frame;
mod message;

pub use frame::{read_event, read_frame, write_event, write_frame, FrameError, MAX_FRAME_BYTES};
pub use message::*;

/// Environment variable carrying the serialized [`SetupMessage`] into the container.
pub const ENV_SETUP: &str = "DISPOSABLES_V1_SETUP";

/// Port the agent listens on unless the setup message says otherwise.
pub const DEFAULT_CONTROL_PORT: u16 = 4;

/// Seconds the agent waits for every condition before reporting [`Event::FailedTimeout`].
pub const DEFAULT_READY_TIMEOUT_S: u64 = 15;
