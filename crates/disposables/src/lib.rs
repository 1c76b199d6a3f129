//! # Disposables
//!
//! Short-lived containers for integration tests. A container is started with
//! a small agent (`dlc`) as its entrypoint; the agent writes injected files,
//! starts the image's real entrypoint, evaluates the requested wait
//! conditions and reports a single readiness [`Event`] over a control
//! connection.
//!
//! ```no_run
//! use disposables::{ContainerParams, Event};
//!
//! let mut container = ContainerParams::new("docker.io/postgres:alpine")
//!     .env("POSTGRES_PASSWORD", "postgres")
//!     .port(5432)
//!     .wait_for_cmd(["pg_isready"], 500)
//!     .create()?;
//!
//! match container.wait_for_event()? {
//!     Event::Ready => {
//!         let addr = container.port(5432)?[0];
//!         println!("postgres listening on {}", addr);
//!     }
//!     other => panic!("not ready: {:?}\n{}", other, container.logs(false)?),
//! }
//! # Ok::<(), disposables::Error>(())
//! ```
//!
//! Engine, agent image and agent volume come from an [`EngineContext`]. The
//! default one is read from `DISPOSABLES_ENGINE`, `DISPOSABLES_DLC_IMAGE` and
//! `DISPOSABLES_DLC_VOLUME`, falling back to whichever of podman or docker is
//! installed.

pub mod container;
pub mod context;
mod error;
pub mod params;
pub mod ports;
pub mod process;

pub use disposables_protocol as protocol;
pub use disposables_protocol::{Event, SetupMessage, WaitCondition};

pub use container::{Container, ImageDefaults};
pub use context::{EngineContext, EngineContextBuilder};
pub use error::{Error, Result};
pub use params::{ContainerParams, LaunchSpec};
pub use ports::PortMapping;
pub use process::{OutputStream, ProcessRunner, SystemProcessRunner};
