use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use disposables_protocol::{SetupMessage, WaitCondition, DEFAULT_CONTROL_PORT, DEFAULT_READY_TIMEOUT_S};

use crate::container::Container;
use crate::context::EngineContext;
use crate::error::Result;
use crate::process::to_args;

/// Describes the container to create.
///
/// ```no_run
/// use disposables::ContainerParams;
///
/// let mut container = ContainerParams::new("docker.io/nginx:alpine")
///     .port(80)
///     .wait_for_port(80)
///     .create()?;
/// assert!(container.wait_for_event()?.is_ready());
/// # Ok::<(), disposables::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct ContainerParams {
    image: String,
    ports: Vec<u16>,
    env: Vec<(String, String)>,
    files: Vec<(String, Vec<u8>)>,
    wait_for: Vec<WaitCondition>,
    entrypoint: Option<Vec<String>>,
    cmd: Option<Vec<String>>,
    control_port: u16,
    ready_timeout_s: u64,
}

impl ContainerParams {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ports: Vec::new(),
            env: Vec::new(),
            files: Vec::new(),
            wait_for: Vec::new(),
            entrypoint: None,
            cmd: None,
            control_port: DEFAULT_CONTROL_PORT,
            ready_timeout_s: DEFAULT_READY_TIMEOUT_S,
        }
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    /// Publishes a container port on the host.
    pub fn port(mut self, port: u16) -> Self {
        self.ports.push(port);
        self
    }

    pub fn ports(mut self, ports: impl IntoIterator<Item = u16>) -> Self {
        self.ports.extend(ports);
        self
    }

    /// Sets an environment variable. Setting the same key again replaces its value.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.env.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.env.push((key, value)),
        }
        self
    }

    /// Writes `bytes` to `path` inside the container before the entrypoint starts.
    pub fn file(mut self, path: impl Into<String>, bytes: impl AsRef<[u8]>) -> Self {
        self.files.push((path.into(), bytes.as_ref().to_vec()));
        self
    }

    pub fn wait_for(mut self, condition: WaitCondition) -> Self {
        self.wait_for.push(condition);
        self
    }

    pub fn wait_for_port(self, port: u16) -> Self {
        self.wait_for(WaitCondition::PortReachable(port))
    }

    pub fn wait_for_stdout(self, pattern: impl Into<String>) -> Self {
        self.wait_for(WaitCondition::StdoutMatches(pattern.into()))
    }

    /// Waits for a command to succeed inside the container. An interval of 0
    /// runs the command once.
    pub fn wait_for_cmd<I>(self, argv: I, interval_msec: u64) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.wait_for(WaitCondition::CommandSucceeds {
            argv: to_args(argv),
            interval_msec,
        })
    }

    /// Replaces the image's entrypoint.
    pub fn entrypoint<I>(mut self, argv: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.entrypoint = Some(to_args(argv));
        self
    }

    /// Replaces the image's command.
    pub fn cmd<I>(mut self, argv: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.cmd = Some(to_args(argv));
        self
    }

    /// How long the agent waits for the wait conditions. Sub-second parts are dropped.
    pub fn ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout_s = timeout.as_secs();
        self
    }

    /// Container port the agent listens on for the control connection.
    pub fn control_port(mut self, port: u16) -> Self {
        self.control_port = port;
        self
    }

    /// The message the agent would receive if the container were created now.
    pub fn setup_message(&self) -> SetupMessage {
        SetupMessage {
            port: self.control_port,
            wait_for: self.wait_for.clone(),
            ready_timeout_s: self.ready_timeout_s,
            files: self
                .files
                .iter()
                .map(|(path, bytes)| (path.clone(), BASE64_STANDARD.encode(bytes)))
                .collect(),
        }
    }

    /// Freezes the current parameters. Later changes to the builder do not
    /// affect the returned value.
    pub fn launch_spec(&self) -> LaunchSpec {
        LaunchSpec {
            image: self.image.clone(),
            ports: self.ports.clone(),
            env: self.env.clone(),
            entrypoint: self.entrypoint.clone(),
            cmd: self.cmd.clone(),
            setup: self.setup_message(),
        }
    }

    /// Creates the container using the process-wide default context.
    pub fn create(&self) -> Result<Container> {
        self.create_using(EngineContext::global()?)
    }

    pub fn create_using(&self, ctx: &EngineContext) -> Result<Container> {
        Container::create(ctx, self.launch_spec())
    }
}

/// Immutable snapshot of [`ContainerParams`] consumed by container creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub image: String,
    pub ports: Vec<u16>,
    pub env: Vec<(String, String)>,
    pub entrypoint: Option<Vec<String>>,
    pub cmd: Option<Vec<String>>,
    pub setup: SetupMessage,
}

impl LaunchSpec {
    /// Control port first, then requested ports in first-seen order, without duplicates.
    pub fn port_set(&self) -> Vec<u16> {
        let mut ports = Vec::with_capacity(self.ports.len() + 1);
        for port in std::iter::once(self.setup.port).chain(self.ports.iter().copied()) {
            if !ports.contains(&port) {
                ports.push(port);
            }
        }
        ports
    }
}
