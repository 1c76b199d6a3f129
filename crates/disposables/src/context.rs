use std::env;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::error::{Error, Result};
use crate::process::{to_args, OutputStream, ProcessRunner, SystemProcessRunner};

/// Path inside every container where the agent volume is mounted.
pub const MOUNT_POINT: &str = "/dlc";

/// Name of the agent executable inside its install directory.
pub const AGENT_BINARY: &str = "dlc";

pub const ENV_ENGINE: &str = "DISPOSABLES_ENGINE";
pub const ENV_AGENT_IMAGE: &str = "DISPOSABLES_DLC_IMAGE";
pub const ENV_VOLUME: &str = "DISPOSABLES_DLC_VOLUME";

pub const DEFAULT_VOLUME: &str = "disposables-dlc";

const AGENT_REPOSITORY: &str = "docker.io/akashrawal/disposables-dlc";

const PROBED_ENGINES: [&str; 2] = ["podman", "docker"];

static GLOBAL_CONTEXT: OnceCell<EngineContext> = OnceCell::new();

pub fn default_agent_image() -> String {
    format!("{}:{}", AGENT_REPOSITORY, env!("CARGO_PKG_VERSION"))
}

fn env_override(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Which container engine, agent image and volume to use.
#[derive(Clone)]
pub struct EngineContext {
    engine: String,
    agent_image: String,
    volume: String,
    runner: Arc<dyn ProcessRunner>,
}

impl fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineContext")
            .field("engine", &self.engine)
            .field("agent_image", &self.agent_image)
            .field("volume", &self.volume)
            .finish()
    }
}

/// Resolved settings in a form suitable for printing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSummary {
    pub engine: String,
    pub agent_image: String,
    pub volume: String,
    pub install_directory: String,
}

#[derive(Default)]
pub struct EngineContextBuilder {
    engine: Option<String>,
    agent_image: Option<String>,
    volume: Option<String>,
    runner: Option<Arc<dyn ProcessRunner>>,
}

impl EngineContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = Some(engine.into());
        self
    }

    pub fn agent_image(mut self, image: impl Into<String>) -> Self {
        self.agent_image = Some(image.into());
        self
    }

    pub fn volume(mut self, volume: impl Into<String>) -> Self {
        self.volume = Some(volume.into());
        self
    }

    /// Replaces the process runner used for every engine invocation,
    /// including the probes made by [`build`](Self::build).
    pub fn runner(mut self, runner: Arc<dyn ProcessRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn build(self) -> Result<EngineContext> {
        let runner = self
            .runner
            .unwrap_or_else(|| Arc::new(SystemProcessRunner));

        let engine = match self.engine.or_else(|| env_override(ENV_ENGINE)) {
            Some(engine) => {
                runner
                    .run(&to_args([engine.as_str(), "--version"]))
                    .map_err(|err| Error::Config {
                        message: format!("cannot verify container engine {}: {}", engine, err),
                    })?;
                engine
            }
            None => probe_engine(runner.as_ref())?,
        };

        let agent_image = self
            .agent_image
            .or_else(|| env_override(ENV_AGENT_IMAGE))
            .unwrap_or_else(default_agent_image);
        let volume = self
            .volume
            .or_else(|| env_override(ENV_VOLUME))
            .unwrap_or_else(|| DEFAULT_VOLUME.to_string());

        info!(%engine, %agent_image, %volume, "resolved engine context");

        Ok(EngineContext {
            engine,
            agent_image,
            volume,
            runner,
        })
    }
}

fn probe_engine(runner: &dyn ProcessRunner) -> Result<String> {
    for candidate in PROBED_ENGINES {
        match runner.run(&to_args([candidate, "--version"])) {
            Ok(version) => {
                debug!(engine = candidate, %version, "found container engine");
                return Ok(candidate.to_string());
            }
            Err(err) => debug!(engine = candidate, error = %err, "engine probe failed"),
        }
    }
    Err(Error::Config {
        message: format!(
            "no container engine found (tried {}; set {} to override)",
            PROBED_ENGINES.join(", "),
            ENV_ENGINE
        ),
    })
}

impl EngineContext {
    pub fn builder() -> EngineContextBuilder {
        EngineContextBuilder::new()
    }

    /// Resolves a context from the environment and the engines on `PATH`.
    pub fn new() -> Result<Self> {
        EngineContextBuilder::new().build()
    }

    /// Process-wide default context, resolved on first use.
    ///
    /// Concurrent first callers block until a single resolution finishes. If
    /// resolution fails the error is returned and the next call tries again.
    pub fn global() -> Result<&'static Self> {
        GLOBAL_CONTEXT.get_or_try_init(Self::new)
    }

    pub fn engine(&self) -> &str {
        &self.engine
    }

    pub fn agent_image(&self) -> &str {
        &self.agent_image
    }

    pub fn volume(&self) -> &str {
        &self.volume
    }

    /// Runs `<engine> args...` and returns its trimmed stdout.
    pub fn invoke<I>(&self, args: I) -> Result<String>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut argv = vec![self.engine.clone()];
        argv.extend(to_args(args));
        self.runner.run(&argv)
    }

    /// Like [`invoke`](Self::invoke), but hands back stdout while the engine
    /// is still running.
    pub fn stream<I>(&self, args: I) -> Result<OutputStream>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut argv = vec![self.engine.clone()];
        argv.extend(to_args(args));
        self.runner.stream(&argv)
    }

    /// Directory on the shared volume holding the agent for this agent image.
    pub fn install_directory(&self) -> String {
        let sanitized: String = self
            .agent_image
            .bytes()
            .map(|b| match b {
                b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' | b'-' => b as char,
                _ => '_',
            })
            .collect();
        format!("{}/{}", MOUNT_POINT, sanitized)
    }

    pub fn agent_path(&self) -> String {
        format!("{}/{}", self.install_directory(), AGENT_BINARY)
    }

    pub(crate) fn volume_spec(&self) -> String {
        format!("{}:{}", self.volume, MOUNT_POINT)
    }

    /// Creates the agent volume if needed and installs the agent into it.
    ///
    /// Safe to repeat: an existing volume is reused and the agent's own
    /// `install` command skips work that is already done.
    #[instrument(skip(self), fields(volume = %self.volume, image = %self.agent_image))]
    pub fn bootstrap_volume(&self) -> Result<()> {
        match self.invoke(["volume", "exists", self.volume.as_str()]) {
            Ok(_) => debug!("agent volume already exists"),
            Err(err) if err.is_exit_status() => {
                info!("creating agent volume");
                self.invoke(["volume", "create", self.volume.as_str()])?;
            }
            Err(err) => return Err(err),
        }

        let install_dir = self.install_directory();
        self.invoke([
            "run",
            "-i",
            "--rm",
            "-v",
            self.volume_spec().as_str(),
            self.agent_image.as_str(),
            "install",
            install_dir.as_str(),
        ])?;
        info!(%install_dir, "agent installed");
        Ok(())
    }

    pub fn summary(&self) -> ContextSummary {
        ContextSummary {
            engine: self.engine.clone(),
            agent_image: self.agent_image.clone(),
            volume: self.volume.clone(),
            install_directory: self.install_directory(),
        }
    }
}
