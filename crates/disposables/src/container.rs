use std::collections::HashMap;
use std::io;
use std::net::{Shutdown, TcpStream};

use disposables_protocol::{read_event, Event, ENV_SETUP};
use serde_json::Value as JsonValue;
use tracing::{debug, info, instrument, warn};

use crate::context::EngineContext;
use crate::error::{Error, Result};
use crate::params::LaunchSpec;
use crate::ports::{connect_first, parse_port_output, PortMapping};
use crate::process::OutputStream;

/// A running disposable container with an open control connection to its agent.
///
/// Dropping or [closing](Container::close) the value releases the control
/// connection. The agent exits once that connection is gone, and the engine's
/// `--rm` flag removes the container afterwards.
#[derive(Debug)]
pub struct Container {
    ctx: EngineContext,
    id: String,
    port_map: HashMap<u16, Vec<PortMapping>>,
    control: TcpStream,
}

/// Entrypoint and command baked into an image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageDefaults {
    pub entrypoint: Vec<String>,
    pub cmd: Vec<String>,
}

impl ImageDefaults {
    /// Parses the output of `<engine> image inspect <ref>`.
    pub fn from_inspect_output(image: &str, output: &str) -> Result<Self> {
        let invalid = |message: String| Error::ImageMetadataParse {
            image: image.to_string(),
            message,
        };

        let parsed: JsonValue =
            serde_json::from_str(output).map_err(|err| invalid(err.to_string()))?;
        let config = parsed
            .as_array()
            .and_then(|images| images.first())
            .ok_or_else(|| invalid("expected a non-empty JSON array".to_string()))?
            .get("Config")
            .ok_or_else(|| invalid("missing Config".to_string()))?;

        Ok(Self {
            entrypoint: string_list(config, "Entrypoint").map_err(invalid)?,
            cmd: string_list(config, "Cmd").map_err(invalid)?,
        })
    }
}

/// Reads `Config.<field>` as a list of strings; `null` counts as empty.
fn string_list(config: &JsonValue, field: &str) -> std::result::Result<Vec<String>, String> {
    match config.get(field) {
        None => Err(format!("missing Config.{}", field)),
        Some(JsonValue::Null) => Ok(Vec::new()),
        Some(JsonValue::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| format!("Config.{} contains a non-string element", field))
            })
            .collect(),
        Some(_) => Err(format!("Config.{} is not an array", field)),
    }
}

/// Builds the detached `run` invocation that starts the container under the agent.
pub fn launch_args(
    ctx: &EngineContext,
    spec: &LaunchSpec,
    defaults: &ImageDefaults,
    setup_json: &str,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "run".into(),
        "-d".into(),
        "--rm".into(),
        "-v".into(),
        ctx.volume_spec(),
        "-e".into(),
        format!("{}={}", ENV_SETUP, setup_json),
    ];
    for (key, value) in &spec.env {
        args.push("-e".into());
        args.push(format!("{}={}", key, value));
    }
    for port in spec.port_set() {
        args.push("-p".into());
        args.push(port.to_string());
    }
    args.push(format!("--entrypoint={}", ctx.agent_path()));
    args.push(spec.image.clone());
    args.push("run".into());
    args.extend(
        spec.entrypoint
            .as_ref()
            .unwrap_or(&defaults.entrypoint)
            .iter()
            .cloned(),
    );
    args.extend(spec.cmd.as_ref().unwrap_or(&defaults.cmd).iter().cloned());
    args
}

impl Container {
    /// Creates and starts a container, returning once the control connection
    /// to its agent is open.
    #[instrument(skip(ctx, spec), fields(image = %spec.image))]
    pub fn create(ctx: &EngineContext, spec: LaunchSpec) -> Result<Self> {
        ensure_image(ctx, &spec.image)?;

        let inspect = ctx.invoke(["image", "inspect", spec.image.as_str()])?;
        let defaults = ImageDefaults::from_inspect_output(&spec.image, &inspect)?;

        let setup_json = spec.setup.to_json()?;
        let args = launch_args(ctx, &spec, &defaults, &setup_json);

        let id = match ctx.invoke(args.iter().cloned()) {
            Ok(id) => id,
            Err(err) => {
                warn!(error = %err, "launch failed, bootstrapping agent volume and retrying");
                ctx.bootstrap_volume()?;
                ctx.invoke(args)?
            }
        };
        info!(%id, "container launched");

        let mut port_map = HashMap::new();
        for port in spec.port_set() {
            let port_arg = port.to_string();
            let output = ctx.invoke(["port", id.as_str(), port_arg.as_str()])?;
            let mappings = parse_port_output(&output)?;
            debug!(port, ?mappings, "discovered port mappings");
            port_map.insert(port, mappings);
        }

        let control_port = spec.setup.port;
        let control = connect_first(
            control_port,
            port_map.get(&control_port).map(Vec::as_slice).unwrap_or(&[]),
        )?;
        info!(%id, control_port, "connected to agent");

        Ok(Self {
            ctx: ctx.clone(),
            id,
            port_map,
            control,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    /// Blocks until the agent reports the readiness outcome.
    pub fn wait_for_event(&mut self) -> Result<Event> {
        let event = read_event(&mut self.control)?;
        debug!(id = %self.id, ?event, "received agent event");
        Ok(event)
    }

    /// Host bindings of a port requested at creation (or the control port).
    pub fn port(&self, port: u16) -> Result<&[PortMapping]> {
        self.port_map
            .get(&port)
            .map(Vec::as_slice)
            .ok_or(Error::UndefinedPort { port })
    }

    /// Opens a TCP connection to a published port, trying each binding in order.
    pub fn connect_port(&self, port: u16) -> Result<TcpStream> {
        connect_first(port, self.port(port)?)
    }

    /// Container logs collected in one piece. With `follow` this blocks until
    /// the container exits, which cannot happen while this value holds the
    /// control connection; use [`logs_stream`](Self::logs_stream) to follow a
    /// live container.
    pub fn logs(&self, follow: bool) -> Result<String> {
        let mut args = vec!["logs"];
        if follow {
            args.push("-f");
        }
        args.push(self.id.as_str());
        self.ctx.invoke(args)
    }

    /// Follows the container logs as they are written.
    pub fn logs_stream(&self) -> Result<OutputStream> {
        self.ctx.stream(["logs", "-f", self.id.as_str()])
    }

    /// Releases the control connection. The container itself is left to exit
    /// on its own.
    pub fn close(self) -> Result<()> {
        match self.control.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(Error::io("failed to close control connection", err)),
        }
    }
}

fn ensure_image(ctx: &EngineContext, image: &str) -> Result<()> {
    match ctx.invoke(["image", "exists", image]) {
        Ok(_) => Ok(()),
        Err(err) if err.is_exit_status() => {
            info!(%image, "pulling image");
            ctx.invoke(["image", "pull", image]).map(drop)
        }
        Err(err) => Err(err),
    }
}
