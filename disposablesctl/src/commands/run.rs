//! `disposablesctl run`: create a container, report its bindings and the
//! agent's readiness verdict, optionally holding the control connection.

use anyhow::{bail, Context, Result};
use clap::Args;
use disposables::{ContainerParams, EngineContext};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Image to run
    #[arg(value_name = "IMAGE")]
    pub image: String,

    /// Container port to publish on the host
    #[arg(short = 'p', long = "port", value_name = "PORT")]
    pub ports: Vec<u16>,

    /// Environment variable for the container
    #[arg(short = 'e', long = "env", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub env: Vec<(String, String)>,

    /// Host file copied into the container before the entrypoint starts
    #[arg(long = "file", value_name = "CONTAINER_PATH=HOST_PATH", value_parser = parse_file_mapping)]
    pub files: Vec<(String, PathBuf)>,

    /// Ready once a TCP connection to this container port succeeds
    #[arg(long = "wait-port", value_name = "PORT")]
    pub wait_ports: Vec<u16>,

    /// Ready once a line of the entrypoint's stdout contains this text
    #[arg(long = "wait-stdout", value_name = "TEXT")]
    pub wait_stdout: Vec<String>,

    /// Ready once this command exits successfully (split on whitespace)
    #[arg(long = "wait-cmd", value_name = "CMD")]
    pub wait_cmd: Option<String>,

    /// Retry period for --wait-cmd; 0 runs it once
    #[arg(long = "wait-interval-ms", value_name = "N", default_value_t = 0, requires = "wait_cmd")]
    pub wait_interval_ms: u64,

    /// Seconds the agent waits for the conditions
    #[arg(long = "ready-timeout", value_name = "SECS")]
    pub ready_timeout: Option<u64>,

    /// Entrypoint override, one argument per occurrence
    #[arg(long = "entrypoint", value_name = "ARG", allow_hyphen_values = true)]
    pub entrypoint: Vec<String>,

    /// Command override, one argument per occurrence
    #[arg(long = "cmd", value_name = "ARG", allow_hyphen_values = true)]
    pub cmd: Vec<String>,

    /// Keep the control connection open until stdin reaches EOF
    #[arg(long)]
    pub hold: bool,
}

impl RunArgs {
    pub fn to_params(&self) -> Result<ContainerParams> {
        let mut params = ContainerParams::new(&self.image).ports(self.ports.iter().copied());

        for (key, value) in &self.env {
            params = params.env(key, value);
        }
        for (container_path, host_path) in &self.files {
            let bytes = fs::read(host_path)
                .with_context(|| format!("failed to read {}", host_path.display()))?;
            params = params.file(container_path, bytes);
        }
        for port in &self.wait_ports {
            params = params.wait_for_port(*port);
        }
        for text in &self.wait_stdout {
            params = params.wait_for_stdout(text);
        }
        if let Some(cmd) = &self.wait_cmd {
            let argv: Vec<&str> = cmd.split_whitespace().collect();
            if argv.is_empty() {
                bail!("--wait-cmd needs at least one word");
            }
            params = params.wait_for_cmd(argv, self.wait_interval_ms);
        }
        if let Some(secs) = self.ready_timeout {
            params = params.ready_timeout(Duration::from_secs(secs));
        }
        if !self.entrypoint.is_empty() {
            params = params.entrypoint(&self.entrypoint);
        }
        if !self.cmd.is_empty() {
            params = params.cmd(&self.cmd);
        }
        Ok(params)
    }
}

pub fn run(ctx: &EngineContext, args: RunArgs) -> Result<()> {
    let params = args.to_params()?;
    let mut container = params
        .create_using(ctx)
        .with_context(|| format!("failed to create container from {}", args.image))?;

    println!("id: {}", container.id());
    let mut printed = Vec::new();
    for port in &args.ports {
        if printed.contains(port) {
            continue;
        }
        printed.push(*port);
        for mapping in container.port(*port)? {
            println!("port {}: {}", port, mapping);
        }
    }

    let event = container
        .wait_for_event()
        .context("lost the control connection before a readiness event")?;
    println!("event: {}", serde_json::to_string(&event)?);

    if !event.is_ready() {
        match container.logs(false) {
            Ok(logs) => eprintln!("{}", logs),
            Err(err) => warn!(error = %err, "could not fetch container logs"),
        }
        bail!("container {} did not become ready", container.id());
    }

    if args.hold {
        info!(id = %container.id(), "holding control connection until stdin closes");
        io::copy(&mut io::stdin().lock(), &mut io::sink()).context("failed to read stdin")?;
    }

    container.close()?;
    Ok(())
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got `{}`", raw)),
    }
}

fn parse_file_mapping(raw: &str) -> Result<(String, PathBuf), String> {
    match raw.split_once('=') {
        Some((container, host)) if container.starts_with('/') && !host.is_empty() => {
            Ok((container.to_string(), PathBuf::from(host)))
        }
        _ => Err(format!(
            "expected CONTAINER_PATH=HOST_PATH with an absolute container path, got `{}`",
            raw
        )),
    }
}
