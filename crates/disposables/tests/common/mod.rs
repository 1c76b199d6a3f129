#![allow(dead_code)]

use disposables::protocol::{write_event, Event, FrameError};
use disposables::{EngineContext, Error, ProcessRunner, Result};
use std::io::{ErrorKind, Read};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

pub const INSPECT_E_C: &str = r#"[{"Config":{"Entrypoint":["/e"],"Cmd":["c"]}}]"#;
pub const CONTAINER_ID: &str = "3f1c2a9d";

type Responder = Box<dyn Fn(&[String], usize) -> Result<String> + Send + Sync>;

/// Engine stand-in that records every invocation and answers from a closure.
///
/// The closure receives the argv and the number of earlier invocations that
/// had the same first three arguments.
pub struct ScriptedEngine {
    calls: Mutex<Vec<Vec<String>>>,
    responder: Responder,
}

impl std::fmt::Debug for ScriptedEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedEngine").finish()
    }
}

impl ScriptedEngine {
    pub fn new(
        responder: impl Fn(&[String], usize) -> Result<String> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            responder: Box::new(responder),
        })
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_matching(&self, prefix: &[&str]) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|argv| {
                argv.len() >= prefix.len() && argv.iter().zip(prefix).all(|(a, p)| a == p)
            })
            .collect()
    }

    pub fn launches(&self) -> Vec<Vec<String>> {
        self.calls_matching(&["podman", "run", "-d"])
    }
}

impl ProcessRunner for ScriptedEngine {
    fn run(&self, argv: &[String]) -> Result<String> {
        let seen = {
            let mut calls = self.calls.lock().unwrap();
            let key: Vec<&String> = argv.iter().take(3).collect();
            let seen = calls
                .iter()
                .filter(|c| c.iter().take(3).collect::<Vec<_>>() == key)
                .count();
            calls.push(argv.to_vec());
            seen
        };
        (self.responder)(argv, seen)
    }
}

pub fn exit_status(argv: &[String], code: i32, stderr: &str) -> Error {
    Error::ExitStatus {
        args: argv.to_vec(),
        code: Some(code),
        stderr: stderr.to_string(),
    }
}

pub fn context(engine: &Arc<ScriptedEngine>) -> EngineContext {
    EngineContext::builder()
        .engine("podman")
        .agent_image("registry.test/dlc:1")
        .volume("dlc-vol")
        .runner(engine.clone())
        .build()
        .unwrap()
}

pub fn args(argv: &[String]) -> Vec<&str> {
    argv.iter().map(String::as_str).collect()
}

/// Answers like a healthy engine whose control port is published at `control`.
pub fn healthy(argv: &[String], control: &str, inspect: &str) -> Result<String> {
    match &args(argv)[1..] {
        ["--version"] => Ok("podman version 5.0.0".into()),
        ["image", "exists", _] => Ok(String::new()),
        ["image", "inspect", _] => Ok(inspect.to_string()),
        ["run", "-d", ..] => Ok(CONTAINER_ID.to_string()),
        ["port", _, "4"] => Ok(control.to_string()),
        ["port", _, port] => Ok(format!("0.0.0.0:4{}\n[::]:4{}", port, port)),
        ["logs", ..] => Ok("agent log line".into()),
        _ => Err(exit_status(argv, 125, "unexpected invocation")),
    }
}

/// Fake agent: accepts one control connection, sends `event`, then holds the
/// connection until the host closes it. A host that hangs up before reading
/// the event is not an agent failure.
pub fn agent_sending(event: Event) -> (String, JoinHandle<()>) {
    agent_writing(move |stream| {
        if let Err(err) = write_event(stream, &event) {
            assert!(peer_closed(&err), "agent failed to send event: {:?}", err);
        }
    })
}

pub fn peer_closed(err: &FrameError) -> bool {
    match err {
        FrameError::Io(err) => matches!(
            err.kind(),
            ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
        ),
        _ => false,
    }
}

/// Fake agent that writes a raw frame header and body, then disconnects.
pub fn agent_truncating(declared: u32, body: &'static [u8]) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let handle = thread::spawn(move || {
        use std::io::Write;
        let (mut stream, _) = listener.accept().unwrap();
        stream.write_all(&declared.to_be_bytes()).unwrap();
        stream.write_all(body).unwrap();
    });
    (addr, handle)
}

pub fn agent_writing(
    write: impl FnOnce(&mut std::net::TcpStream) + Send + 'static,
) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        write(&mut stream);
        let mut rest = Vec::new();
        let _ = stream.read_to_end(&mut rest);
    });
    (addr, handle)
}

/// Address on which nothing is listening.
pub fn refused_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().to_string()
}
