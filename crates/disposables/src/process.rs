use std::fmt::{self, Debug};
use std::io::{self, Cursor, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;

use tracing::debug;

use crate::error::{Error, Result};

/// Runs an external program to completion and returns its trimmed stdout.
///
/// A nonzero exit is reported as [`Error::ExitStatus`]; failing to spawn or
/// talk to the program is reported as [`Error::Io`].
pub trait ProcessRunner: Send + Sync + Debug {
    fn run(&self, argv: &[String]) -> Result<String>;

    /// Starts a program and hands back its stdout while it is still running.
    ///
    /// The default runs the program to completion through [`run`](Self::run)
    /// and replays the captured output.
    fn stream(&self, argv: &[String]) -> Result<OutputStream> {
        let output = self.run(argv)?;
        Ok(OutputStream::from_reader(Cursor::new(output.into_bytes())))
    }
}

/// Stdout of a program that may still be running.
///
/// Dropping the stream kills the program if it has not exited yet.
pub struct OutputStream {
    reader: Box<dyn Read + Send>,
    child: Option<Child>,
}

impl OutputStream {
    pub fn from_reader(reader: impl Read + Send + 'static) -> Self {
        Self {
            reader: Box::new(reader),
            child: None,
        }
    }

    fn from_child(mut child: Child, program: &str) -> Result<Self> {
        let stdout = child.stdout.take().ok_or_else(|| {
            Error::io(
                format!("stdout of {} was not captured", program),
                io::Error::new(io::ErrorKind::BrokenPipe, "no stdout pipe"),
            )
        })?;
        Ok(Self {
            reader: Box::new(stdout),
            child: Some(child),
        })
    }

    /// Stops the program if it is still running and reaps it.
    pub fn close(mut self) -> Result<()> {
        match self.child.take() {
            Some(child) => stop(child),
            None => Ok(()),
        }
    }
}

fn stop(mut child: Child) -> Result<()> {
    if child
        .try_wait()
        .map_err(|err| Error::io("failed to poll streaming program", err))?
        .is_none()
    {
        // Already exited between the poll and the kill is fine.
        let _ = child.kill();
    }
    child
        .wait()
        .map(drop)
        .map_err(|err| Error::io("failed to reap streaming program", err))
}

impl Read for OutputStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl Drop for OutputStream {
    fn drop(&mut self) {
        if let Some(child) = self.child.take() {
            if let Err(err) = stop(child) {
                debug!(error = %err, "streaming program was not reaped");
            }
        }
    }
}

impl fmt::Debug for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputStream")
            .field("pid", &self.child.as_ref().map(Child::id))
            .finish()
    }
}

/// Runs programs on the host, draining stdout and stderr on separate threads
/// so a chatty child can never block on a full pipe.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessRunner;

impl ProcessRunner for SystemProcessRunner {
    fn run(&self, argv: &[String]) -> Result<String> {
        let (program, args) = split_argv(argv)?;

        debug!(?argv, "running");

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| Error::io(format!("failed to spawn {}", program), err))?;

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);
        let (stdout, stderr, status) = finish(&mut child, stdout, stderr, program)?;

        if !status.success() {
            return Err(Error::ExitStatus {
                args: argv.to_vec(),
                code: status.code(),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8(stdout).map_err(|err| {
            Error::io(
                format!("{} wrote non UTF-8 output", program),
                io::Error::new(io::ErrorKind::InvalidData, err),
            )
        })?;
        Ok(stdout.trim().to_string())
    }

    /// Stderr is inherited so the program's diagnostics stay visible.
    fn stream(&self, argv: &[String]) -> Result<OutputStream> {
        let (program, args) = split_argv(argv)?;

        debug!(?argv, "streaming");

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|err| Error::io(format!("failed to spawn {}", program), err))?;
        OutputStream::from_child(child, program)
    }
}

fn split_argv(argv: &[String]) -> Result<(&String, &[String])> {
    argv.split_first().ok_or_else(|| {
        Error::io(
            "cannot run an empty command",
            io::Error::new(io::ErrorKind::InvalidInput, "empty argv"),
        )
    })
}

/// Joins both drain threads and reaps the child before reporting any failure.
fn finish(
    child: &mut Child,
    stdout: Option<DrainHandle>,
    stderr: Option<DrainHandle>,
    program: &str,
) -> Result<(Vec<u8>, Vec<u8>, ExitStatus)> {
    let stdout = join_drain(stdout, program, "stdout");
    let stderr = join_drain(stderr, program, "stderr");
    let status = child
        .wait()
        .map_err(|err| Error::io(format!("failed to wait for {}", program), err));
    Ok((stdout?, stderr?, status?))
}

type DrainHandle = thread::JoinHandle<io::Result<Vec<u8>>>;

fn drain(mut stream: impl Read + Send + 'static) -> DrainHandle {
    thread::spawn(move || {
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf)?;
        Ok(buf)
    })
}

fn join_drain(handle: Option<DrainHandle>, program: &str, stream: &str) -> Result<Vec<u8>> {
    let Some(handle) = handle else {
        return Ok(Vec::new());
    };
    let context = format!("failed to read {} of {}", stream, program);
    match handle.join() {
        Ok(result) => result.map_err(|err| Error::io(context, err)),
        Err(_) => Err(Error::io(
            context,
            io::Error::new(io::ErrorKind::Other, "reader thread panicked"),
        )),
    }
}

/// Collects anything string-like into an owned argument vector.
pub(crate) fn to_args<I>(items: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}
