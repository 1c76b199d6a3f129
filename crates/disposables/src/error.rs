use std::io;

use disposables_protocol::FrameError;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("program [{}] exited with code {}: {stderr}", .args.join(" "), display_code(.code))]
    ExitStatus {
        args: Vec<String>,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse metadata of image {image}: {message}")]
    ImageMetadataParse { image: String, message: String },

    #[error("cannot parse mapped port '{token}'")]
    PortMapParse { token: String },

    #[error("cannot connect to any mapping of container port {port}: {source}")]
    Connection {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("cannot read event from agent: {0}")]
    Frame(#[from] FrameError),

    #[error("invalid engine configuration: {message}")]
    Config { message: String },

    #[error("cannot encode setup message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("port {port} was not requested for this container")]
    UndefinedPort { port: u16 },
}

fn display_code(code: &Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "<signal>".to_string())
}

impl Error {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }

    /// True when an engine subcommand ran and reported failure, as opposed to
    /// the engine not being runnable at all.
    pub fn is_exit_status(&self) -> bool {
        matches!(self, Error::ExitStatus { .. })
    }
}
