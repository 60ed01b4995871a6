use thiserror::Error;

/// A sink could not deliver something. Never leaves the sink: callers only
/// ever see it in logs.
#[derive(Error, Debug)]
pub enum SinkDispatchError {
    #[error("event queue is full")]
    QueueFull,

    #[error("sink already flushed")]
    Closed,

    #[error("encoding failed: {message}")]
    Encode { message: String },

    #[error("transport error: {message}")]
    Transport { message: String },

    #[error("{url} answered {status}")]
    Status { url: String, status: u16 },

    #[error("presign response carried no url")]
    MissingUrl,
}

impl From<reqwest::Error> for SinkDispatchError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => SinkDispatchError::Status {
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
                status: status.as_u16(),
            },
            None => SinkDispatchError::Transport {
                message: e.to_string(),
            },
        }
    }
}

impl From<csv::Error> for SinkDispatchError {
    fn from(e: csv::Error) -> Self {
        SinkDispatchError::Encode {
            message: e.to_string(),
        }
    }
}
