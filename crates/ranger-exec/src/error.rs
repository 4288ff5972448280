use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("`{command}` exited with {code}: {stderr}")]
    Command {
        command: String,
        code: i32,
        stderr: String,
    },
    #[error("io error: {0}")]
    Io(String),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("bad archive: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("download failed: {0}")]
    Download(String),
}

impl From<std::io::Error> for ExecError {
    fn from(e: std::io::Error) -> Self {
        ExecError::Io(e.to_string())
    }
}

pub type ExecResult<T> = Result<T, ExecError>;
