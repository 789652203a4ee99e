// Streaming multipart/form-data uploads.
//
// `MultipartUpload` describes one upload: scalar form fields plus a single
// file field. `start` opens the file and spawns a producer thread that
// copies it into a bounded pipe. The read end of the pipe becomes the file
// part of a reqwest `Form`, which frames the parts and owns the boundary,
// so the HTTP layer pulls file bytes only as fast as the request goes out.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use reqwest::blocking::multipart::{Form, Part};
use thiserror::Error;
use tracing::debug;

use super::pipe::{self, PipeStats, PipeWriter, CHUNK_SIZE};

const FILE_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("cannot open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot build multipart form: {0}")]
    Form(#[source] reqwest::Error),

    #[error("cannot read {}: {source}", path.display())]
    Copy {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The HTTP side stopped reading the body before it was complete.
    #[error("upload body was not fully consumed")]
    Disconnected,

    #[error("upload producer panicked")]
    Panicked,
}

impl UploadError {
    /// True when the producer only failed because the consumer went away,
    /// which makes the consumer's own error the one worth reporting.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, UploadError::Disconnected)
    }

    fn to_io(&self) -> io::Error {
        let kind = match self {
            UploadError::Open { source, .. } | UploadError::Copy { source, .. } => source.kind(),
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, self.to_string())
    }
}

/// One multipart upload: form fields plus exactly one file.
#[derive(Debug, Clone)]
pub struct MultipartUpload {
    fields: BTreeMap<String, String>,
    file_field: String,
    path: PathBuf,
    capacity: usize,
}

impl MultipartUpload {
    pub fn new(file_field: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        MultipartUpload {
            fields: BTreeMap::new(),
            file_field: file_field.into(),
            path: path.into(),
            capacity: pipe::DEFAULT_CAPACITY,
        }
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn fields<I, K, V>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.fields
            .extend(fields.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Number of chunks the pipe may queue before the producer blocks.
    pub fn pipe_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Base name of the local path, sent as the part's `filename`.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
    }

    /// Open the file and begin producing the body.
    ///
    /// Failing to open the file is reported here, before the HTTP layer has
    /// seen a single byte. Every call builds a new form with its own boundary.
    pub fn start(&self) -> Result<UploadStream, UploadError> {
        let open_err = |source| UploadError::Open {
            path: self.path.clone(),
            source,
        };
        let file = File::open(&self.path).map_err(open_err)?;
        let meta = file.metadata().map_err(open_err)?;
        if !meta.is_file() {
            return Err(open_err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a regular file",
            )));
        }

        let (writer, reader) = pipe::pipe(self.capacity);
        let part = Part::reader(reader)
            .file_name(self.file_name())
            .mime_str(FILE_CONTENT_TYPE)
            .map_err(UploadError::Form)?;
        let form = self
            .fields
            .iter()
            .fold(Form::new(), |form, (name, value)| {
                form.text(name.clone(), value.clone())
            })
            .part(self.file_field.clone(), part);
        let boundary = form.boundary().to_string();

        debug!(
            path = %self.path.display(),
            size = meta.len(),
            boundary = %boundary,
            "starting multipart upload"
        );
        let producer = Producer::spawn(writer, file, self.path.clone());
        Ok(UploadStream {
            form,
            boundary,
            producer,
        })
    }
}

/// A running upload: the form to hand to the transport and the producer
/// feeding its file part.
pub struct UploadStream {
    pub form: Form,
    pub boundary: String,
    pub producer: Producer,
}

pub struct Producer {
    handle: JoinHandle<Result<u64, UploadError>>,
    stats: PipeStats,
}

impl Producer {
    /// Copy `source` into `writer` on a new thread.
    pub(crate) fn spawn<R>(writer: PipeWriter, source: R, path: PathBuf) -> Self
    where
        R: Read + Send + 'static,
    {
        let stats = writer.stats();
        let handle = thread::spawn(move || produce(writer, source, path));
        Producer { handle, stats }
    }

    pub fn stats(&self) -> PipeStats {
        self.stats.clone()
    }

    /// Wait for the producer and return the number of file bytes it copied.
    ///
    /// Must only be called once the body reader has been dropped or read to
    /// the end, otherwise this blocks on a full pipe.
    pub fn finish(self) -> Result<u64, UploadError> {
        self.handle.join().map_err(|_| UploadError::Panicked)?
    }
}

fn produce<R: Read>(mut writer: PipeWriter, source: R, path: PathBuf) -> Result<u64, UploadError> {
    match copy_file(&mut writer, source, &path) {
        Ok(copied) => {
            writer.close().map_err(|err| pipe_error(err, &path))?;
            debug!(bytes = copied, "upload file copied");
            Ok(copied)
        }
        Err(err) => {
            debug!(error = %err, "aborting upload body");
            writer.abort(err.to_io());
            Err(err)
        }
    }
}

fn copy_file<R: Read>(writer: &mut PipeWriter, mut source: R, path: &Path) -> Result<u64, UploadError> {
    let mut copied = 0u64;
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = match source.read(&mut buf) {
            Ok(0) => return Ok(copied),
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(UploadError::Copy {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        writer
            .write_all(&buf[..n])
            .map_err(|err| pipe_error(err, path))?;
        copied += n as u64;
    }
}

fn pipe_error(err: io::Error, path: &Path) -> UploadError {
    if err.kind() == io::ErrorKind::BrokenPipe {
        UploadError::Disconnected
    } else {
        UploadError::Copy {
            path: path.to_path_buf(),
            source: err,
        }
    }
}
