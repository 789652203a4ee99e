// File uploads as streamed multipart/form-data bodies.
//
// - `pipe`: bounded, backpressured byte channel between producer and HTTP
//   body reader.
// - `encoder`: builds the multipart form and copies the file into the pipe
//   from a producer thread.

pub mod encoder;
pub mod pipe;

pub use encoder::{MultipartUpload, Producer, UploadError, UploadStream};
pub use pipe::{PipeReader, PipeStats};
