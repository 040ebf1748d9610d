//! Client for MJPEG-over-HTTP camera streams.
//!
//! Many network cameras serve video as a single endless HTTP response of
//! type `multipart/x-mixed-replace`, each part holding one JPEG image. This
//! crate opens such a stream, cuts the body into complete JPEG frames and
//! hands the most recent one to the application.
//!
//! ```no_run
//! use mjpeg_stream::{MjpegStream, StreamConfig, StreamEvent};
//!
//! let mut stream = MjpegStream::new(StreamConfig::default())?;
//! stream.open("http://camera.local/mjpg/video.mjpg");
//!
//! // in the application loop
//! while let Some(event) = stream.poll_event() {
//!     match event {
//!         StreamEvent::FrameReady(event) => println!("{} bytes", event.frame.len()),
//!         StreamEvent::Error(event) => eprintln!("{}", event.message),
//!     }
//! }
//!
//! stream.stop();
//! # Ok::<(), mjpeg_stream::StreamError>(())
//! ```

pub mod boundary;
pub mod cancel;
pub mod config;
mod errors;
pub mod extract;
pub mod frame;
pub mod http;
pub mod locate;
pub mod stream;

pub use boundary::Boundary;
pub use cancel::StopSignal;
pub use config::{Credentials, StreamConfig, StreamEndpoint};
pub use errors::{ErrorKind, Result, StreamError};
pub use extract::FrameExtractor;
pub use frame::FrameHandle;
pub use stream::{
    FrameReadyEvent, MjpegStream, StreamErrorEvent, StreamEvent, StreamState,
    StreamSubscriber,
};

pub const KILOBYTE: usize = 1024;
pub const MEGABYTE: usize = 1024 * KILOBYTE;
