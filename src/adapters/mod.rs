pub mod files;
#[cfg(feature = "gstreamer")]
pub mod gst;
pub mod http;
pub mod onnx;
pub mod render;
pub mod stream;
#[cfg(feature = "v4l2")]
pub mod v4l2;
pub mod youtube;
