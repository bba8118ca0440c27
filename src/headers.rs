//! Header names spoken between the client and the record/playback proxy

use hyper::header::HeaderName;

/// Session id issued by the proxy on start, echoed on every routed request and on stop
pub const RECORDING_ID: HeaderName = HeaderName::from_static("x-recording-id");

/// Mode of the session a routed request belongs to
pub const RECORDING_MODE: HeaderName = HeaderName::from_static("x-recording-mode");

/// `scheme://host` of the real service the request was meant for
pub const RECORDING_UPSTREAM_BASE_URI: HeaderName =
    HeaderName::from_static("x-recording-upstream-base-uri");

/// Whether the proxy should persist the recording on stop
pub const RECORDING_SAVE: HeaderName = HeaderName::from_static("x-recording-save");

/// JSON key naming the recording artifact in the start body
pub const RECORDING_FILE_KEY: &str = "x-recording-file";
