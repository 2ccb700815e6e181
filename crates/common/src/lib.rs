// canvasdeck-common: shared types and wire formats for the canvasdeck workspace

pub mod etag;
pub mod protocol;
pub mod types;
