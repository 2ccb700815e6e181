// Wire protocols spoken by canvasdeck crates.

pub mod canvas;
