#![allow(dead_code)]

use changeset::{BufferKind, BufferedGraph, Options, ValidatorMap, buffer};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

/// Routes the crate's logs to the test output, filtered by `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub const BACKENDS: [BufferKind; 2] = [BufferKind::Flat, BufferKind::NodeTree];

/// A buffer of the given kind without validators.
pub fn plain(kind: BufferKind, content: Value) -> Box<dyn BufferedGraph> {
    buffer(content, ValidatorMap::new(), Options::new().with_backend(kind))
        .expect("content is an object")
}
