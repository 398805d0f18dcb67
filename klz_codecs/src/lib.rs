mod flate;

pub use flate::{FlateChunkSink, FlateCodec};

use klz_core::Codec;
use std::sync::Arc;

/// The codec used when nothing else is asked for.
pub fn default_codec() -> Arc<dyn Codec> {
    Arc::new(FlateCodec)
}
