//! WAVE/PCM container codec and the in-memory sample buffer

pub mod pcm;
pub mod wave;

pub use pcm::PcmBuffer;
