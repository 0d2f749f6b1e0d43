//! Record speech from the microphone until the speaker stops talking, then
//! score its pronunciation.
//!
//! - [`audio`]: capture sources, framing, voice-activity detection, WAV
//!   encoding and pre-submission validation.
//! - [`pipeline`]: the capture controller state machine.
//! - [`assess`]: pronunciation-assessment client and result persistence.
//! - [`config`]: settings, paths and construction-time validation.

pub mod assess;
pub mod audio;
pub mod config;
pub mod pipeline;
