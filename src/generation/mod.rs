/*!
 * Summary generation.
 *
 * - `config`: caller-supplied decoding options
 * - `stop`: stop-marker detection over an arbitrarily fragmented stream
 * - `stage`: drives a `Generator` and yields clean text
 * - `bullets`: turns clean text into completed bullet lines
 */

pub mod bullets;
pub mod config;
pub mod stage;
pub mod stop;

pub use bullets::{BulletAssembler, BulletLine};
pub use config::GenerationConfig;
pub use stage::{GenerationChunk, GenerationStage, StopReason};
pub use stop::{StopScan, StopSequenceDetector};
