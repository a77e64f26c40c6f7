// Purpose: voices, polyphony and the control/audio split
// This layer sits above the DSP primitives and owns everything per-note

pub mod curves;
pub mod handle;
pub mod message;
pub mod operator;
pub mod poly;
pub mod routing;
pub mod telemetry;
pub mod voice;

pub use curves::{CurveBank, CurveSlot};
pub use handle::SynthHandle;
pub use message::{ParamChange, SynthMessage};
pub use operator::FmOperator;
pub use poly::Synth;
pub use routing::{RoutingGrid, SharedRouting};
pub use voice::{Voice, VoiceState, OUTPUT_LIMIT};
