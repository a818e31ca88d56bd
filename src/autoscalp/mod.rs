//! Auto-scalp engine: short entries on exhausted pumps, managed exits
//!
//! Per symbol: NONE -> ACTIVE -> CLOSED. A symbol can be reopened once it
//! no longer has an ACTIVE position.

mod engine;
mod position;
mod settings;

pub use engine::{
    should_enter, AutoScalpEngine, AutoScalpStats, TickReport, REVERSAL_SIGNS_REQUIRED,
};
pub use position::{stop_price, AutoScalpPosition, ExitReason, PositionStatus};
pub use settings::{AutoScalpSettings, SettingsHandle};
