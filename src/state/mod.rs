//! Observable player state.
//!
//! This module holds the snapshot the presentation layer renders from and
//! the broadcast channel it subscribes to.

pub mod player_state;

pub use player_state::{
    FailureKind, PlaybackFailure, PlayerSnapshot, PlayerState, PlayerStateEvent,
};
