//! # coex-core
//!
//! Wi-Fi / cellular coexistence engine.
//!
//! Derives the set of Wi-Fi channels that are unsafe to use while given
//! cellular carriers are active, plus role restrictions (SoftAP, Wi-Fi
//! Direct, Wi-Fi Aware) imposed by the carrier, and fans the result out to
//! radio control and subscribers.
//!
//! ## Crate structure
//!
//! - [`channel`]: Wi-Fi channel catalog and frequency ranges
//! - [`cell`]: Cellular carriers and the real/mock channel tracker
//! - [`rules`]: Interference rule table keyed by (RAT, band)
//! - [`config`]: TOML rule table and engine configuration
//! - [`restriction`]: Carrier restriction flags and policy
//! - [`snapshot`]: Published unsafe channel set
//! - [`calculator`]: Pure snapshot derivation
//! - [`notify`]: Listener and remote subscriber fan-out
//! - [`engine`]: Serialized state manager and public API
//! - [`error`]: Error types

pub mod calculator;
pub mod cell;
pub mod channel;
pub mod config;
pub mod engine;
pub mod error;
pub mod notify;
pub mod restriction;
pub mod rules;
pub mod snapshot;

pub use engine::{CoexCollaborators, CoexEngine, CoexEvents, RadioControl, TelephonySource};
pub use error::CoexError;
