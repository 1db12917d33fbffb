//! Gltch: wearable BLE mute controller and host companion.
//!
//! Controller side: [`dispatch`], [`led`], [`link`] and [`controller`].
//! Companion side: [`episode`], [`companion`], [`audio`], [`ble`].
//! Both share the 3-byte frame [`protocol`].

pub mod audio;
pub mod ble;
pub mod companion;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod episode;
pub mod error;
pub mod hooks;
pub mod led;
pub mod link;
pub mod protocol;
pub mod reconnect;
pub mod transport;

pub use error::GltchError;
