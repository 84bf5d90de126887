//! Combat logging
//!
//! Every battlefield event worth reading afterwards ends up in the
//! [`log::CombatLog`].

pub mod log;
