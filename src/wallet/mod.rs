//! Wallet-extension orchestration
//!
//! Everything that knows it is talking to a wallet lives here: resolving the
//! extension's runtime identity, catching its confirmation popups, and
//! driving them to completion.

pub mod actions;
pub mod approval;
pub mod extension;
pub mod listener;
pub mod network;
pub mod onboarding;

pub use actions::{perform_action, ActionOptions, ActionResult};
pub use approval::{drive_approval, ApprovalOptions, ApprovalReport, FlowState};
pub use extension::{ExtensionIdentity, ExtensionPage};
pub use listener::{PopupListener, PopupWait};
