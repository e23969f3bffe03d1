//! HERALD Delivery - Channel Abstraction and Strategy Chain
//!
//! The engine never talks to the messaging application directly. It hands a
//! [`DeliveryRequest`] to a [`StrategyChain`], which tries each
//! [`DeliveryStrategy`] in order against a [`DeliveryChannel`] and returns a
//! single [`DeliveryReport`].
//!
//! Outcome classification is single-sourced: the [`ValidityProbe`] and the
//! sent-confirmation check decide success or failure, and nothing rewrites a
//! report afterwards.

pub mod chain;
pub mod channel;
pub mod dry_run;
pub mod probe;
pub mod strategies;

pub use chain::{DeliveryReport, DeliveryVerdict, StrategyChain};
pub use channel::{AttachTechnique, ConversationState, DeliveryChannel, DeliveryRequest};
pub use dry_run::DryRunChannel;
pub use probe::{ProbeVerdict, SentVerdict, ValidityProbe};
pub use strategies::{
    AttemptContext, DeliveryStrategy, FastPathStrategy, ManualEmulationStrategy,
    NavigationStrategy, StrategyOutcome,
};
