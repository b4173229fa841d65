//! Conversation layer of the kWh manager.
//!
//! Every actor owns up to one live slot per [`WorkflowKind`]. Events are
//! routed by the [`Dispatcher`] under a per-actor lock, idle slots expire
//! lazily and are swept by the [`IdleReaper`]. Replies leave through the
//! [`Messenger`] trait, so the layer knows nothing about the transport.

pub use clock::{Clock, ManualClock, SystemClock};
pub use dispatcher::{DispatchOutcome, Dispatcher, DispatcherBuilder};
pub use error::{FlowError, correlation_code};
pub use event::{ActorEvent, EventKind, Profile};
pub use messenger::{Button, Document, Keyboard, Messenger, MessengerError, OutboundMessage};
pub use parsing::Period;
pub use reaper::IdleReaper;
pub use registry::{ActorSlots, WorkflowRegistry};
pub use settings::WorkflowSettings;
pub use workflow::{
    HistoryStep, InviteStep, LowBalanceRow, LowBalanceStep, RechargeStep, RechargeTarget,
    RegistrationStep, UsageStep, Workflow, WorkflowKind, WorkflowSlot,
};

mod clock;
mod dispatcher;
mod error;
mod event;
mod flows;
mod messenger;
mod parsing;
mod reaper;
mod registry;
mod settings;
mod ui;
mod workflow;
