//! Guided page tours generated by a language model.
//!
//! Three contexts cooperate over channels: the [`initiator`] collects a
//! prompt, the [`coordinator`] snapshots the page, asks the [`gateway`] for
//! steps and forwards them, and a per-tab [`renderer`] plays them through
//! the highlighting library.

pub mod bus;
pub mod config;
pub mod coordinator;
pub mod credential;
pub mod gateway;
pub mod initiator;
pub mod library;
pub mod messages;
pub mod renderer;
pub mod types;

pub use bus::{TabBus, TabHost, TabId};
pub use coordinator::{Coordinator, CoordinatorError, CoordinatorHandle};
pub use credential::{Credential, CredentialStore, FileCredentialStore};
pub use gateway::{GatewayError, ModelGateway};
pub use initiator::{Initiator, Outcome};
pub use renderer::{Page, RenderError, Renderer};
pub use types::{Locator, ModelResult, PageContext, PredefinedTour, TourStep};
