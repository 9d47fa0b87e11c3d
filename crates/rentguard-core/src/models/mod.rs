pub mod customer;
pub mod document;
pub mod identity;
pub mod insurance;
pub mod notification;
pub mod outbox;
pub mod transition;

pub use customer::*;
pub use document::*;
pub use identity::*;
pub use insurance::*;
pub use notification::*;
pub use outbox::*;
pub use transition::InvalidTransition;
