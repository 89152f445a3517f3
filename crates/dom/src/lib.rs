//! DOM Tree for Event Dispatch
//!
//! An index arena of event targets: a window, a document and the element,
//! text and comment nodes hung beneath it. Each node owns one listener
//! registry; `Document` ties the tree to a `Dispatcher`.
//!
//! ## Core Design
//!
//! ```text
//! Document (Rc, cloneable into listeners)
//!    ├── RefCell<DomArena>: Vec<Option<DomNode>>, NodeId (u32) = TargetId
//!    │                        └── DomNode.target: EventTarget → ListenerRegistry
//!    └── Dispatcher ──→ TargetTree::parent_target: node → parent → … → document → window
//! ```

pub mod arena;
pub mod document;
pub mod error;
pub mod types;

pub use arena::DomArena;
pub use document::Document;
pub use error::{DomError, Result};
pub use types::*;
