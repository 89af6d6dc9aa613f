//! Observable cells for `floem_form`.
//!
//! An [`Observable`] holds one value and a list of listeners. Writes notify
//! listeners synchronously, or once at the end of the outermost [`batch`]
//! when one is open. Everything lives on the creating thread.

mod id;
mod observable;
mod runtime;

pub use id::CellId;
pub use observable::{Observable, Subscription};
pub use runtime::{batch, is_batching};
