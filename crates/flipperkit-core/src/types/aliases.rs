//! Type aliases for commonly used complex types.
//!
//! The dispatcher runs on a single cooperative timeline, so shared state is
//! `Rc<RefCell<T>>` rather than `Arc<Mutex<T>>`. These aliases keep signatures
//! readable where that pattern shows up.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use flipperkit_core::types::*;
//!
//! // Instead of: Rc<RefCell<Vec<String>>>
//! let calls: SharedVec<String> = shared(Vec::new());
//! calls.borrow_mut().push("trough_eject".to_string());
//! ```

use std::cell::RefCell;
use std::rc::{Rc, Weak};

// =============================================================================
// SINGLE-THREADED SHARED TYPES (Rc<RefCell<T>>)
// =============================================================================

/// A reference-counted, interior-mutable wrapper for single-threaded sharing.
///
/// # Example
/// ```rust,ignore
/// let state: Shared<BallCounts> = shared(BallCounts::default());
/// state.borrow_mut().captured += 1;
/// ```
pub type Shared<T> = Rc<RefCell<T>>;

/// A non-owning reference to a [`Shared`] value.
///
/// Used where a handle must not keep its owner alive (queue tokens pointing
/// back at the dispatcher's parked frames).
pub type WeakShared<T> = Weak<RefCell<T>>;

/// An optional shared reference, for lazily-initialized shared state.
pub type SharedOption<T> = Rc<RefCell<Option<T>>>;

/// A shared vector for single-threaded collection management.
pub type SharedVec<T> = Rc<RefCell<Vec<T>>>;

// =============================================================================
// CONSTRUCTOR HELPERS
// =============================================================================

/// Create a new `Shared<T>` from a value.
pub fn shared<T>(value: T) -> Shared<T> {
    Rc::new(RefCell::new(value))
}

/// Create a new `SharedOption<T>` initialized to `None`.
pub fn shared_none<T>() -> SharedOption<T> {
    Rc::new(RefCell::new(None))
}
