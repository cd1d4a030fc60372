//! Cursor-based pagination over an address's signature history: page
//! normalization, empty-page retry, boundary-tie tracking, and the walk
//! itself.

pub mod cursor;
pub mod empty_retry;
pub mod page;
pub mod ties;
pub mod walk;

pub use cursor::{
    ConfirmedSignature, Cursor, SignatureRecord, TieKey, WalkBounds, WalkMode, WalkOutcome,
};
pub use empty_retry::EmptyPageRetry;
pub use page::SignaturePage;
pub use ties::TieTracker;
pub use walk::{SignatureWalker, WalkerSettings, MAX_PAGE_LIMIT};
