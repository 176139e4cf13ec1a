//! Data model shared by the anchoring engine and its front ends

pub mod types;

pub use types::{
    AnchorStrategy, CanonicalText, Finding, FindingSource, LocatedFinding, ReviewStatus, Severity,
    TextPosition,
};
