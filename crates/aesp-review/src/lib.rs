//! Human-in-the-loop review queue with deadline expiry, freeze/unfreeze,
//! and blocking or fire-and-forget request creation.

pub mod manager;
pub mod review;

pub use aesp_core::ReviewConfig;
pub use manager::ReviewManager;
pub use review::{CreateReviewParams, ReviewDecision, ReviewEvent, ReviewRequest, ReviewResponse, ReviewStatus};
