//! Loop-closure detection pipeline: place recognition, candidate
//! bookkeeping, and geometric verification.
//!
//! The detector proposes candidates from BoW similarity; candidates wait in
//! the registry until their VLC frames are resident; verification turns a
//! candidate into a relative pose constraint or rejects it.

pub mod candidates;
pub mod detector;
pub mod verification;

pub use candidates::CandidateRegistry;
pub use detector::{DetectorConfig, IngestError, LoopDetector};
pub use verification::{verify_candidate, VerificationConfig, VerificationReject};
