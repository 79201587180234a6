pub mod audit;
pub mod binding;
pub mod challenge;
pub mod clock;
pub mod confirmation;
pub mod orchestrator;
pub mod payment;

pub use audit::AuditTrail;
pub use challenge::{ChallengeBuilder, ChallengeSettings};
pub use clock::{Clock, ManualClock, SystemClock};
pub use confirmation::{ConfirmationStore, NewConfirmation};
pub use orchestrator::{
    LoggingTrackUpdater, Settlement, TrackStatusUpdater, VerificationOrchestrator,
    VerificationOutcome, VerificationState,
};
pub use payment::PaymentService;
