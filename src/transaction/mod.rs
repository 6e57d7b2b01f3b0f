pub mod builder;
pub mod pipeline;
pub mod record;
pub mod review;
pub mod simulate;

pub use builder::{TransactionBuilder, TransferKind, TransferParams, UnsignedTx};
pub use pipeline::{ConfirmationOutcome, SignedTx, TransactionPipeline};
pub use record::{TransactionRecord, TransactionStatus};
pub use review::{InstructionKind, RiskLevel, TransactionReview};
pub use simulate::{FeeEstimate, SimulationFailure, SimulationResult};
