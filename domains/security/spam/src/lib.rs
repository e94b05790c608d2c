pub mod history;
pub mod scorer;

pub use history::{
    HISTORY_WINDOW, IdentifierKind, InMemoryReputationStore,
    PostgresReputationStore, ReputationRecord, ReputationStore,
    ReputationStoreError,
};
pub use scorer::{
    SPAM_THRESHOLD, SpamCheckRequest, SpamCheckResult, SpamChecker,
    SubmissionKind,
};
