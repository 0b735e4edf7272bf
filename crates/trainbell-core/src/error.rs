//! Error taxonomy shared by every Trainbell crate.

/// Everything an invocation can fail with.
///
/// None of these are recovered inside the core: a checker either completes
/// its whole read → mutate → notify sequence or returns one of these.
#[derive(Debug, thiserror::Error)]
pub enum TrainbellError {
    /// Reading slots from the record store failed.
    #[error("store query failed: {0}")]
    StoreQuery(String),

    /// Writing slots failed. For a batch this means no slot in it changed.
    #[error("store mutation failed: {0}")]
    StoreMutate(String),

    /// The push channel rejected or never received the notification.
    #[error("notification delivery failed: {0}")]
    NotificationDelivery(String),

    #[error("config error: {0}")]
    Config(String),

    /// The invocation ran past its deadline.
    #[error("{job} exceeded its {secs}s deadline")]
    Deadline { job: String, secs: u64 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TrainbellError>;

impl TrainbellError {
    /// Short label used in log lines and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StoreQuery(_) => "store_query",
            Self::StoreMutate(_) => "store_mutate",
            Self::NotificationDelivery(_) => "notification_delivery",
            Self::Config(_) => "config",
            Self::Deadline { .. } => "deadline",
            Self::Io(_) => "io",
        }
    }
}
