//! Commands sent from engine handles to the driver task

use gantry_core::domain::commit::Commit;
use gantry_core::domain::run::{RunId, StageOutcome};
use tokio::sync::oneshot;

use crate::error::Result;

pub(crate) type Reply<T> = oneshot::Sender<Result<T>>;

pub(crate) enum Command {
    Trigger {
        cause: Option<Commit>,
        reply: Reply<RunId>,
    },
    ForceError {
        reply: Reply<()>,
    },
    /// Answered once the stage has finished
    RunSingleStep {
        stage: String,
        reply: Reply<StageOutcome>,
    },
    Reset {
        reply: Reply<RunId>,
    },
    /// Answered once the driver has stopped; deferred while busy
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}
