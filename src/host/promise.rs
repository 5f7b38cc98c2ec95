//! One-shot host promises
//!
//! The future-continuation bridge settles a promise exactly once, from the
//! host thread, when a native asynchronous operation completes. Host code
//! awaits the promise from inside the host run loop.

use tokio::sync::oneshot;

use crate::error::HostError;
use crate::host::value::HostValue;

/// The receiving half: a host-visible value that will be settled once.
pub struct HostPromise {
    receiver: oneshot::Receiver<Result<HostValue, HostError>>,
}

/// The settling half, held by the bridge machinery.
pub struct PromiseSettler {
    sender: oneshot::Sender<Result<HostValue, HostError>>,
}

/// Create a connected promise/settler pair.
pub fn promise() -> (HostPromise, PromiseSettler) {
    let (sender, receiver) = oneshot::channel();
    (HostPromise { receiver }, PromiseSettler { sender })
}

impl HostPromise {
    /// Wait until the promise is settled.
    ///
    /// Must be awaited from the host run loop; the settling task executes on
    /// the host thread.
    pub async fn settled(self) -> Result<HostValue, HostError> {
        match self.receiver.await {
            Ok(outcome) => outcome,
            // The settler was dropped without resolving; the native
            // operation went away without ever signaling its continuation.
            Err(_) => Err(HostError::Panic(
                "native operation dropped its continuation".to_string(),
            )),
        }
    }
}

impl PromiseSettler {
    /// Settle with a value. A dropped receiver is fine; host code may have
    /// stopped caring.
    pub fn resolve(self, value: HostValue) {
        let _ = self.sender.send(Ok(value));
    }

    /// Settle with an error.
    pub fn reject(self, error: HostError) {
        let _ = self.sender.send(Err(error));
    }
}
