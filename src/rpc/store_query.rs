use flume::Sender;
use tracing::debug;

use crate::common::{Command, Id};

use super::response::CallResponse;

#[derive(Debug)]
/// Once a lookup is done, STORE or DELETE requests are sent to the closest
/// nodes it found, and this query waits for them to report whether any
/// node accepted the request.
pub(crate) struct StoreQuery {
    target: Id,
    command: Command,
    inflight: Vec<CallResponse>,
    /// Nodes that confirmed success.
    successes: usize,
    sender: Sender<bool>,
}

impl StoreQuery {
    pub fn new(target: Id, command: Command, sender: Sender<bool>) -> Self {
        Self {
            target,
            command,
            inflight: Vec::new(),
            successes: 0,
            sender,
        }
    }

    /// Count a success that needed no request, like our own storage.
    pub fn succeeded(&mut self) {
        self.successes += 1;
    }

    pub fn request(&mut self, response: CallResponse) {
        self.inflight.push(response);
    }

    /// Collect completed requests, reporting the outcome once all completed.
    ///
    /// Returns true if it is done.
    pub fn tick(&mut self) -> bool {
        for response in std::mem::take(&mut self.inflight) {
            match response.try_result() {
                None => self.inflight.push(response),
                Some(Ok(reply)) if reply.is_true() => self.successes += 1,
                Some(_) => {}
            }
        }

        let done = self.inflight.is_empty();

        if done {
            debug!(
                target = ?self.target,
                command = ?self.command,
                successes = self.successes,
                "Done store query"
            );

            let _ = self.sender.send(self.successes > 0);
        }

        done
    }
}
