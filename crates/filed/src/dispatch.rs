//! Command dispatch table.
//!
//! Maps command names to file operation handlers. `status`, `shutdown`,
//! and unknown names are resolved here rather than by a handler: `status`
//! is the liveness probe, `shutdown` must reach back into the worker and
//! broker lifecycle, and unknown names never reach the filesystem at all.

use std::collections::HashMap;

use crate::ops::{Checksum, Chmod, Chown, Cp, Mkdir, Mv, OpError, OpHandler, Rm};

/// What the worker should do with a decoded request.
pub enum Disposition {
    /// Encode and send this outcome as the reply.
    Reply(Result<Vec<String>, OpError>),
    /// Stop this worker and the whole broker; reply is best-effort.
    Shutdown,
}

pub struct Dispatcher {
    table: HashMap<&'static str, Box<dyn OpHandler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let handlers: Vec<Box<dyn OpHandler>> = vec![
            Box::new(Checksum),
            Box::new(Chmod),
            Box::new(Chown),
            Box::new(Cp),
            Box::new(Mkdir),
            Box::new(Mv),
            Box::new(Rm),
        ];

        let mut table = HashMap::new();
        for handler in handlers {
            table.insert(handler.name(), handler);
        }
        Self { table }
    }

    pub async fn dispatch(&self, command: &str, params: &[String]) -> Disposition {
        match command {
            "status" => Disposition::Reply(Ok(Vec::new())),
            "shutdown" => Disposition::Shutdown,
            _ => match self.table.get(command) {
                Some(handler) => Disposition::Reply(handler.execute(params).await),
                None => Disposition::Reply(Err(OpError::UnsupportedCommand(command.to_string()))),
            },
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
