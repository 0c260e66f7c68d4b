//! Scripted pipeline steps for unit tests
#![allow(clippy::unwrap_used)] // Test helper can use unwrap

use super::{Resource, ResourceError};
use crate::controller::context::RunContext;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Shared, ordered record of step calls ("create:<name>" / "delete:<name>")
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn calls(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

pub struct ScriptedStep {
    name: String,
    log: CallLog,
    cancel: bool,
    failures: Mutex<Vec<ResourceError>>,
}

impl ScriptedStep {
    pub fn new(name: &str, log: &CallLog) -> Self {
        ScriptedStep {
            name: name.to_string(),
            log: log.clone(),
            cancel: false,
            failures: Mutex::new(Vec::new()),
        }
    }

    /// Cancel the run on every call
    pub fn canceling(mut self) -> Self {
        self.cancel = true;
        self
    }

    /// Fail the next calls with these errors, front to back
    pub fn failing(self, errors: Vec<ResourceError>) -> Self {
        *self.failures.lock().unwrap() = errors;
        self
    }

    pub fn boxed<K: Send + Sync + 'static>(self) -> Box<dyn Resource<K>> {
        Box::new(self)
    }

    fn step(&self, action: &str, run: &mut RunContext) -> Result<(), ResourceError> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:{}", action, self.name));

        let mut failures = self.failures.lock().unwrap();
        if !failures.is_empty() {
            return Err(failures.remove(0));
        }
        if self.cancel {
            run.cancel_reconciliation();
        }
        Ok(())
    }
}

#[async_trait]
impl<K: Send + Sync + 'static> Resource<K> for ScriptedStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ensure_created(&self, run: &mut RunContext, _obj: &K) -> Result<(), ResourceError> {
        self.step("create", run)
    }

    async fn ensure_deleted(&self, run: &mut RunContext, _obj: &K) -> Result<(), ResourceError> {
        self.step("delete", run)
    }
}
