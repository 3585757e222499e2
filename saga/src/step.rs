use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::error::{response_error, BoxError, Error};

type ForwardFn = Arc<dyn Fn(Responses) -> BoxFuture<'static, Result<Value, BoxError>> + Send + Sync>;
type CompensateFn = Arc<dyn Fn(Responses) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// Responses captured from committed forward actions, in commit order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Responses {
    entries: Vec<(String, Value)>,
}

impl Responses {
    pub(crate) fn push(&mut self, step: &str, value: Value) {
        self.entries.push((step.to_string(), value));
    }

    pub fn get(&self, step: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(name, _)| name == step)
            .map(|(_, value)| value)
    }

    /// Deserialize the response captured by `step`.
    pub fn get_as<T: DeserializeOwned>(&self, step: &str) -> Result<T, Error> {
        let value = self.get(step).ok_or_else(|| response_error(step, None))?;
        serde_json::from_value(value.clone()).map_err(|e| response_error(step, Some(Box::new(e))))
    }

    /// Names of committed steps in commit order.
    pub fn steps(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One unit of a workflow: a forward action, an optional compensating action
/// that semantically undoes it, and a name used for logging and for looking
/// up its captured response.
///
/// Both actions receive the responses of every step committed so far. They
/// must be idempotent; the coordinator never retries them.
#[derive(Clone)]
pub struct Step {
    name: String,
    forward: ForwardFn,
    compensate: Option<CompensateFn>,
}

impl Step {
    pub fn new<F, Fut, T, E>(name: impl Into<String>, forward: F) -> Self
    where
        F: Fn(Responses) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Serialize,
        E: Into<BoxError>,
    {
        let forward: ForwardFn = Arc::new(move |responses| {
            forward(responses)
                .map(|result| match result {
                    Ok(response) => serde_json::to_value(response).map_err(BoxError::from),
                    Err(e) => Err(e.into()),
                })
                .boxed()
        });

        Self {
            name: name.into(),
            forward,
            compensate: None,
        }
    }

    /// Attach the action that undoes this step during rollback. Steps without
    /// one are skipped (and logged) when rolling back.
    pub fn compensate_with<C, Fut, E>(mut self, compensate: C) -> Self
    where
        C: Fn(Responses) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        self.compensate = Some(Arc::new(move |responses| {
            compensate(responses).map(|r| r.map_err(Into::into)).boxed()
        }));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_compensation(&self) -> bool {
        self.compensate.is_some()
    }

    pub(crate) async fn run_forward(&self, responses: Responses) -> Result<Value, BoxError> {
        (self.forward)(responses).await
    }

    pub(crate) async fn run_compensation(&self, responses: Responses) -> Option<Result<(), BoxError>> {
        match &self.compensate {
            Some(compensate) => Some(compensate(responses).await),
            None => None,
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("compensable", &self.has_compensation())
            .finish()
    }
}
