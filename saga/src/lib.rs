//! Saga coordination for operations that span several services.
//!
//! No cross-service transaction is available, so a multi-step operation is
//! expressed as a [`Workflow`]: an ordered list of [`Step`]s, each with a
//! forward action and an optional compensating action. The [`Coordinator`]
//! runs the steps strictly in order, passing each one the [`Responses`]
//! captured so far, and on the first failure compensates every committed
//! step in reverse order.
//!
//! Workflow state lives only in memory for the duration of one call. A
//! process crash mid-rollback leaves no record to reconcile from.
//!
//! ```rust,ignore
//! let mut workflow = Workflow::new("create_group")
//!     .step(Step::new("create_group", move |_| create(groups.clone()))
//!         .compensate_with(move |r| delete(groups2.clone(), r)))
//!     .step(Step::new("join_owner", move |r| join(groups3.clone(), r)));
//!
//! let responses = Coordinator::new().execute(&mut workflow).await?;
//! ```

pub mod coordinator;
pub mod error;
pub mod step;

pub use coordinator::{Coordinator, Workflow, WorkflowState};
pub use error::{BoxError, Error, SagaErrorKind};
pub use step::{Responses, Step};
