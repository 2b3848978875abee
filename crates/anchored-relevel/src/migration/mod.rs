mod executor;
mod plan;
mod planner;


pub use self::{
    executor::{ExecuteError, ExecutionOutcome, execute},
    plan::{MigrationOp, MigrationPlan},
    planner::{PlanError, plan},
};
