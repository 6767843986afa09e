pub mod assess;
pub mod backends;
pub mod funnel;
pub mod identity;
pub mod intake;
pub mod knowledge;
pub mod prescore;
pub mod queue;
pub mod store;
