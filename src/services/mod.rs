// Reception validation and completion decisions
pub mod reconciliation;

// Side effects applied while recording a reception
pub mod order_locks;
pub mod stock;

// Caller-facing facade
pub mod procurement;
