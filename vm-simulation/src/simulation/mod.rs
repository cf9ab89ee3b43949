//! Simulation modules

pub mod amm;
pub mod blockchain;
pub mod mitigator;
pub mod oracle;
pub mod orchestrator;
pub mod pool_state;
pub mod transaction;

pub use amm::{Amm, AmmParameters};
pub use blockchain::Blockchain;
pub use mitigator::{MitigatorCheckStatus, OraclePolicy, VolatilityMitigator};
pub use oracle::SlidingWindowOracle;
pub use orchestrator::{Orchestrator, SimulationResults};
pub use pool_state::{Pool, PoolSnapshot, Side};
pub use transaction::{Request, Transaction, TransactionStatus};
