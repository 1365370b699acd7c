//! Services layer for sqlmon.
//!
//! Pure policies (severity, reindex), the monitored-server contract and its
//! SQL Server implementation, collectors, remediation, the detection cycle
//! and the scheduler that drives it.

mod clock;
mod collector;
mod monitor;
mod reindex_policy;
mod remediation;
mod scheduler;
mod severity;
mod sqlserver;
mod target;

pub use clock::{Clock, SystemClock};
pub use collector::{Collector, SlowQuerySource};
pub use monitor::{CycleReport, DatabaseReport, Monitor, MonitorOptions};
pub use reindex_policy::{decide, ReindexThresholds};
pub use remediation::{improvement_percent, Remediator, AI_FIX_TYPE};
pub use scheduler::{channel_ticker, ChannelTicker, IntervalTicker, Scheduler, SchedulerHandle, Ticker};
pub use severity::{classify, SeverityThresholds};
pub use sqlserver::SqlServerTarget;
pub use target::{quote_identifier, reindex_statement, TargetServer};
