//! Built-in node types.
//!
//! Each submodule holds one operator. [`register_builtins`] is the single
//! place that maps type names to constructors.

use tracing::warn;

use crate::operator::Operator;
use crate::registry::NodeRegistry;

pub mod anomaly_detector;
pub mod combiner;
pub mod data_fetcher;
pub mod echo;
pub mod enumerator;
pub mod event_trigger;
pub mod fork_join;
pub mod sql;
pub mod time_index_filler;

pub const DATA_FETCHER: &str = "DataFetcher";
pub const ANOMALY_DETECTOR: &str = "AnomalyDetector";
pub const TIME_INDEX_FILLER: &str = "TimeIndexFiller";
pub const COMBINER: &str = "Combiner";
pub const ENUMERATOR: &str = "Enumerator";
pub const FORK_JOIN: &str = crate::plan::FORK_JOIN_TYPE;
pub const ECHO: &str = "Echo";
pub const EVENT_TRIGGER: &str = "EventTrigger";
pub const SQL_EXECUTION: &str = "SqlExecution";
pub const CALCITE_SQL_EXECUTION: &str = "CalciteSqlExecution";

pub const BUILTIN_TYPES: [&str; 10] = [
    DATA_FETCHER,
    ANOMALY_DETECTOR,
    TIME_INDEX_FILLER,
    COMBINER,
    ENUMERATOR,
    FORK_JOIN,
    ECHO,
    EVENT_TRIGGER,
    SQL_EXECUTION,
    CALCITE_SQL_EXECUTION,
];

/// Register every built-in node type.
pub fn register_builtins(registry: &mut NodeRegistry) {
    add(registry, DATA_FETCHER, || Box::new(data_fetcher::DataFetcherOperator));
    add(registry, ANOMALY_DETECTOR, || Box::new(anomaly_detector::AnomalyDetectorOperator));
    add(registry, TIME_INDEX_FILLER, || Box::new(time_index_filler::TimeIndexFillerOperator));
    add(registry, COMBINER, || Box::new(combiner::CombinerOperator));
    add(registry, ENUMERATOR, || Box::new(enumerator::EnumeratorOperator));
    add(registry, FORK_JOIN, || Box::new(fork_join::ForkJoinOperator));
    add(registry, ECHO, || Box::new(echo::EchoOperator));
    add(registry, EVENT_TRIGGER, || Box::new(event_trigger::EventTriggerOperator));
    add(registry, SQL_EXECUTION, || Box::new(sql::SqlExecutionOperator::default_dialect()));
    add(registry, CALCITE_SQL_EXECUTION, || Box::new(sql::SqlExecutionOperator::calcite()));
}

fn add<F>(registry: &mut NodeRegistry, node_type: &str, factory: F)
where
    F: Fn() -> Box<dyn Operator> + Send + Sync + 'static,
{
    if let Err(e) = registry.register(node_type, factory) {
        warn!(node_type, error = %e, "skipping built-in node type");
    }
}
