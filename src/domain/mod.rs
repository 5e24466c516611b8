// Domain layer - Dashboard documents and live metric values
pub mod dashboard;
pub mod metric;
