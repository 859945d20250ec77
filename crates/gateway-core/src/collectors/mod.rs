pub mod block_subscriber;
pub mod ipc;
pub mod prometheus;

pub use block_subscriber::BlockSubscriber;
pub use ipc::IpcCollector;
pub use prometheus::PrometheusCollector;
