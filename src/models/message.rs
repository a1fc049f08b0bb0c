#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorMessage {
    Sweep,
    Shutdown,
}
