use core::fmt;

/// A panic that escaped a task on a worker thread.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fault {
    message: String,
}

impl Fault {
    pub(crate) fn new(message: String) -> Self {
        Self { message }
    }

    /// The panic message, or `Box<dyn Any>` for non-string payloads.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Receives faults raised by tasks on a pool's worker threads.
///
/// Handlers report; they never restart work. The worker that caught the
/// fault keeps serving the queue after the handler returns.
pub trait FaultHandler: Send + Sync + 'static {
    /// Called on the faulting worker thread, named `thread`.
    fn on_fault(&self, thread: &str, fault: &Fault);
}

impl<F> FaultHandler for F
where
    F: Fn(&str, &Fault) + Send + Sync + 'static,
{
    fn on_fault(&self, thread: &str, fault: &Fault) {
        self(thread, fault)
    }
}

/// Default handler: logs every fault at error level.
///
/// Without the `tracing` feature the report goes to stderr so a fault is
/// never silently lost.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogFaultHandler;

impl FaultHandler for LogFaultHandler {
    fn on_fault(&self, thread: &str, fault: &Fault) {
        #[cfg(feature = "tracing")]
        tracing::error!(
            thread,
            fault = %fault,
            "uncaught panic is causing task on thread {thread} to fail"
        );
        #[cfg(not(feature = "tracing"))]
        eprintln!("uncaught panic is causing task on thread {thread} to fail: {fault}");
    }
}
