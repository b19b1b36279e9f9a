use tokio::sync::watch;

/// Caller-side abort switch for in-flight lookups.
#[derive(Clone)]
pub struct CancelSignal {
    sender: watch::Sender<bool>,
}

#[derive(Clone)]
pub struct CancelListener {
    receiver: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn new() -> (Self, CancelListener) {
        let (sender, receiver) = watch::channel(false);
        (Self { sender }, CancelListener { receiver })
    }

    pub fn subscribe(&self) -> CancelListener {
        CancelListener {
            receiver: self.sender.subscribe(),
        }
    }

    /// Stored even when nobody is listening yet, so later subscribers see it too.
    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }
}

impl CancelListener {
    /// Resolves once the signal fires. Never resolves if the signal is dropped untriggered.
    pub async fn notified(&mut self) {
        loop {
            if *self.receiver.borrow() {
                return;
            }
            if self.receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.receiver.borrow()
    }
}

pub fn install_signal_handlers(cancel: CancelSignal) {
    let ctrlc = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!(target: "app", "interrupt received; cancelling");
            ctrlc.trigger();
        }
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let term = cancel.clone();
        tokio::spawn(async move {
            if let Ok(mut sig) = signal(SignalKind::terminate()) {
                sig.recv().await;
                term.trigger();
            }
        });
    }
}
