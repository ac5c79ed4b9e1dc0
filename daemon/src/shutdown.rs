use std::sync::Arc;
use tokio::sync::watch;

// Once triggered, stays triggered. Every clone observes the same flag, including ones created
// after the trigger.
#[derive(Clone)]
pub struct Shutdown {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }

    pub async fn recv(&mut self) {
        let _ = self.receiver.wait_for(|triggered| *triggered).await;
    }
}
