use tokio::sync::watch;
use tracing::info;

/// 接続状態の単一ソース。プラットフォーム側(OS のリーチャビリティ通知や
/// リクエスト失敗のヒューリスティクス)が `set_online` を呼び、エンジンは
/// `subscribe` で遷移を監視する。
#[derive(Debug)]
pub struct NetworkMonitor {
    tx: watch::Sender<bool>,
}

impl NetworkMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (tx, _rx) = watch::channel(initially_online);
        Self { tx }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// 状態を上書きする。値が変わったときだけ購読側が起きる。
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|state| {
            if *state == online {
                false
            } else {
                *state = online;
                true
            }
        });
        if changed {
            info!(online, "network state changed");
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_observe_transitions() {
        let monitor = NetworkMonitor::new(false);
        let mut rx = monitor.subscribe();
        assert!(!monitor.is_online());

        monitor.set_online(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
        assert!(monitor.is_online());
    }

    #[tokio::test]
    async fn redundant_updates_do_not_wake_subscribers() {
        let monitor = NetworkMonitor::new(true);
        let mut rx = monitor.subscribe();
        rx.borrow_and_update();

        monitor.set_online(true);
        assert!(!rx.has_changed().unwrap());
    }
}
