use crate::{config::MonitorConfig, notify::NotificationDispatcher, store::SnapshotStore};

/// Everything a run needs besides the portal session itself.
pub struct ScrapingContext {
    pub config: MonitorConfig,
    pub store: SnapshotStore,
    pub dispatcher: NotificationDispatcher,
}

impl ScrapingContext {
    pub fn new(config: MonitorConfig) -> anyhow::Result<Self> {
        let store = SnapshotStore::for_account(&config.data_dir, config.account_index);
        let dispatcher =
            NotificationDispatcher::from_config(config.dingtalk.as_ref(), config.feishu.as_ref())?;
        Ok(ScrapingContext {
            config,
            store,
            dispatcher,
        })
    }

    pub fn with_parts(
        config: MonitorConfig,
        store: SnapshotStore,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        ScrapingContext {
            config,
            store,
            dispatcher,
        }
    }

    /// `账号<n>（学号: <account>）`, the header of every notification.
    pub fn account_header(&self) -> String {
        format!(
            "账号{}（学号: {}）",
            self.config.account_index, self.config.credentials.account
        )
    }
}
