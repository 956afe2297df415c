use std::sync::Mutex;

use tracing::info;

/// Outcome of the OS-level permission prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
}

/// Native OS notification capability. The real surface lives outside this
/// core; evaluators inject whatever the host platform provides.
pub trait Notifier: Send + Sync {
    fn request_permission(&self) -> Permission;
    fn show(&self, title: &str, body: &str) -> anyhow::Result<()>;
}

/// In-app transient banner, the channel of last resort. Always available,
/// never fails.
pub trait BannerSink: Send + Sync {
    fn banner(&self, title: &str, body: &str);
}

/// Terminal-backed notifier for the `watch` command.
#[derive(Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn request_permission(&self) -> Permission {
        Permission::Granted
    }

    fn show(&self, title: &str, body: &str) -> anyhow::Result<()> {
        println!("[notify] {title}: {body}");
        info!(target: "pacer", event = "native_notification", title = %title);
        Ok(())
    }
}

#[derive(Default)]
pub struct ConsoleBanner;

impl BannerSink for ConsoleBanner {
    fn banner(&self, title: &str, body: &str) {
        println!("[banner] {title}: {body}");
    }
}

/// Recording notifier used by tests and headless runs.
pub struct MemoryNotifier {
    permission: Permission,
    fail_delivery: bool,
    shown: Mutex<Vec<(String, String)>>,
}

impl MemoryNotifier {
    pub fn granted() -> Self {
        Self {
            permission: Permission::Granted,
            fail_delivery: false,
            shown: Mutex::new(Vec::new()),
        }
    }

    pub fn denied() -> Self {
        Self {
            permission: Permission::Denied,
            fail_delivery: false,
            shown: Mutex::new(Vec::new()),
        }
    }

    /// Permission granted, but every delivery attempt errors.
    pub fn failing() -> Self {
        Self {
            permission: Permission::Granted,
            fail_delivery: true,
            shown: Mutex::new(Vec::new()),
        }
    }

    pub fn shown(&self) -> Vec<(String, String)> {
        self.shown.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Notifier for MemoryNotifier {
    fn request_permission(&self) -> Permission {
        self.permission
    }

    fn show(&self, title: &str, body: &str) -> anyhow::Result<()> {
        if self.fail_delivery {
            anyhow::bail!("notification service unavailable");
        }
        self.shown
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((title.to_string(), body.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryBanner {
    banners: Mutex<Vec<(String, String)>>,
}

impl MemoryBanner {
    pub fn banners(&self) -> Vec<(String, String)> {
        self.banners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl BannerSink for MemoryBanner {
    fn banner(&self, title: &str, body: &str) {
        self.banners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((title.to_string(), body.to_string()));
    }
}
