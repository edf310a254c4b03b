#![forbid(unsafe_code)]

//! The persistent "free gifts available" notification banner.
//!
//! A single banner model is projected into however many host containers
//! currently exist (slide-out drawer, cart page). Containers are found
//! through an ordered list of [`ContainerLocator`] strategies, since the
//! host theme recreates them outside this system's control. Rendering is
//! idempotent per container and the banner disappears everywhere once no
//! gifts remain claimable.

use std::collections::BTreeMap;

use tracing::debug;

/// A handle to a host container the banner can be rendered into.
///
/// `key` is stable for the lifetime of the container instance; a recreated
/// container may reuse the key (the banner simply re-renders into it).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ContainerRef {
    pub key: String,
}

impl ContainerRef {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// One strategy for finding a banner container.
///
/// Strategies are consulted in order on every sync; a strategy whose
/// target markup is not currently rendered returns `None` and is simply
/// retried next time.
pub trait ContainerLocator: Send + Sync {
    /// Strategy name for logging.
    fn name(&self) -> &'static str;

    /// The container, if its host markup currently exists.
    fn locate(&self) -> Option<ContainerRef>;
}

/// What the banner should say for a given number of claimable gifts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BannerContent {
    pub available: usize,
    pub message: String,
    pub details: String,
}

impl BannerContent {
    #[must_use]
    pub fn for_available(available: usize) -> Self {
        let (message, details) = if available == 1 {
            (
                "You have 1 free gift available!".to_owned(),
                "Click to select your gift".to_owned(),
            )
        } else {
            (
                format!("You have {available} free gifts available!"),
                format!("Click to select your {available} gifts"),
            )
        };
        Self {
            available,
            message,
            details,
        }
    }
}

/// Renders banner content into host containers.
///
/// `render` must be idempotent: re-rendering into a container that already
/// holds a banner replaces its content rather than duplicating it.
pub trait BannerHost: Send + Sync {
    fn render(&self, container: &ContainerRef, content: &BannerContent);
    fn remove(&self, container: &ContainerRef);
}

/// Host that renders nowhere, for headless operation and tests.
#[derive(Debug, Default)]
pub struct NullBannerHost;

impl BannerHost for NullBannerHost {
    fn render(&self, _container: &ContainerRef, _content: &BannerContent) {}
    fn remove(&self, _container: &ContainerRef) {}
}

/// The singleton banner model.
///
/// Tracks which containers currently hold a banner and what count was last
/// rendered there, so syncs only touch the host when something changed.
#[derive(Default)]
pub struct NotificationBanner {
    locators: Vec<Box<dyn ContainerLocator>>,
    // container key -> available count last rendered there
    mounted: BTreeMap<String, usize>,
}

impl NotificationBanner {
    #[must_use]
    pub fn new(locators: Vec<Box<dyn ContainerLocator>>) -> Self {
        Self {
            locators,
            mounted: BTreeMap::new(),
        }
    }

    /// Containers currently holding a banner.
    #[must_use]
    pub fn mounted_keys(&self) -> Vec<&str> {
        self.mounted.keys().map(String::as_str).collect()
    }

    /// Reconcile the banner against the host: visible iff `available > 0`.
    pub fn sync(&mut self, available: usize, host: &dyn BannerHost) {
        if available == 0 {
            for key in std::mem::take(&mut self.mounted).into_keys() {
                host.remove(&ContainerRef::new(key));
            }
            return;
        }

        let content = BannerContent::for_available(available);
        let mut seen = Vec::new();
        for locator in &self.locators {
            let Some(container) = locator.locate() else {
                continue;
            };
            if seen.contains(&container.key) {
                // Two strategies resolved the same container; first wins.
                continue;
            }
            seen.push(container.key.clone());
            let stale = self.mounted.get(&container.key) != Some(&available);
            if stale {
                debug!(
                    strategy = locator.name(),
                    container = %container.key,
                    available,
                    "rendering gift notification"
                );
                host.render(&container, &content);
                self.mounted.insert(container.key, available);
            }
        }

        // Containers that disappeared from every strategy were torn down
        // by the host; forget them so a recreation re-renders.
        self.mounted.retain(|key, _| seen.iter().any(|s| s == key));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingHost {
        renders: Mutex<Vec<(String, usize)>>,
        removals: Mutex<Vec<String>>,
    }

    impl BannerHost for RecordingHost {
        fn render(&self, container: &ContainerRef, content: &BannerContent) {
            self.renders
                .lock()
                .unwrap()
                .push((container.key.clone(), content.available));
        }

        fn remove(&self, container: &ContainerRef) {
            self.removals.lock().unwrap().push(container.key.clone());
        }
    }

    struct FixedLocator {
        name: &'static str,
        key: &'static str,
        present: Arc<AtomicBool>,
    }

    impl FixedLocator {
        fn new(name: &'static str, key: &'static str, present: bool) -> Self {
            Self {
                name,
                key,
                present: Arc::new(AtomicBool::new(present)),
            }
        }
    }

    impl ContainerLocator for FixedLocator {
        fn name(&self) -> &'static str {
            self.name
        }

        fn locate(&self) -> Option<ContainerRef> {
            self.present
                .load(Ordering::SeqCst)
                .then(|| ContainerRef::new(self.key))
        }
    }

    #[test]
    fn renders_into_every_present_container() {
        let mut banner = NotificationBanner::new(vec![
            Box::new(FixedLocator::new("drawer", "drawer", true)),
            Box::new(FixedLocator::new("cart-page", "cart-page", false)),
        ]);
        let host = RecordingHost::default();
        banner.sync(2, &host);
        assert_eq!(
            *host.renders.lock().unwrap(),
            vec![("drawer".to_owned(), 2)]
        );
    }

    #[test]
    fn sync_is_idempotent_per_container() {
        let mut banner =
            NotificationBanner::new(vec![Box::new(FixedLocator::new("drawer", "drawer", true))]);
        let host = RecordingHost::default();
        banner.sync(1, &host);
        banner.sync(1, &host);
        assert_eq!(host.renders.lock().unwrap().len(), 1);

        // A changed count re-renders.
        banner.sync(2, &host);
        assert_eq!(host.renders.lock().unwrap().len(), 2);
    }

    #[test]
    fn zero_available_removes_everywhere() {
        let mut banner = NotificationBanner::new(vec![
            Box::new(FixedLocator::new("drawer", "drawer", true)),
            Box::new(FixedLocator::new("cart-page", "cart-page", true)),
        ]);
        let host = RecordingHost::default();
        banner.sync(3, &host);
        banner.sync(0, &host);
        let mut removed = host.removals.lock().unwrap().clone();
        removed.sort();
        assert_eq!(removed, vec!["cart-page".to_owned(), "drawer".to_owned()]);
        assert!(banner.mounted_keys().is_empty());
    }

    #[test]
    fn recreated_container_gets_rerendered() {
        let locator = FixedLocator::new("drawer", "drawer", true);
        let present = locator.present.clone();
        let mut banner = NotificationBanner::new(vec![Box::new(locator)]);
        let host = RecordingHost::default();

        banner.sync(1, &host);
        assert_eq!(banner.mounted_keys(), vec!["drawer"]);

        // Host tears the drawer down: the locator stops finding it.
        present.store(false, Ordering::SeqCst);
        banner.sync(1, &host);
        assert!(banner.mounted_keys().is_empty());

        present.store(true, Ordering::SeqCst);
        banner.sync(1, &host);
        assert_eq!(host.renders.lock().unwrap().len(), 2);
    }

    #[test]
    fn singular_and_plural_copy() {
        assert_eq!(
            BannerContent::for_available(1).message,
            "You have 1 free gift available!"
        );
        assert_eq!(
            BannerContent::for_available(3).message,
            "You have 3 free gifts available!"
        );
    }
}
