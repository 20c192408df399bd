use std::collections::HashMap;

/// Configuration for one status type: its urgency and an optional renderer.
///
/// Lower priority numbers are shown first. Renderers are whatever the
/// embedding UI uses — the coordinator only stores and hands them back.
#[derive(Clone, Debug)]
pub struct StatusEntry<R> {
    pub priority: i32,
    pub component: Option<R>,
}

/// The set of recognized status types.
///
/// The kit is an explicit value threaded into the coordinator at
/// construction; there is no process-wide default registry. Status types
/// the kit does not contain are rejected (warn + no-op) at the call site.
///
/// # Examples
///
/// ```
/// use apiary::StatusKit;
///
/// let kit: StatusKit<&str> = StatusKit::standard()
///     .status_type("syncing", 3)
///     .component("error", "ErrorBanner");
///
/// assert!(kit.contains("syncing"));
/// assert_eq!(kit.entry("error").unwrap().priority, 0);
/// ```
#[derive(Clone, Debug)]
pub struct StatusKit<R> {
    entries: HashMap<String, StatusEntry<R>>,
}

impl<R> StatusKit<R> {
    /// An empty kit. Every status type must be declared explicitly.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// The built-in types: `error` (0), `loading` (1), `saving` (2),
    /// `success` (90), `idle` (100). Errors always outrank in-flight work,
    /// which outranks completion chrome.
    pub fn standard() -> Self {
        Self::new()
            .status_type("error", 0)
            .status_type("loading", 1)
            .status_type("saving", 2)
            .status_type("success", 90)
            .status_type("idle", 100)
    }

    /// Declare (or re-prioritize) a status type.
    pub fn status_type(mut self, name: impl Into<String>, priority: i32) -> Self {
        let name = name.into();
        match self.entries.get_mut(&name) {
            Some(entry) => entry.priority = priority,
            None => {
                self.entries.insert(
                    name,
                    StatusEntry {
                        priority,
                        component: None,
                    },
                );
            }
        }
        self
    }

    /// Attach a renderer to a declared status type.
    pub fn component(mut self, name: &str, component: R) -> Self {
        match self.entries.get_mut(name) {
            Some(entry) => entry.component = Some(component),
            None => tracing::warn!(status_type = name, "component attached to undeclared status type"),
        }
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn entry(&self, name: &str) -> Option<&StatusEntry<R>> {
        self.entries.get(name)
    }
}

impl<R> Default for StatusKit<R> {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_kit_priorities() {
        let kit: StatusKit<()> = StatusKit::standard();
        assert_eq!(kit.entry("error").unwrap().priority, 0);
        assert_eq!(kit.entry("loading").unwrap().priority, 1);
        assert_eq!(kit.entry("saving").unwrap().priority, 2);
        assert!(kit.entry("error").unwrap().priority < kit.entry("loading").unwrap().priority);
    }

    #[test]
    fn custom_types_extend_the_kit() {
        let kit: StatusKit<&str> = StatusKit::standard()
            .status_type("uploading", 4)
            .component("uploading", "UploadBar");

        assert_eq!(kit.entry("uploading").unwrap().priority, 4);
        assert_eq!(kit.entry("uploading").unwrap().component, Some("UploadBar"));
    }

    #[test]
    fn redeclaring_keeps_component() {
        let kit: StatusKit<&str> = StatusKit::new()
            .status_type("loading", 1)
            .component("loading", "Spinner")
            .status_type("loading", 5);

        assert_eq!(kit.entry("loading").unwrap().priority, 5);
        assert_eq!(kit.entry("loading").unwrap().component, Some("Spinner"));
    }
}
