//! Keyword discovery and resolution.

use std::sync::Arc;

use crate::library::{Keyword, Library};

/// Name of the reserved control operation.
pub const STOP_REMOTE_SERVER: &str = "stop_remote_server";

/// Library keywords plus the reserved control keyword.
pub struct KeywordRegistry {
    library: Arc<dyn Library>,
    control: Keyword,
}

impl KeywordRegistry {
    /// `control` is served as [`STOP_REMOTE_SERVER`] whatever its own name.
    pub fn new(library: Arc<dyn Library>, control: Keyword) -> Self {
        Self { library, control }
    }

    pub fn library(&self) -> &dyn Library {
        self.library.as_ref()
    }

    /// Current keyword names, with the control keyword last and exactly once.
    pub fn names(&self) -> Vec<String> {
        let mut names = match self.library.keyword_names() {
            Some(names) => names,
            None => self
                .library
                .members()
                .into_iter()
                .filter(|name| !name.starts_with('_'))
                .filter(|name| self.library.keyword(name).is_some())
                .collect(),
        };
        names.retain(|name| name != STOP_REMOTE_SERVER);
        names.push(STOP_REMOTE_SERVER.to_string());
        names
    }

    /// Resolve a name; the control keyword shadows any library member.
    pub fn resolve(&self, name: &str) -> Option<Keyword> {
        if name == STOP_REMOTE_SERVER {
            return Some(self.control.clone());
        }
        self.library.keyword(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{KeywordSet, Signature};
    use crate::value::Value;

    fn keyword(name: &str, result: &'static str) -> Keyword {
        Keyword::new(name, Signature::new(), move |_, _| Ok(Value::from(result)))
    }

    fn registry(library: impl Library + 'static) -> KeywordRegistry {
        KeywordRegistry::new(Arc::new(library), keyword(STOP_REMOTE_SERVER, "control"))
    }

    #[test]
    fn default_enumeration_skips_private_and_data_members() {
        let set = KeywordSet::new()
            .with_keyword(keyword("public_one", ""))
            .with_keyword(keyword("_private", ""))
            .with_attribute("data", 1)
            .with_keyword(keyword("public_two", ""));
        assert_eq!(
            registry(set).names(),
            ["public_one", "public_two", STOP_REMOTE_SERVER]
        );
    }

    #[test]
    fn empty_library_lists_only_control() {
        assert_eq!(registry(KeywordSet::new()).names(), [STOP_REMOTE_SERVER]);
    }

    struct Enumerated;

    impl Library for Enumerated {
        fn keyword_names(&self) -> Option<Vec<String>> {
            Some(vec![
                "Custom Name".to_string(),
                STOP_REMOTE_SERVER.to_string(),
            ])
        }

        fn members(&self) -> Vec<String> {
            vec!["ignored".to_string()]
        }

        fn keyword(&self, name: &str) -> Option<Keyword> {
            (name == "Custom Name").then(|| keyword(name, "custom"))
        }
    }

    #[test]
    fn custom_enumerator_wins_and_control_appears_once() {
        assert_eq!(
            registry(Enumerated).names(),
            ["Custom Name", STOP_REMOTE_SERVER]
        );
    }

    #[test]
    fn control_shadows_library_member() {
        let set = KeywordSet::new().with_keyword(keyword(STOP_REMOTE_SERVER, "library"));
        let registry = registry(set);

        let names = registry.names();
        assert_eq!(
            names.iter().filter(|n| *n == STOP_REMOTE_SERVER).count(),
            1
        );

        let resolved = registry.resolve(STOP_REMOTE_SERVER).unwrap();
        let mut capture = crate::capture::OutputCapture::begin(crate::capture::CaptureMode::Console);
        let value = resolved
            .call(&Default::default(), &mut capture.console())
            .unwrap();
        capture.finish();
        assert_eq!(value, Value::from("control"));
    }

    #[test]
    fn reflects_library_changes() {
        let set = Arc::new(KeywordSet::new());
        let registry = KeywordRegistry::new(set.clone(), keyword(STOP_REMOTE_SERVER, ""));
        assert_eq!(registry.names(), [STOP_REMOTE_SERVER]);

        set.add_keyword(keyword("late", ""));
        assert_eq!(registry.names(), ["late", STOP_REMOTE_SERVER]);
        assert!(registry.resolve("late").is_some());
    }
}
