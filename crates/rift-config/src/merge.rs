//! Plugin fragment merging.
//!
//! Merge rules, applied per option shape:
//! - scalars: the later fragment wins when it sets a value
//! - lists: concatenated in declaration order
//! - maps: shallow merge, the later fragment's keys win
//!
//! All three rules are associative, so folding fragments left to right gives
//! the same result regardless of grouping.

use std::hash::Hash;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::config::{PluginFragment, UserConfig};

impl PluginFragment {
    /// Merge `later` on top of `self`.
    pub fn merge(mut self, later: &PluginFragment) -> PluginFragment {
        if later.name.is_some() {
            self.name = later.name.clone();
        }
        merge_map(&mut self.alias, &later.alias);
        self.transforms.extend(later.transforms.iter().cloned());
        self.resolvers.extend(later.resolvers.iter().cloned());
        self.configure_server
            .extend(later.configure_server.iter().cloned());
        merge_object(&mut self.compiler_options, &later.compiler_options);
        merge_map(
            &mut self.custom_block_transforms,
            &later.custom_block_transforms,
        );
        if later.jsx.is_some() {
            self.jsx = later.jsx.clone();
        }
        self
    }
}

impl UserConfig {
    /// Apply one plugin fragment on top of this config.
    ///
    /// The config's mergeable options are lifted into a fragment and merged
    /// with [`PluginFragment::merge`].
    pub fn apply_fragment(&mut self, fragment: &PluginFragment) {
        let merged = self.take_fragment().merge(fragment);
        self.alias = merged.alias;
        self.transforms = merged.transforms;
        self.resolvers = merged.resolvers;
        self.configure_server = merged.configure_server;
        self.compiler_options = merged.compiler_options;
        self.custom_block_transforms = merged.custom_block_transforms;
        self.jsx = merged.jsx;
    }

    fn take_fragment(&mut self) -> PluginFragment {
        PluginFragment {
            name: None,
            alias: std::mem::take(&mut self.alias),
            transforms: std::mem::take(&mut self.transforms),
            resolvers: std::mem::take(&mut self.resolvers),
            configure_server: std::mem::take(&mut self.configure_server),
            compiler_options: std::mem::take(&mut self.compiler_options),
            custom_block_transforms: std::mem::take(&mut self.custom_block_transforms),
            jsx: self.jsx.take(),
        }
    }

    /// Apply every declared plugin, in declaration order.
    pub fn apply_plugins(&mut self) {
        let plugins = std::mem::take(&mut self.plugins);
        for plugin in &plugins {
            tracing::debug!(
                target: "rift::config",
                plugin = plugin.name.as_deref().unwrap_or("<anonymous>"),
                "applying plugin fragment"
            );
            self.apply_fragment(plugin);
        }
        self.plugins = plugins;
    }
}

fn merge_map<K, V>(target: &mut IndexMap<K, V>, update: &IndexMap<K, V>)
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    for (key, value) in update {
        target.insert(key.clone(), value.clone());
    }
}

fn merge_object(target: &mut Map<String, Value>, update: &Map<String, Value>) {
    for (key, value) in update {
        target.insert(key.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{JsxOption, TransformSpec};

    fn transform(name: &str) -> TransformSpec {
        TransformSpec {
            name: Some(name.to_string()),
            test: r"\.js$".to_string(),
            replace: vec![],
            prepend: None,
            append: None,
            content_type: None,
        }
    }

    fn fragment(tag: &str) -> PluginFragment {
        let mut alias = IndexMap::new();
        alias.insert("shared".to_string(), format!("/{tag}"));
        alias.insert(tag.to_string(), format!("/only-{tag}"));
        PluginFragment {
            name: Some(tag.to_string()),
            alias,
            transforms: vec![transform(tag)],
            configure_server: vec![format!("{tag}-stage")],
            ..Default::default()
        }
    }

    #[test]
    fn list_merge_is_associative_and_ordered() {
        let (a, b, c) = (fragment("a"), fragment("b"), fragment("c"));

        let left = a.clone().merge(&b).merge(&c);
        let right = a.merge(&b.clone().merge(&c));

        assert_eq!(left, right);
        let names: Vec<_> = left
            .transforms
            .iter()
            .map(|t| t.name.clone().unwrap())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(left.configure_server, vec!["a-stage", "b-stage", "c-stage"]);
    }

    #[test]
    fn map_merge_later_keys_win() {
        let merged = fragment("a").merge(&fragment("b"));
        assert_eq!(merged.alias["shared"], "/b");
        assert_eq!(merged.alias["a"], "/only-a");
        assert_eq!(merged.alias["b"], "/only-b");
    }

    #[test]
    fn scalar_merge_later_wins_only_when_set() {
        let mut a = fragment("a");
        a.jsx = Some(JsxOption::Preset("react".into()));
        let b = fragment("b");

        let merged = a.merge(&b);
        assert_eq!(merged.jsx, Some(JsxOption::Preset("react".into())));

        let mut c = fragment("c");
        c.jsx = Some(JsxOption::Preset("preact".into()));
        let merged = merged.merge(&c);
        assert_eq!(merged.jsx, Some(JsxOption::Preset("preact".into())));
    }

    #[test]
    fn apply_plugins_appends_after_user_entries() {
        let mut config = UserConfig {
            transforms: vec![transform("user")],
            plugins: vec![fragment("p1"), fragment("p2")],
            ..Default::default()
        };

        config.apply_plugins();

        let names: Vec<_> = config
            .transforms
            .iter()
            .map(|t| t.name.clone().unwrap())
            .collect();
        assert_eq!(names, vec!["user", "p1", "p2"]);
        assert_eq!(config.alias["shared"], "/p2");
    }

    #[test]
    fn apply_fragment_matches_fragment_merge() {
        let mut user = fragment("user");
        user.name = None;
        user.jsx = Some(JsxOption::Preset("react".into()));
        let mut config = UserConfig {
            alias: user.alias.clone(),
            transforms: user.transforms.clone(),
            configure_server: user.configure_server.clone(),
            jsx: user.jsx.clone(),
            ..Default::default()
        };

        let plugin = fragment("p");
        config.apply_fragment(&plugin);
        let expected = user.merge(&plugin);

        assert_eq!(config.alias, expected.alias);
        assert_eq!(config.transforms, expected.transforms);
        assert_eq!(config.configure_server, expected.configure_server);
        assert_eq!(config.jsx, expected.jsx);
    }
}
