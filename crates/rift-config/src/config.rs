//! Configuration structures for the rift dev server.
//!
//! `UserConfig` is what a config module evaluates to. `PluginFragment` is the
//! partial configuration a plugin contributes. `ResolvedConfig` is the
//! immutable result of resolution that the server is built from.

use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{ConfigLoadError, Result as ConfigResult};

/// Options as written by the user in a config module.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserConfig {
    /// Project root. May be relative to the config file's directory.
    #[serde(default)]
    pub root: Option<PathBuf>,

    #[serde(default)]
    pub alias: IndexMap<String, String>,

    #[serde(default)]
    pub transforms: Vec<TransformSpec>,

    #[serde(default)]
    pub resolvers: Vec<ResolverSpec>,

    /// Names of user-supplied server stages, in declaration order.
    #[serde(default, deserialize_with = "one_or_many")]
    pub configure_server: Vec<String>,

    #[serde(default)]
    pub compiler_options: Map<String, Value>,

    #[serde(default)]
    pub custom_block_transforms: IndexMap<String, CustomBlockTransform>,

    #[serde(default)]
    pub jsx: Option<JsxOption>,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub open: Option<bool>,

    #[serde(default)]
    pub proxy: IndexMap<String, ProxyTarget>,

    #[serde(default)]
    pub service_worker: Option<bool>,

    #[serde(default)]
    pub plugins: Vec<PluginFragment>,
}

impl UserConfig {
    /// Create from a serde_json::Value produced by a config module.
    ///
    /// A `{ "default": {...} }` wrapper (an ES module namespace that leaked
    /// through a CommonJS consumer) is unwrapped first.
    pub fn from_value(value: Value) -> ConfigResult<Self> {
        let value = match value {
            Value::Object(mut map) if map.len() == 1 && map.contains_key("default") => {
                map.remove("default").unwrap_or(Value::Null)
            }
            other => other,
        };

        if !value.is_object() {
            return Err(ConfigLoadError::InvalidValue(format!(
                "config must evaluate to an object, got {}",
                describe(&value)
            )));
        }

        serde_json::from_value(value).map_err(|e| ConfigLoadError::InvalidValue(e.to_string()))
    }
}

/// Partial configuration contributed by one plugin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginFragment {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub alias: IndexMap<String, String>,

    #[serde(default)]
    pub transforms: Vec<TransformSpec>,

    #[serde(default)]
    pub resolvers: Vec<ResolverSpec>,

    #[serde(default, deserialize_with = "one_or_many")]
    pub configure_server: Vec<String>,

    #[serde(default)]
    pub compiler_options: Map<String, Value>,

    #[serde(default)]
    pub custom_block_transforms: IndexMap<String, CustomBlockTransform>,

    #[serde(default)]
    pub jsx: Option<JsxOption>,
}

/// A declarative response transform.
///
/// Applied to every response whose request path matches `test` (a regular
/// expression). Replacements run first, then prepend/append.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformSpec {
    #[serde(default)]
    pub name: Option<String>,

    pub test: String,

    #[serde(default)]
    pub replace: Vec<Replacement>,

    #[serde(default)]
    pub prepend: Option<String>,

    #[serde(default)]
    pub append: Option<String>,

    #[serde(default)]
    pub content_type: Option<String>,
}

/// `from` is a regular expression; `to` may refer to its groups as `$1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Replacement {
    pub from: String,
    pub to: String,
}

/// Maps a public path prefix onto a directory on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolverSpec {
    pub public_path: String,
    pub dir: PathBuf,
}

/// Turns a custom single-file-component block into a JS module.
///
/// `template` must contain `$content`, which is replaced with the block's
/// content as a JSON string literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomBlockTransform {
    pub template: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsxOption {
    Preset(String),
    Custom {
        #[serde(default)]
        factory: Option<String>,
        #[serde(default)]
        fragment: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProxyTarget {
    Url(String),
    Options {
        target: String,
        #[serde(default, rename = "changeOrigin")]
        change_origin: bool,
    },
}

impl ProxyTarget {
    pub fn target(&self) -> &str {
        match self {
            ProxyTarget::Url(url) => url,
            ProxyTarget::Options { target, .. } => target,
        }
    }

    pub fn change_origin(&self) -> bool {
        matches!(
            self,
            ProxyTarget::Options {
                change_origin: true,
                ..
            }
        )
    }
}

/// Server options carried through from the user config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerOptions {
    pub port: Option<u16>,
    pub host: Option<String>,
    pub open: bool,
    pub proxy: IndexMap<String, ProxyTarget>,
    pub service_worker: bool,
}

/// Fully resolved configuration. Immutable once produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolvedConfig {
    /// Absolute project root.
    pub root: PathBuf,
    pub mode: String,
    pub alias: IndexMap<String, String>,
    pub transforms: Vec<TransformSpec>,
    pub resolvers: Vec<ResolverSpec>,
    pub configure_server: Vec<String>,
    pub compiler_options: Map<String, Value>,
    pub custom_block_transforms: IndexMap<String, CustomBlockTransform>,
    pub jsx: Option<JsxOption>,
    pub server: ServerOptions,
    pub env: IndexMap<String, String>,
    /// Path of the config module this was resolved from.
    pub config_path: Option<PathBuf>,
}

impl ResolvedConfig {
    /// The configuration used when no config module exists: only the
    /// environment map is populated beyond root and mode.
    pub fn minimal(root: PathBuf, mode: &str, env: IndexMap<String, String>) -> Self {
        Self {
            root,
            mode: mode.to_string(),
            env,
            ..Default::default()
        }
    }

    pub(crate) fn from_user(
        user: UserConfig,
        root: PathBuf,
        mode: &str,
        env: IndexMap<String, String>,
        config_path: PathBuf,
    ) -> Self {
        Self {
            root,
            mode: mode.to_string(),
            alias: user.alias,
            transforms: user.transforms,
            resolvers: user.resolvers,
            configure_server: user.configure_server,
            compiler_options: user.compiler_options,
            custom_block_transforms: user.custom_block_transforms,
            jsx: user.jsx,
            server: ServerOptions {
                port: user.port,
                host: user.host,
                open: user.open.unwrap_or(false),
                proxy: user.proxy,
                service_worker: user.service_worker.unwrap_or(false),
            },
            env,
            config_path: Some(config_path),
        }
    }
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(name) => vec![name],
        OneOrMany::Many(names) => names,
    })
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
